use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{sync::Arc, time::Duration};

type HmacSha256 = Hmac<Sha256>;

/// How far a `t=` timestamp may drift from the local clock, either way.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Check a provider signature over the raw request body.
///
/// Accepts the header form `t=<timestamp>,v1=<hex>` (HMAC-SHA256 of
/// `"<timestamp>.<payload>"`) and a bare hex digest (HMAC-SHA256 of the
/// payload alone). Comparison is constant-time. Never errors: anything
/// malformed is simply `false`.
pub fn validate(payload: &str, signature: &str, secret: &str) -> bool {
    let signature = signature.trim();
    if signature.is_empty() || secret.is_empty() {
        return false;
    }

    match parse_header(signature) {
        Some((timestamp, digest)) => {
            let signed = format!("{timestamp}.{payload}");
            verify_hex(signed.as_bytes(), digest, secret)
        }
        None if !signature.contains('=') => verify_hex(payload.as_bytes(), signature, secret),
        None => false,
    }
}

/// [`validate`] plus a freshness check: a header-form signature whose
/// timestamp is more than `tolerance` away from `now` (unix seconds) is
/// rejected, so a captured notification cannot be replayed later. Bare hex
/// digests carry no timestamp and are only checked for authenticity.
pub fn validate_at(
    payload: &str,
    signature: &str,
    secret: &str,
    now: i64,
    tolerance: Duration,
) -> bool {
    if let Some((timestamp, _)) = parse_header(signature.trim()) {
        let Ok(timestamp) = timestamp.trim().parse::<i64>() else {
            return false;
        };
        if now.abs_diff(timestamp) > tolerance.as_secs() {
            tracing::warn!(timestamp, now, "signature timestamp outside tolerance");
            return false;
        }
    }
    validate(payload, signature, secret)
}

/// Hex HMAC-SHA256 in the `t=..,v1=..` header form. Used by tests and by
/// tooling that replays notifications.
pub fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
    let signed = format!("{timestamp}.{payload}");
    format!("t={timestamp},v1={}", hex_digest(signed.as_bytes(), secret))
}

pub fn hex_digest(data: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn parse_header(header: &str) -> Option<(&str, &str)> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => digest = Some(value),
            _ => {}
        }
    }
    Some((timestamp?, digest?))
}

fn verify_hex(data: &[u8], digest: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(digest.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// Secret-bound validator handed to the data providers.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Arc<str>,
    tolerance: Duration,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        validate_at(
            payload,
            signature,
            &self.secret,
            chrono::Utc::now().timestamp(),
            self.tolerance,
        )
    }
}
