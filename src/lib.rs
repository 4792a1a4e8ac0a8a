pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    domain::provider::MoneiApi,
    services::{payment_processor::PaymentProcessor, signature::SignatureVerifier},
    std::{sync::Arc, time::Duration},
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<PaymentProcessor>,
    pub api: Arc<dyn MoneiApi>,
    pub verifier: SignatureVerifier,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/monei/webhook", post(adapters::http::webhook_handler))
        .route("/monei/callback", post(adapters::http::callback_handler))
        .route("/monei/complete", get(adapters::http::complete_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(DefaultBodyLimit::max(64 * 1024)),
        )
        .with_state(state)
}
