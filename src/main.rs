use {
    monei_sync::{
        AppState,
        adapters::monei_client::MoneiClient,
        config::AppConfig,
        infra::postgres::{
            invoice_repo::PgInvoiceService, lock_store::PgLockStore, order_repo::PgOrderRepository,
        },
        services::{
            lock_manager::LockManager, payment_processor::PaymentProcessor,
            reconciliation::ReconciliationSweep, signature::SignatureVerifier,
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().expect("invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let api = Arc::new(
        MoneiClient::new(
            &config.monei_api_url,
            &config.monei_api_key,
            config.http_timeout,
        )
        .expect("failed to build MONEI client"),
    );
    let locks = Arc::new(LockManager::new(
        Arc::new(PgLockStore::new(pool.clone())),
        config.locks.clone(),
    ));
    let orders = Arc::new(PgOrderRepository::new(pool.clone()));
    let processor = Arc::new(PaymentProcessor::new(
        locks.clone(),
        orders.clone(),
        Arc::new(PgInvoiceService::new(pool.clone())),
        api.clone(),
        config.labels.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = Arc::new(ReconciliationSweep::new(
        processor.clone(),
        locks,
        orders,
        api.clone(),
        config.stores.clone(),
        config.sweep.clone(),
    ));
    let sweep_handle = tokio::spawn(sweep.run(shutdown_rx));

    let state = AppState {
        processor,
        api,
        verifier: SignatureVerifier::new(config.monei_api_key.as_str())
            .with_tolerance(config.signature_tolerance),
    };
    let app = monei_sync::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown_tx.send(true).ok();
    sweep_handle.await.ok();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
