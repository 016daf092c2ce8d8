use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paybridge::config::Config;
use paybridge::middleware::{RateLimiter, RequestId};
use paybridge::modules::events::EventBus;
use paybridge::modules::gateways::controllers::gateway_controller;
use paybridge::modules::gateways::services::GatewayRegistry;
use paybridge::modules::health::controllers::health_controller;
use paybridge::modules::subscriptions::controllers::subscription_controller;
use paybridge::modules::subscriptions::repositories::SubscriptionRepository;
use paybridge::modules::subscriptions::services::SubscriptionService;
use paybridge::modules::transactions::controllers::{
    admin_controller, payment_controller, webhook_controller,
};
use paybridge::modules::transactions::repositories::TransactionRepository;
use paybridge::modules::transactions::services::{PaymentService, WebhookService};

const BILLING_INTERVAL_SECS: u64 = 300;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paybridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting PayBridge Payment Gateway Service");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    // Create database connection pool
    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");

    tracing::info!(
        "Database pool initialized (max {} connections)",
        config.database.max_connections
    );

    // Wire services
    let events = EventBus::new();
    events.spawn_logging_subscriber();

    let registry = Arc::new(GatewayRegistry::from_config(&config));
    let transaction_repository = Arc::new(TransactionRepository::new(db_pool.clone()));
    let subscription_repository = Arc::new(SubscriptionRepository::new(db_pool.clone()));

    let payment_service = Arc::new(PaymentService::new(
        registry.clone(),
        transaction_repository.clone(),
        events.clone(),
        config.limits.clone(),
    ));
    let webhook_service = Arc::new(WebhookService::new(
        registry.clone(),
        transaction_repository.clone(),
        events.clone(),
        config.limits.webhook_lock_seconds,
    ));
    let subscription_service = Arc::new(SubscriptionService::new(
        registry.clone(),
        subscription_repository.clone(),
        payment_service.clone(),
        events.clone(),
        config.limits.clone(),
    ));

    // Periodic due-billing task
    {
        let subscriptions = subscription_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(BILLING_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = subscriptions.run_due_billing().await {
                    tracing::error!("Due billing run failed: {}", e);
                }
            }
        });
    }

    let rate_limit = config.limits.rate_limit_per_minute;
    let server_workers = config.server.workers;
    let bind_address = config.server.bind_address();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(RequestId)
            .wrap(RateLimiter::new(rate_limit))
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(webhook_service.clone()))
            .app_data(web::Data::new(subscription_service.clone()))
            .configure(health_controller::configure)
            .service(
                web::scope("/api/v1/payments")
                    .configure(gateway_controller::configure)
                    .configure(webhook_controller::configure)
                    .configure(subscription_controller::configure)
                    .configure(admin_controller::configure)
                    .configure(payment_controller::configure),
            )
    })
    .workers(server_workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await
}
