use gather_api::{
    app,
    metrics::{CountingReconciliationSink, Metrics},
    middleware::ResiliencyState,
    state::{AppState, AuthConfig},
};
use gather_core::{LogReconciliationSink, Mailer, ReconciliationSink, SignatureVerifier};
use gather_order::{
    BookingBackends, BookingOrchestrator, NotificationDispatcher, NotificationSettings, OrchestratorSettings,
    OrderService, RetryPolicy,
};
use gather_store::{
    DbClient, DisabledMailer, EventProducer, HttpPaymentGateway, PgBookingStore, PgCapacityLedger, PgEventCatalog,
    RedisClient, SmtpMailer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gather_api=debug,gather_order=debug,gather_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = gather_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Gather API on port {}", config.server.port);

    // Database Connection
    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");
    let db = Arc::new(db);

    // Redis Connection (rate limiting)
    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.expect("Failed to connect to Redis"),
        )),
        None => {
            tracing::info!("Redis not configured, rate limiting disabled");
            None
        }
    };
    let rate_limit_per_minute = config.redis.as_ref().map_or(60, |r| r.rate_limit_per_minute);

    // Kafka Connection
    let kafka = config.kafka.as_ref().map(|kafka| {
        Arc::new(EventProducer::new(&kafka.brokers).expect("Failed to create Kafka producer"))
    });

    let metrics = Arc::new(Metrics::new().expect("Failed to register metrics"));
    let escalation: Arc<dyn ReconciliationSink> = match &kafka {
        Some(producer) => producer.clone(),
        None => Arc::new(LogReconciliationSink),
    };
    let reconciliation = Arc::new(CountingReconciliationSink::new(metrics.clone(), escalation));

    let gateway = HttpPaymentGateway::new(
        &config.gateway.base_url,
        &config.gateway.key_id,
        config.gateway.key_secret.clone(),
        Duration::from_millis(config.gateway.timeout_ms),
    )
    .expect("Failed to build payment gateway client");
    let orders = OrderService::new(
        Arc::new(gateway),
        &config.gateway.currency,
        Duration::from_millis(config.gateway.timeout_ms),
    );
    let verifier = SignatureVerifier::new(config.gateway.key_secret.expose().clone())
        .expect("Payment signature secret missing");

    let notifications = &config.notifications;
    let mailer: Arc<dyn Mailer> = match &notifications.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp).expect("Failed to build SMTP transport")),
        None => {
            tracing::warn!("SMTP not configured, confirmation e-mails are disabled");
            Arc::new(DisabledMailer)
        }
    };
    let notifier = NotificationDispatcher::new(
        mailer,
        NotificationSettings {
            chat_phone: notifications.chat_phone.clone(),
            email_timeout: Duration::from_millis(notifications.email_timeout_ms),
            email_policy: RetryPolicy::new(
                notifications.email_attempts,
                Duration::from_millis(500),
                Duration::from_secs(5),
            ),
        },
    );

    let catalog = Arc::new(PgEventCatalog::new(db.pool.clone()));
    let ledger = Arc::new(PgCapacityLedger::new(db.pool.clone()));
    let bookings = Arc::new(PgBookingStore::new(db.pool.clone()));

    let orchestrator = BookingOrchestrator::new(
        BookingBackends {
            catalog: catalog.clone(),
            ledger: ledger.clone(),
            store: bookings.clone(),
            reconciliation,
        },
        orders,
        verifier,
        notifier,
        OrchestratorSettings {
            persist_policy: RetryPolicy::new(
                config.booking.persist_attempts,
                Duration::from_millis(config.booking.persist_backoff_ms),
                Duration::from_millis(config.booking.persist_backoff_max_ms),
            ),
            ..OrchestratorSettings::default()
        },
    );

    let app_state = AppState {
        db: Some(db),
        redis,
        kafka,
        catalog,
        ledger,
        bookings,
        orchestrator: Arc::new(orchestrator),
        metrics,
        resiliency: Arc::new(ResiliencyState::default()),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            admin_password: config.auth.admin_password.clone(),
        },
        gateway_key_id: config.gateway.key_id.clone(),
        rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("Server error");
}
