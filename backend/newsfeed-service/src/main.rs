use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use newsfeed_service::cache::{
    self, FollowerCountCache, InboxStore, RedisFollowerCountCache, RedisInboxCache,
};
use newsfeed_service::config::{AppConfig, Config};
use newsfeed_service::db::{self, FollowerDirectory, PgFollowerDirectory, PgPostStore, PostStore};
use newsfeed_service::handlers::{self, HealthState};
use newsfeed_service::kafka::{
    self, DeadLetterSink, FanoutConsumer, KafkaDeadLetterSink, KafkaPostEventPublisher,
};
use newsfeed_service::metrics;
use newsfeed_service::security::JwtValidator;
use newsfeed_service::services::{
    CelebrityClassifier, FanoutService, PostAnnouncer, TimelineService,
};
use newsfeed_service::websocket::{PushDispatcher, PushHub, PushWorker};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_tracing(app: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{},sqlx=warn,rdkafka=warn,actix_web=info",
            app.log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if app.is_development() {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C signal"),
                    _ = terminate.recv() => info!("Received SIGTERM signal"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.app);

    info!(
        env = %config.app.env,
        port = config.app.port,
        "Starting newsfeed-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pg_pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let redis = cache::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let producer = kafka::create_producer(&config.kafka).context("Failed to create Kafka producer")?;
    info!("Connected to PostgreSQL, Redis and Kafka");

    let directory: Arc<dyn FollowerDirectory> = Arc::new(PgFollowerDirectory::new(pg_pool.clone()));
    let posts: Arc<dyn PostStore> = Arc::new(PgPostStore::new(pg_pool.clone()));
    let inbox: Arc<dyn InboxStore> = Arc::new(RedisInboxCache::new(
        redis.clone(),
        config.fanout.inbox_capacity,
    ));
    let counts: Arc<dyn FollowerCountCache> = Arc::new(RedisFollowerCountCache::new(redis.clone()));

    let publisher = Arc::new(KafkaPostEventPublisher::new(
        producer.clone(),
        config.kafka.post_created_topic.clone(),
        config.kafka.publish_timeout(),
    ));
    if let Err(e) = publisher.health_check() {
        warn!("Post-created topic metadata unavailable at startup: {}", e);
    }
    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(KafkaDeadLetterSink::new(
        producer,
        config.kafka.dlq_topic.clone(),
        config.kafka.publish_timeout(),
    ));

    let classifier = Arc::new(CelebrityClassifier::new(
        counts,
        directory.clone(),
        config.fanout.celebrity_threshold,
    ));
    let fanout = Arc::new(FanoutService::new(
        classifier,
        directory.clone(),
        inbox.clone(),
        dead_letters,
        config.fanout.retry_config(),
        config.kafka.post_created_topic.clone(),
    ));
    let timeline = web::Data::new(TimelineService::new(
        directory.clone(),
        inbox,
        posts.clone(),
        config.feed.clone(),
        config.fanout.celebrity_threshold,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let hub = PushHub::new(config.push.connection_buffer);
    let (dispatcher, jobs) = PushDispatcher::new(config.push.queue_capacity);
    let announcer = web::Data::new(PostAnnouncer::new(
        posts,
        publisher.clone(),
        directory,
        dispatcher,
        config.fanout.retry_config(),
    ));

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let worker = PushWorker::new(
        hub.clone(),
        jobs,
        config.push.chunk_size,
        shutdown_rx.clone(),
    );
    tasks.spawn(async move {
        worker.run().await;
        Ok(())
    });

    for worker in 0..config.kafka.consumer_concurrency {
        let consumer = FanoutConsumer::new(&config.kafka, fanout.clone(), shutdown_rx.clone(), worker)
            .context("Failed to start fan-out consumer")?;
        tasks.spawn(async move { consumer.run().await.map_err(anyhow::Error::from) });
    }
    info!(
        consumers = config.kafka.consumer_concurrency,
        topic = %config.kafka.post_created_topic,
        "Fan-out consumers started"
    );

    let validator = web::Data::new(JwtValidator::new(&config.auth.jwt_secret));
    let health = web::Data::new(HealthState {
        db: pg_pool,
        redis,
    });
    let hub_data = web::Data::new(hub);

    let server = HttpServer::new(move || {
        let auth = validator.clone().into_inner();
        App::new()
            .app_data(timeline.clone())
            .app_data(announcer.clone())
            .app_data(hub_data.clone())
            .app_data(validator.clone())
            .app_data(health.clone())
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(move |cfg| handlers::configure(cfg, auth))
    })
    .bind(("0.0.0.0", config.app.port))
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .shutdown_timeout(SHUTDOWN_GRACE.as_secs())
    .run();
    let server_handle = server.handle();

    tasks.spawn(async move {
        server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!("HTTP server listening on port {}", config.app.port);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut first_error: Option<anyhow::Error> = None;
    tokio::select! {
        result = tasks.join_next() => match result {
            Some(Ok(Ok(()))) => warn!("Background task exited early"),
            Some(Ok(Err(e))) => {
                error!("Task failed: {:#}", e);
                first_error = Some(e);
            }
            Some(Err(e)) => {
                error!("Task panicked: {}", e);
                first_error = Some(anyhow::anyhow!("Task panicked: {}", e));
            }
            None => {}
        },
        _ = &mut shutdown => info!("Shutdown signal received"),
    }

    let _ = shutdown_tx.send(true);
    server_handle.stop(true).await;

    let drain = async {
        while let Some(result) = tasks.join_next().await {
            if let Ok(Err(e)) = result {
                warn!("Task failed during shutdown: {:#}", e);
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Background tasks did not stop in time, aborting");
        tasks.shutdown().await;
    }

    publisher.flush();
    info!("newsfeed-service shut down");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
