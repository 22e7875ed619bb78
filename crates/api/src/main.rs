use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use courier_api::{AppState, build_app};
use courier_broker::{Broker, Publisher};
use courier_infra::BridgeConfig;
use courier_pipeline::{
    ConsumerWorker, ConsumptionPipeline, LoggingHandler, ShutdownSignal, TracingEventSink,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env().context("invalid configuration")?;
    courier_observability::init(config.log_format);

    info!(
        brokers = config.brokers.as_str(),
        group_id = config.group_id.as_str(),
        source_topic = config.source_topic.as_str(),
        dead_letter_topic = config.dead_letter_topic.as_deref().unwrap_or("<discard>"),
        "starting courier"
    );

    start(&config).await
}

#[cfg(feature = "kafka")]
async fn start(config: &BridgeConfig) -> anyhow::Result<()> {
    use courier_infra::kafka::{KafkaBroker, KafkaSettings};

    let broker = KafkaBroker::new(KafkaSettings::from_config(config))
        .context("failed to create kafka client")?;
    let result = run(config, broker.clone()).await;
    if let Err(e) = broker.flush(config.publish_timeout) {
        tracing::error!(error = %e, "kafka producer flush failed");
    }
    result
}

#[cfg(not(feature = "kafka"))]
async fn start(config: &BridgeConfig) -> anyhow::Result<()> {
    tracing::warn!("built without the `kafka` feature; using the in-memory broker");
    run(config, courier_broker::InMemoryBroker::new()).await
}

/// Composition root: pipeline, consumer worker and HTTP server over `broker`.
async fn run<B>(config: &BridgeConfig, broker: B) -> anyhow::Result<()>
where
    B: Broker + Clone + 'static,
{
    let subscription = broker
        .subscribe(&config.source_topics(), &config.group_id)
        .context("failed to subscribe")?;

    let pipeline = ConsumptionPipeline::new(
        broker.clone(),
        LoggingHandler,
        config.dead_letter_router(),
    )
    .with_policy(config.retry.clone())
    .with_event_sink(Arc::new(TracingEventSink));
    let stats = pipeline.stats();

    let shutdown = ShutdownSignal::new();
    let worker = ConsumerWorker::spawn(
        WorkerConfig::default(),
        subscription,
        Arc::new(pipeline),
        shutdown.clone(),
    )
    .context("failed to start consumer")?;

    let publisher: Arc<dyn Publisher> = Arc::new(broker);
    let app = build_app(AppState::new(publisher, config.source_topic.clone(), stats));

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let fatal = stop.clone();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("ctrl-c received, shutting down"),
                _ = tokio::task::spawn_blocking(move || fatal.wait()) => {
                    info!("consumer stopped, shutting down http server");
                }
            }
            stop.request();
        })
        .await
        .context("http server failed")?;

    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .context("consumer worker join failed")?
        .context("consumer stopped on a fatal error")?;

    info!("shutdown complete");
    Ok(())
}
