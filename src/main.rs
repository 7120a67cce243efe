//! Эталонный сервер Volna.
//!
//! Поднимает TCP-хост, роутер со встроенным паком `core` и рассылку по
//! каналам.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use volna::{
    builtin,
    broadcast::{Broadcaster, StaticChannelResolver},
    bus::BusPool,
    config::Settings,
    logging::init_logging,
    network,
    producer::{DefaultEmitter, Producer, ProducersPool},
    registry::TypeRegistry,
    router::{ConnectionWatcher, Router},
};

#[derive(Parser)]
#[command(name = "volna")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ", ", env!("BUILD_TIME"), ")"))]
#[command(about = "Volna - message routing and broadcast fan-out server", long_about = None)]
struct Cli {
    /// Путь к файлу конфигурации
    #[arg(short, long, env = "VOLNA_CONFIG", help = "Путь к файлу конфигурации")]
    config: Option<PathBuf>,
    /// Адрес прослушивания (перекрывает конфигурацию)
    #[arg(short, long, help = "Адрес прослушивания, например 127.0.0.1:7420")]
    listen: Option<String>,
    /// Уровень логирования (перекрывает конфигурацию)
    #[arg(long, help = "Уровень логирования: trace, debug, info, warn, error")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(listen) = cli.listen {
        settings.server.listen_address = listen;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    settings.validate().context("Invalid settings")?;

    let logging = init_logging(&settings.logging).context("Failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        "Starting volna"
    );

    let registry = Arc::new(TypeRegistry::new());
    let report = registry.register_pack(builtin::core_pack());
    if !report.is_complete() {
        warn!(?report, "Core pack registered partially");
    }

    let pool = Arc::new(BusPool::new(settings.bus.clone()));
    let sweeper = pool.spawn_sweeper();

    let resolver = Arc::new(StaticChannelResolver::new());
    let broadcaster = Arc::new(Broadcaster::new(
        settings.server.server_id.clone(),
        Arc::clone(&pool),
        resolver,
    ));

    let emitter = build_emitter(&settings, &broadcaster, &registry)?;
    let router = Arc::new(
        Router::builder(settings.server.server_id.clone())
            .broadcaster(broadcaster.clone())
            .emitter(emitter)
            .build(),
    );
    builtin::install_handlers(&router);

    let (events_tx, _) = broadcast::channel(settings.server.event_capacity.max(1));
    let watcher = Arc::new(ConnectionWatcher::new(
        Arc::clone(&router),
        settings.server.inbox_capacity,
    ));
    let watcher_task = watcher.watch(events_tx.subscribe());
    let broadcaster_task = Arc::clone(&broadcaster).watch(events_tx.subscribe());

    let server = network::run(&settings.server, Arc::clone(&registry), events_tx)
        .await
        .context("Failed to start server")?;
    info!(address = %server.local_addr(), "Volna is ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server.shutdown();
    server.join().await;
    sweeper.abort();
    watcher_task.abort();
    broadcaster_task.abort();
    logging.shutdown();

    Ok(())
}

/// Продюсеры по умолчанию: пул над рассылкой, если он настроен.
fn build_emitter(
    settings: &Settings,
    broadcaster: &Arc<Broadcaster>,
    registry: &TypeRegistry,
) -> Result<DefaultEmitter> {
    let producers_config = &settings.producers;
    let configured = producers_config
        .supported_types_by_producer_id
        .contains_key(broadcaster.id())
        || producers_config
            .supported_packs_by_producer_id
            .contains_key(broadcaster.id());
    if !configured {
        return Ok(DefaultEmitter::default());
    }

    let producers: Vec<Arc<dyn Producer>> = vec![broadcaster.clone()];
    let pool = ProducersPool::new("default", producers_config, producers, registry)
        .context("Invalid producers configuration")?;
    let pool: Arc<dyn Producer> = Arc::new(pool);
    Ok(DefaultEmitter::new(vec![pool]))
}
