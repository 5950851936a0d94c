use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rangefetch::common::client::HttpClient;
use rangefetch::common::logger::PrettyLogger;
use rangefetch::transfer::progress::ConsoleProgress;
use rangefetch::transfer::{
    ChannelObserver, FileDestination, HttpFetcher, MemoryRegistry, TransferConfig, TransferEvent,
    TransferId, TransferItem, TransferManager, TransferState, UrlLocator,
};
use rangefetch::{log_error, log_success};
use tracing::debug;

mod cli;

/// 加载配置并应用命令行覆盖
async fn load_config(args: &cli::Cli) -> Result<TransferConfig> {
    let mut config = match &args.config {
        Some(path) => TransferConfig::from_file(path).await?,
        None => TransferConfig::default(),
    };
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    debug!("配置: {:?}", config);
    Ok(config)
}

#[derive(Default)]
struct Summary {
    completed: usize,
    failed: usize,
    cancelled: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // 初始化日志
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = load_config(&args).await?;
    let client = HttpClient::new(&config)?;
    let (observer, mut events) = ChannelObserver::new();
    let registry = Arc::new(MemoryRegistry::new());

    let manager = TransferManager::new(
        config,
        Arc::new(UrlLocator),
        Arc::new(HttpFetcher::new(client)),
        Arc::new(observer),
    )
    .with_registry(registry.clone());

    let destination = FileDestination::new(&args.output_dir);
    let bars = ConsoleProgress::new();
    let mut summary = Summary::default();

    // 启动全部传输
    let mut pending: HashSet<TransferId> = HashSet::new();
    for url in &args.urls {
        let item = TransferItem::new(url.as_str(), url.as_str());
        match manager.start(item.clone()).await {
            Ok(()) => {
                pending.insert(item.id);
            }
            Err(e) => {
                log_error!("{}: {}", url, e);
                summary.failed += 1;
            }
        }
    }
    PrettyLogger::transfers_started(pending.len(), args.urls.len());

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

    while !pending.is_empty() {
        let event = tokio::select! {
            _ = &mut ctrl_c => {
                PrettyLogger::interrupted(pending.len());
                summary.cancelled += pending.len();
                manager.cancel_all();
                break;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            break;
        };

        match event {
            TransferEvent::State {
                id,
                state: TransferState::Queued,
            } => {
                if let Some(record) = registry.get(&id) {
                    bars.add(&id, &record.name);
                }
            }
            TransferEvent::State { .. } => {}
            TransferEvent::Progress { id, progress } => bars.update(&id, &progress),
            TransferEvent::Completed { id, completion } => {
                bars.finish(&id, "下载完成");
                pending.remove(&id);
                match destination.write(&completion).await {
                    Ok(path) => {
                        log_success!("{} -> {}", id, path.display());
                        summary.completed += 1;
                    }
                    Err(e) => {
                        log_error!("写入失败 {}: {}", id, e);
                        summary.failed += 1;
                    }
                }
            }
            TransferEvent::Failed { id, message } => {
                if pending.remove(&id) {
                    bars.abandon(&id, "下载失败");
                    log_error!("{}: {}", id, message);
                    summary.failed += 1;
                }
            }
        }
    }

    PrettyLogger::transfer_summary(
        summary.completed,
        summary.failed,
        summary.cancelled,
        &args.output_dir,
    );

    if summary.failed > 0 {
        anyhow::bail!("{} 个传输失败", summary.failed);
    }
    Ok(())
}
