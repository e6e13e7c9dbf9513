//! fallwatchd - fall detection pipeline daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source into the sliding window
//! 2. Periodically samples the window and drives the configured classifier
//! 3. Parses classifier text into verdicts and debounces positive ones
//! 4. Fans accepted alerts out to the notifier and the evidence archiver

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;

use fallwatch::notify::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
use fallwatch::{build_classifier, open_source, FallwatchConfig, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "fallwatchd", about = "fall detection pipeline daemon")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "FALLWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = FallwatchConfig::load_from(args.config.as_deref())?;
    log::info!(
        "fallwatchd {} starting: source={} classifier={:?} formats={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.source_url,
        cfg.classifier.mode,
        cfg.save_formats
    );

    let classifier = build_classifier(&cfg.classifier, &cfg.positive_marker, &cfg.negative_marker)?;
    let notifier = select_notifier(&cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("failed to install interrupt handler: {}", e))?;

    let mut source = open_source(&cfg.source_url, cfg.target_fps)?;
    let pipeline = Pipeline::new(&cfg, classifier, notifier);
    let report = pipeline.run(source.as_mut(), shutdown)?;

    log::info!(
        "pipeline stopped: {} frames, {} analyses ({} ticks dropped), {} alert(s)",
        report.frames_captured,
        report.scheduler.analyses,
        report.scheduler.dropped_ticks,
        report.alerts
    );
    Ok(())
}

fn select_notifier(cfg: &FallwatchConfig) -> Result<Option<Arc<dyn Notifier>>> {
    if !cfg.notifier_enabled {
        log::info!("notifier disabled by configuration");
        return Ok(None);
    }
    match &cfg.telegram {
        Some(telegram) => {
            let bot_token = std::env::var(&telegram.bot_token_env).unwrap_or_default();
            if bot_token.trim().is_empty() {
                log::warn!(
                    "notifier enabled but {} is not set, falling back to log notifications",
                    telegram.bot_token_env
                );
                return Ok(Some(Arc::new(LogNotifier)));
            }
            let notifier = TelegramNotifier::new(TelegramConfig {
                bot_token,
                chat_id: telegram.chat_id.clone(),
                api_base: None,
            })?;
            log::info!("telegram notifications enabled");
            Ok(Some(Arc::new(notifier)))
        }
        None => {
            log::warn!("notifier enabled but no telegram section configured, using log notifications");
            Ok(Some(Arc::new(LogNotifier)))
        }
    }
}
