//! Tandem Sim - drives a dual-stream playback session from the terminal.
//!
//! Both players come from the simulated provider, so the whole lifecycle
//! (hidden sync, reveal, drift correction, end of stream) can be watched and
//! poked without a browser. Snapshots are printed as JSON lines on stdout,
//! logs go to stderr.

mod config;
mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::provider::simulated::SimulatedProvider;
use tandem_core::{
    BroadcastEventBridge, ControlSurface, LoggingEventEmitter, SessionCommand, SessionDriver,
    TandemEvent, TokioSpawner,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::SimConfig;
use crate::console::{parse_line, ConsoleHost, Input, HELP};

/// Tandem Sim - headless dual-stream playback simulator.
#[derive(Parser, Debug)]
#[command(name = "tandem-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TANDEM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Stream identifier to mount (overrides config file).
    #[arg(short, long)]
    stream: Option<String>,

    /// Follower clock multiplier (overrides config file).
    #[arg(long)]
    skew: Option<f64>,

    /// Run without the ambient follower.
    #[arg(long)]
    no_ambient: bool,

    /// Print domain events as JSON lines too.
    #[arg(long)]
    events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tandem Sim v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        SimConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(stream) = args.stream {
        config.stream_id = stream;
    }
    if let Some(skew) = args.skew {
        config.follower_clock_skew = skew;
    }
    if args.no_ambient {
        config.session.ambient_layer = false;
    }

    log::info!(
        "Configuration: stream={}, startup={}ms, warmup={}ms, skew={}, ambient={}",
        config.stream_id,
        config.startup_latency_ms,
        config.session.reveal.warmup_ms,
        config.follower_clock_skew,
        config.session.ambient_layer
    );

    let bridge = BroadcastEventBridge::new(256);
    bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let emitter = Arc::new(bridge.clone());

    let provider =
        SimulatedProvider::with_behavior(config.leader_behavior(), config.follower_behavior());
    let driver = SessionDriver::spawn(
        config.session.clone(),
        Arc::new(provider),
        emitter.clone(),
        &TokioSpawner::current(),
    )
    .context("Failed to start playback session")?;
    let driver = Arc::new(driver);

    let host = Arc::new(ConsoleHost::new(config.device_hints()));
    let surface = ControlSurface::new(
        Arc::clone(&driver),
        host.clone(),
        emitter,
        config.session.controls.clone(),
    );

    if args.events {
        tokio::spawn(print_events(bridge.subscribe()));
    }

    load(&driver, &config.stream_id, config.resume_from, config.autoplay)
        .await
        .context("Failed to mount stream")?;

    eprintln!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut report = interval(config.report_interval());
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Shutdown signal received, cleaning up...");
                break;
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input)) => handle_input(&surface, &host, input).await,
                    Ok(None) => {}
                    Err(usage) => eprintln!("{}", usage),
                }
            }

            _ = report.tick() => {
                surface.tick(Instant::now());
                print_view(&surface);
            }
        }
    }

    // Let the session tear its players down before exiting.
    let mut snapshots = driver.subscribe();
    driver.shutdown();
    let stopped = snapshots.wait_for(|snapshot| snapshot.stream_id.is_none());
    if tokio::time::timeout(Duration::from_secs(1), stopped).await.is_err() {
        log::warn!("Session did not stop within 1s");
    }

    log::info!("Shutdown complete");
    Ok(())
}

async fn load(
    driver: &SessionDriver,
    stream_id: &str,
    resume_from: Option<f64>,
    autoplay: bool,
) -> tandem_core::TandemResult<()> {
    driver
        .send(SessionCommand::Mount {
            stream_id: stream_id.to_string(),
            resume_from,
        })
        .await?;
    if autoplay {
        driver.send(SessionCommand::RequestPlayback).await
    } else {
        driver.send(SessionCommand::Prepare).await
    }
}

async fn handle_input(surface: &ControlSurface, host: &ConsoleHost, input: Input) {
    let result = match input {
        Input::Key(key) => surface.handle_key(&key).await.map(|shortcut| {
            if shortcut.is_none() {
                log::debug!("Key {:?} ignored", key);
            }
        }),
        Input::Play => surface.play().await,
        Input::Pause => surface.pause().await,
        Input::Restart => surface.restart().await,
        Input::Volume(level) => surface.set_volume(level).await,
        Input::Seek(fraction) => match surface.begin_seek().await {
            Ok(()) => surface.end_seek(fraction).await,
            Err(e) => Err(e),
        },
        Input::Load(stream_id) => load(surface.driver(), &stream_id, None, true).await,
        Input::Fullscreen(on) => {
            surface.on_fullscreen_change(on);
            Ok(())
        }
        Input::Typing(on) => {
            host.set_typing(on);
            Ok(())
        }
        Input::Resize(width) => {
            host.set_viewport_width(width);
            let mobile = surface.refresh_device();
            log::info!("[Console] Viewport {}px, mobile layout: {}", width, mobile);
            Ok(())
        }
        Input::Status => {
            print_view(surface);
            Ok(())
        }
        Input::Help => {
            eprintln!("{}", HELP);
            Ok(())
        }
        Input::Quit => Ok(()),
    };

    if let Err(e) = result {
        log::warn!("Command failed ({}): {}", e.code(), e);
    }
}

fn print_view(surface: &ControlSurface) {
    match serde_json::to_string(&surface.view()) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Failed to serialize snapshot: {}", e),
    }
}

async fn print_events(mut events: broadcast::Receiver<TandemEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => log::warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event printer lagged, skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
