//! Pixiv Daily CLI - posts the daily ranking to Telegram.

use anyhow::{Context, Result};
use clap::Parser;
use pixiv_daily::config::Config;
use pixiv_daily::console::Console;
use pixiv_daily::cookies::find_cookie_file;
use pixiv_daily::{HttpFetcher, Pipeline, PixivResolver, Publisher, Scheduler, TelegramChannel};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How often the cooldown status line is refreshed.
const COOLDOWN_POLL: Duration = Duration::from_secs(60);

/// Posts pixiv's daily illustration ranking to a Telegram channel.
#[derive(Parser, Debug)]
#[command(name = "pixiv-daily")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Keep running and post every day at local midnight.
    #[arg(long)]
    serve: bool,

    /// With --serve, run once immediately before waiting.
    #[arg(long, requires = "serve")]
    now: bool,

    /// Use this config file instead of the default location.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = Console::new();

    console.section("Pixiv Daily");

    console.step("Loading configuration...");
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path).context("Failed to load configuration")?;

    init_logging(args.debug || config.scraping.debug);

    let cookie_file = config_path
        .parent()
        .and_then(|dir| find_cookie_file(dir, &["pixiv"]));
    if let Some(path) = &cookie_file {
        console.info(&format!("Using cookie file: {}", path.display()));
    }

    // First run: the default file was just written with placeholders.
    if !config.telegram.is_configured() {
        console.warning(&format!(
            "Bot token not configured. Please edit: {}",
            config_path.display()
        ));
        console.info("Set your pixiv credentials and Telegram bot token, then run again.");
        return Ok(());
    }

    config
        .validate(cookie_file.is_some())
        .context("Invalid configuration")?;
    console.success("Configuration loaded");

    let target = if args.serve {
        &config.telegram.channel
    } else {
        &config.telegram.debug_channel
    };
    console.info(&format!("Publishing to {}", target));

    let pipeline = Pipeline::new(
        PixivResolver::new(&config, cookie_file),
        HttpFetcher::new(&config.pixiv, &config.download)?,
        Publisher::new(
            TelegramChannel::new(
                &config.telegram.bot_token,
                target,
                config.telegram.send_timeout(),
            )?,
            &config.pixiv,
            &config.telegram,
        ),
        config.download.pipeline_attempts,
    );

    if !args.serve {
        console.step("Running once...");
        let report = pipeline.run_once().await?;
        console.success(&format!(
            "Listed {}, resolved {}, downloaded {}, published {}",
            console.count(report.listed),
            console.count(report.resolved),
            console.count(report.downloaded),
            console.count(report.published)
        ));
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(COOLDOWN_POLL, console.clone());
    let mut server = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.serve(&pipeline, args.now, cancel).await }
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("Scheduler task failed")?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested, waiting for the current run to finish");
            cancel.cancel();
        }
    }

    server.await.context("Scheduler task failed")?;
    console.section("Stopped");
    Ok(())
}

fn init_logging(debug: bool) {
    let default = if debug {
        "pixiv_daily=debug"
    } else {
        "pixiv_daily=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
