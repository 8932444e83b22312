mod config;
mod event;
mod filters;
mod limiter;
mod nip;
mod policy;
mod store;
mod strfry;
mod watcher;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use config::Config;
use event::Event;
use filters::autoban::AutoBanFilter;
use filters::banned_author::BannedAuthorFilter;
use filters::emergency::EmergencyFilter;
use filters::ephemeral_chat::EphemeralChatFilter;
use filters::freshness::FreshnessFilter;
use filters::keyword::KeywordFilter;
use filters::kind::KindFilter;
use filters::language::LanguageFilter;
use filters::moderation::ModerationFilter;
use filters::rate_limiter::RateLimiterFilter;
use filters::repost_abuse::RepostAbuseFilter;
use filters::size::SizeFilter;
use filters::tags::TagsFilter;
use policy::{Filter, Pipeline, RejectionHandler};
use store::{BanStore, SledStore};
use strfry::{CommandClient, StrfryClient};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "gatr",
    author,
    version,
    about = "Policy sidecar for strfry-compatible Nostr relays"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,
    /// Run with built-in defaults if the config file is missing.
    #[arg(long)]
    use_defaults: bool,
    /// Validate the configuration file and exit.
    #[arg(long)]
    validate: bool,
    /// Log what would be rejected without actually rejecting it.
    #[arg(long)]
    dry_run: bool,
}

/// One line of the relay's policy stream. Newer relays send source
/// metadata via `sourceType`/`sourceInfo`; older setups may still send
/// a top-level `ip`.
#[derive(Debug, Deserialize)]
struct PolicyInput {
    #[serde(default, rename = "type")]
    _kind: Option<String>,
    event: Event,
    #[serde(default, rename = "sourceType")]
    source_type: String,
    #[serde(default, rename = "sourceInfo")]
    source_info: String,
    #[serde(default)]
    ip: String,
}

impl PolicyInput {
    fn remote_ip(&self) -> &str {
        match self.source_type.as_str() {
            "IP4" | "IP6" => &self.source_info,
            _ if !self.ip.is_empty() => &self.ip,
            _ => "",
        }
    }
}

/// Wire all stages and rejection handlers into a pipeline.
fn build_pipeline(cfg: &Config, store: Arc<dyn BanStore>) -> Result<Pipeline> {
    let strfry: Arc<dyn StrfryClient> = Arc::new(CommandClient::new(
        cfg.strfry.executable_path.clone(),
        cfg.strfry.config_path.clone(),
    ));

    let stages: Vec<Box<dyn Filter>> = vec![
        Box::new(EmergencyFilter::new(&cfg.filters.emergency)),
        Box::new(KindFilter::new(&cfg.policy)),
        Box::new(RateLimiterFilter::new(&cfg.filters.rate_limiter)),
        Box::new(FreshnessFilter::new(&cfg.filters.freshness)),
        Box::new(SizeFilter::new(&cfg.filters.size)),
        Box::new(TagsFilter::new(&cfg.filters.tags)),
        Box::new(KeywordFilter::new(&cfg.filters.keywords).context("failed to create KeywordFilter")?),
        Box::new(RepostAbuseFilter::new(&cfg.filters.repost_abuse)),
        Box::new(
            EphemeralChatFilter::new(&cfg.filters.ephemeral_chat)
                .context("failed to create EphemeralChatFilter")?,
        ),
        Box::new(LanguageFilter::new(&cfg.filters.language)),
        Box::new(BannedAuthorFilter::new(
            store.clone(),
            &cfg.filters.banned_author,
        )),
        Box::new(ModerationFilter::new(&cfg.policy, store.clone(), strfry)),
    ];

    let handlers: Vec<Arc<dyn RejectionHandler>> =
        vec![Arc::new(AutoBanFilter::new(store, &cfg.filters.autoban))];

    Ok(Pipeline::new(cfg, stages, handlers))
}

/// Load the config and build the full pipeline once, then exit.
fn validate_configuration(config_path: &Path) -> Result<()> {
    println!("Validating configuration file: {}", config_path.display());
    let (cfg, _) = Config::load(config_path, false)?;
    let store: Arc<dyn BanStore> = Arc::new(SledStore::open(&cfg.database.path)?);
    build_pipeline(&cfg, store.clone())?;
    store.close()
}

async fn run_app(cli: Cli) -> Result<()> {
    let (cfg, defaults_used) = Config::load(&cli.config, cli.use_defaults)
        .context("failed to load configuration")?;

    let _ = tracing_subscriber::fmt()
        .with_max_level(cfg.log.level.to_tracing())
        .with_writer(std::io::stderr)
        .try_init();

    if cli.dry_run {
        warn!("running in dry-run mode, all 'reject' actions will be logged but not enforced");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %cli.config.display(),
        using_defaults = defaults_used,
        "policy sidecar starting up"
    );

    let store: Arc<dyn BanStore> = Arc::new(
        SledStore::open(&cfg.database.path).context("failed to initialize ban database")?,
    );
    let pipeline = Arc::new(ArcSwap::from_pointee(build_pipeline(&cfg, store.clone())?));

    // Reloads build a whole new pipeline and swap it in; a failed
    // reload keeps the running one.
    let reload_pipeline = pipeline.clone();
    let reload_store = store.clone();
    let config_path = cli.config.clone();
    let watcher_task = tokio::spawn(watcher::watch_config(
        cli.config.clone(),
        Duration::ZERO,
        move || match Config::load(&config_path, false) {
            Ok((new_cfg, _)) => match build_pipeline(&new_cfg, reload_store.clone()) {
                Ok(new_pipeline) => {
                    reload_pipeline.store(Arc::new(new_pipeline));
                    info!(path = %config_path.display(), "pipeline reloaded successfully");
                }
                Err(err) => {
                    error!(error = %err, "failed to build new pipeline on config reload, keeping old one");
                }
            },
            Err(err) => {
                error!(error = %err, "failed to reload config file, keeping old configuration");
            }
        },
    ));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = process_events(stdin, stdout, pipeline, cli.dry_run, shutdown_signal()).await;

    watcher_task.abort();
    store.close()?;
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = ctrl_c.await;
        }
    }
    info!("received shutdown signal, shutting down gracefully");
}

/// Main transport loop: one JSON event per input line, one JSON verdict
/// per output line. Malformed lines are logged and skipped. Returns on
/// EOF, closed output pipe, or shutdown; in-flight events always finish.
async fn process_events<R, W, S>(
    reader: R,
    mut writer: W,
    pipeline: Arc<ArcSwap<Pipeline>>,
    dry_run: bool,
    shutdown: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut lines = reader.lines();
    info!("ready to process events from stdin");

    loop {
        let maybe_line = tokio::select! {
            maybe = lines.next_line() => maybe.context("error reading from stdin")?,
            _ = &mut shutdown => {
                info!("shutting down event processing");
                return Ok(());
            }
        };
        let Some(line) = maybe_line else {
            info!("input stream closed, shutting down");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let input: PolicyInput = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(err) => {
                let prefix: String = line.chars().take(256).collect();
                warn!(error = %err, raw_line_prefix = %prefix, "failed to decode policy input JSON");
                continue;
            }
        };

        let remote_ip = input.remote_ip().to_string();
        let response = pipeline
            .load_full()
            .process_event(&input.event, &remote_ip, dry_run)
            .await;

        let mut buf = serde_json::to_vec(&response)?;
        buf.push(b'\n');
        let written = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                warn!("stdout pipe closed by the parent process, shutting down");
                return Ok(());
            }
            error!(error = %err, "failed to write response to stdout");
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.validate {
        return match validate_configuration(&cli.config) {
            Ok(()) => {
                println!("Configuration is VALID.");
                Ok(())
            }
            Err(err) => {
                eprintln!("Configuration is INVALID: {err:#}");
                std::process::exit(1);
            }
        };
    }
    run_app(cli).await
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
