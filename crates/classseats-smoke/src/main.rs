//! ClassSeats Smoke Harness
//!
//! Installs and activates the offline agent against a live origin, replays a
//! few intercepted requests through it, and prints a JSON summary. With
//! `--state` the cache storage is loaded from and saved to a file, so a
//! second run with `--offline` shows what the app would get without network.

use classseats_common::{init_logging, AgentConfig, LogConfig, LogFormat};
use classseats_net::{HttpNetwork, LoaderConfig, MemoryNetwork, Network, Request};
use classseats_sw::{CacheStorage, EventOutcome, Registration};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

/// Parse command line arguments
struct Args {
    config: Option<PathBuf>,
    scope: Option<String>,
    revision: Option<String>,
    state: Option<PathBuf>,
    fetch: Vec<String>,
    navigate: Vec<String>,
    offline: bool,
    log_format: LogFormat,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self {
            config: None,
            scope: None,
            revision: None,
            state: None,
            fetch: Vec::new(),
            navigate: Vec::new(),
            offline: false,
            log_format: LogFormat::Compact,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = args.next().map(PathBuf::from),
                "--scope" => parsed.scope = args.next(),
                "--revision" => parsed.revision = args.next(),
                "--state" => parsed.state = args.next().map(PathBuf::from),
                "--fetch" => parsed.fetch.extend(args.next()),
                "--navigate" => parsed.navigate.extend(args.next()),
                "--offline" => parsed.offline = true,
                "--log-format" => {
                    if let Some(val) = args.next() {
                        parsed.log_format = val.parse().unwrap_or(LogFormat::Compact);
                    }
                }
                other => eprintln!("ignoring unknown argument: {other}"),
            }
        }

        parsed
    }

    fn agent_config(&self) -> Result<AgentConfig, Box<dyn std::error::Error>> {
        let mut config = match (&self.config, &self.scope) {
            (Some(path), _) => AgentConfig::from_json_file(path)?,
            (None, Some(scope)) => AgentConfig::new(Url::parse(scope)?)?,
            (None, None) => AgentConfig::from_env()?,
        };
        if let Some(ref revision) = self.revision {
            config = AgentConfig::with_revision(config.scope, revision.clone())?;
        }
        Ok(config)
    }
}

fn describe(outcome: &EventOutcome) -> serde_json::Value {
    match outcome {
        EventOutcome::RespondWith(response) => json!({
            "status": response.status.as_u16(),
            "status_text": response.status_text,
            "bytes": response.body.len(),
        }),
        EventOutcome::Passthrough(decision) => json!({ "passthrough": decision }),
        other => json!({ "unexpected": format!("{other:?}") }),
    }
}

async fn run(args: Args) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let config = args.agent_config()?;
    info!(scope = %config.scope, cache = %config.cache_name(), "Starting ClassSeats smoke run");

    let storage = match args.state {
        Some(ref path) => CacheStorage::load(path)?,
        None => CacheStorage::new(),
    };

    let network: Arc<dyn Network> = if args.offline {
        let network = MemoryNetwork::new();
        network.set_offline(true);
        Arc::new(network)
    } else {
        Arc::new(HttpNetwork::new(LoaderConfig::default())?)
    };

    let mut registration =
        Registration::with_storage(config.scope.clone(), storage.shared(), network);

    let install = match registration.update(&config.revision).await {
        Ok(report) => json!(report),
        Err(e) => {
            error!(error = %e, "Install failed");
            json!({ "error": e.to_string() })
        }
    };

    let mut requests = Vec::new();
    for path in &args.navigate {
        let url = config.scope.join(path)?;
        let outcome = registration.fetch(Request::navigate(url.clone())).await;
        requests.push(json!({ "navigate": url.as_str(), "outcome": describe(&outcome) }));
    }
    for path in &args.fetch {
        let url = config.scope.join(path)?;
        let outcome = registration.fetch(Request::get(url.clone())).await;
        requests.push(json!({ "fetch": url.as_str(), "outcome": describe(&outcome) }));
    }
    registration.flush().await;

    let caches = registration.caches().read().await;
    if let Some(ref path) = args.state {
        caches.save(path)?;
    }

    Ok(json!({
        "cache_name": config.cache_name(),
        "install": install,
        "caches": caches.keys(),
        "requests": requests,
    }))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(LogConfig::default().with_format(args.log_format));

    match run(args).await {
        Ok(summary) => {
            println!("{summary:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Smoke run failed");
            ExitCode::FAILURE
        }
    }
}
