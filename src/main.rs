// locator-probe: run a candidate list against a live page
//
// Attaches to a Chrome started with --remote-debugging-port, tries the given
// selectors in order against the first open page and optionally waits for a
// matching network response. Exits non-zero when nothing matched or the
// watched response did not arrive or was not 2xx.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use resilient_locator::{
    BrowserSession, CorrelationOutcome, LocateOptions, ResilientLocator, ResponsePredicate, arm,
    candidates, load_yaml_config, validate_wait_timeout,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "locator-probe", version, about = "Probe candidate selectors against a live page")]
struct Args {
    /// DevTools websocket URL of the running browser
    #[arg(long)]
    ws: String,

    /// YAML config; defaults apply when the file does not exist
    #[arg(long, default_value = "locator.yaml")]
    config: PathBuf,

    /// Candidate selector, highest priority first (repeatable)
    #[arg(long = "selector", required = true)]
    selectors: Vec<String>,

    #[arg(long)]
    require_enabled: bool,

    /// Click the matched element
    #[arg(long)]
    click: bool,

    /// Wait for a response whose URL contains this text
    #[arg(long)]
    watch_url: Option<String>,

    /// Restrict the watched response to these methods (repeatable)
    #[arg(long = "method")]
    methods: Vec<String>,

    /// Response wait in milliseconds; overrides the config value
    #[arg(long)]
    watch_ms: Option<u64>,

    /// Print one JSON report line instead of plain text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    index: usize,
    selector: &'a str,
    clicked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<ResponseReport>,
}

#[derive(Serialize)]
struct ResponseReport {
    status: Option<u16>,
    method: String,
    url: String,
    body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_yaml_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let mut options = LocateOptions::try_from(&config.locator).context("Invalid locator config")?;
    if args.require_enabled {
        options.require_enabled = true;
    }
    let locator = ResilientLocator::new(options);
    let watch_timeout = validate_wait_timeout(args.watch_ms, config.correlator.timeout_ms)
        .context("Invalid response wait")?;

    let session = BrowserSession::connect(&args.ws)
        .await
        .context("Failed to attach to browser")?;
    let driver = session.driver().await.context("Failed to get page")?;
    let candidates = candidates(args.selectors.iter().map(String::as_str));

    // Subscribe before acting so a response triggered by the click is not missed.
    let pending = match &args.watch_url {
        Some(url) => {
            let mut predicate = ResponsePredicate::url_contains(url);
            if !args.methods.is_empty() {
                predicate = ResponsePredicate::methods(&args.methods).and(predicate);
            }
            Some(arm(&driver, predicate).await?)
        }
        None => None,
    };

    let matched = if args.click {
        locator.click_first(&driver, &candidates).await?
    } else {
        locator.locate(&driver, &candidates).await?.index()
    };

    let Some(index) = matched else {
        bail!("No candidate matched out of {}", candidates.len());
    };
    let selector = candidates[index].selector();

    let response = match pending {
        Some(pending) => match pending.wait_successful(watch_timeout).await? {
            CorrelationOutcome::Matched {
                status,
                method,
                url,
                body,
            } => Some(ResponseReport {
                status: Some(status),
                method,
                url,
                body_bytes: body.len(),
            }),
            CorrelationOutcome::TimedOut => {
                info!("No matching response within {}ms", watch_timeout.as_millis());
                Some(ResponseReport {
                    status: None,
                    method: String::new(),
                    url: String::new(),
                    body_bytes: 0,
                })
            }
        },
        None => None,
    };

    if args.json {
        let report = Report {
            index,
            selector,
            clicked: args.click,
            response,
        };
        println!("{}", serde_json::to_string(&report)?);
        return check_watch(report.response.as_ref(), watch_timeout);
    }

    println!("matched candidate {}: {}", index, candidates[index]);
    if let Some(ResponseReport {
        status: Some(status),
        method,
        url,
        body_bytes,
    }) = &response
    {
        println!("response {} {} -> {} ({} bytes)", method, url, status, body_bytes);
    }
    check_watch(response.as_ref(), watch_timeout)
}

/// A watched response that never arrived fails the run.
fn check_watch(response: Option<&ResponseReport>, timeout: Duration) -> Result<()> {
    if let Some(ResponseReport { status: None, .. }) = response {
        bail!("No matching response within {}ms", timeout.as_millis());
    }
    Ok(())
}
