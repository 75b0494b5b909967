use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use capture_intercept::config::Config;
use capture_intercept::payload::Body;
use capture_intercept::pipeline::Pipeline;
use capture_intercept::sinks::channel::ChannelSink;
use capture_intercept::sinks::print::PrintSink;
use capture_intercept::sinks::EventSink;
use clap::Parser;
use envconfig::Envconfig;
use tokio::io::AsyncReadExt;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Decode a captured analytics request body and print what would be relayed, one JSON
/// message per line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// URL the body was sent to, including its query string
    url: String,

    /// File holding the request body, stdin when omitted
    file: Option<PathBuf>,

    /// Treat the body as binary instead of UTF-8 text
    #[arg(long)]
    binary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::init_from_env().context("failed to load config from env")?;

    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    let installed = if config.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    let (channel, mut rx) = ChannelSink::new();
    let sink: Arc<dyn EventSink + Send + Sync> = if config.print_sink {
        Arc::new(PrintSink {})
    } else {
        Arc::new(channel)
    };
    let pipeline = Pipeline::from_config(&config, sink);

    if !pipeline.matches(&args.url) {
        warn!(url = %args.url, "url does not match any capture endpoint, nothing to decode");
        return Ok(());
    }

    let raw = match &args.file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .context("failed to read stdin")?;
            buf
        }
    };
    let body = if args.binary {
        Body::from(raw)
    } else {
        Body::from(String::from_utf8(raw).context("body is not valid UTF-8, try --binary")?)
    };

    match pipeline.process(&args.url, &body).await {
        Ok(published) => info!(published, "payload decoded"),
        Err(failure) => {
            let marker = serde_json::to_string(&failure)?;
            warn!(
                reason = failure.reason(),
                marker = %marker,
                "payload could not be decoded"
            );
            return Ok(());
        }
    }

    while let Ok(message) = rx.try_recv() {
        println!("{}", serde_json::to_string(&message)?);
    }

    Ok(())
}
