use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use readwise_sync::client::blocking::ReadwiseClient;
use readwise_sync::{config, BackgroundPoller};

#[derive(Debug, Parser)]
#[command(author, version, about = "Poll Readwise for new highlights and documents")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Print an example config and exit
    #[arg(long)]
    print_example_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let client = ReadwiseClient::with_options(cfg.client_options()?)?;
    let mut poller = BackgroundPoller::new(client, cfg.poller_config());

    poller.on_sync(|result| {
        info!(
            highlights = result.highlights.len(),
            documents = result.documents.len(),
            "poll cycle complete"
        );
        Ok(())
    });
    poller.on_error(|err| {
        warn!(error = %err, "poll cycle failed");
        Ok(())
    });

    poller.stop_signal().trip_on_ctrl_c()?;
    poller.start();

    let state = poller.state();
    if poller.consecutive_errors() >= poller.config().max_consecutive_errors {
        error!(
            last_error = state.last_error.as_deref().unwrap_or(""),
            "poller gave up after repeated failures"
        );
        anyhow::bail!("poller stopped after {} consecutive errors", poller.consecutive_errors());
    }
    info!(polls = state.poll_count, errors = state.error_count, "shutdown complete");
    Ok(())
}
