mod cli;
mod config;
mod console;
mod feed;
#[cfg(test)]
mod fixtures;
mod kubernetes;
mod notify;
mod observers;
#[cfg(test)]
mod tests;
mod types;
mod utils;

use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use cli::Cli;
use config::{ConfigError, Settings};
use console::Console;
use feed::Feed;
use kubernetes::ApiServer;
use notify::{Notifier, SlackNotifier};
use observers::{SharedNotifier, default_observers, default_since};
use types::ResourceKind;
use utils::Palette;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::from_cli(&cli, |key| std::env::var(key).ok()) {
        Ok(settings) => settings,
        Err(ConfigError::MissingApi) => {
            eprintln!("{}", ConfigError::MissingApi);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let notifier: SharedNotifier = match settings.slack.clone() {
        Some(slack) => match SlackNotifier::new(slack) {
            Ok(notifier) => Some(Arc::new(notifier) as Arc<dyn Notifier>),
            Err(e) => {
                warn!(error = %e, "Could not create slack client, alerts go to console only");
                None
            }
        },
        None => {
            info!("SLACK_TOKEN/SLACK_CHANNEL not set, alerts go to console only");
            None
        }
    };

    let observers = default_observers(
        default_since(),
        Palette::new(settings.color),
        Console::stdout(),
        notifier,
    );
    let source = ApiServer::new(
        &settings.api_base,
        &settings.token,
        settings.ca_pem.as_deref(),
    )?;

    let mut feeds = JoinSet::new();
    for kind in [ResourceKind::Pods, ResourceKind::Events] {
        let mut feed = Feed::new(
            source.clone(),
            kind,
            settings.namespace.clone(),
            observers.clone(),
        );
        info!(%kind, namespace = settings.namespace.as_deref().unwrap_or("*"), "Starting feed");
        feeds.spawn(async move {
            let err = feed.run().await;
            (feed, err)
        });
    }

    tokio::select! {
        _ = async {
            while let Some(joined) = feeds.join_next().await {
                match joined {
                    Ok((feed, err)) => error!(
                        kind = %feed.state().kind(),
                        namespace = feed.state().namespace().unwrap_or("*"),
                        resources = feed.state().len(),
                        error = %err,
                        "Feed stopped"
                    ),
                    Err(e) => error!(error = %e, "Feed task failed"),
                }
            }
        } => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
