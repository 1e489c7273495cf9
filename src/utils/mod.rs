pub mod decimal;
pub mod retry;

use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::models::common::{Config, LogConfig};

const ENV_PREFIX: &str = "SCANNER";

/// Load the YAML config file, then layer `SCANNER__SECTION__KEY` environment
/// variables on top of it.
pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let path = file_name.as_ref();

    config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config file")?
        .try_deserialize()
        .context("failed to parse config YAML")
}

/// Parse a YAML config document without touching the filesystem or environment
pub fn load_config_from_str(contents: &str) -> Result<Config> {
    config::Config::builder()
        .add_source(config::File::from_str(contents, config::FileFormat::Yaml))
        .build()
        .context("failed to read config document")?
        .try_deserialize()
        .context("failed to parse config YAML")
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    if log.json {
        subscriber
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        subscriber.with(fmt::layer().with_target(true)).init();
    }
}

/// Run `future` under a deadline. `None` means the deadline passed first.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await.ok()
}

pub fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}
