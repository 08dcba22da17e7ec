use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Console logging always; plain-text file logging when enabled. `RUST_LOG` overrides the level.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.debug).into());

    let file_layer = if config.file_enabled {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file_path)?;
        Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    if config.file_enabled {
        tracing::info!(path = %config.file_path.display(), "file logging enabled");
    }
    Ok(())
}

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug,sqlx=info,tower_http=debug"
    } else {
        "info,tower_http=info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_level() {
        assert!(default_filter(true).starts_with("debug"));
        assert!(default_filter(false).starts_with("info"));
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
    }
}
