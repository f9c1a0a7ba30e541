//! Tracing configuration and initialization.
//!
//! The log level arrives through construction (the CLI flag) rather than any
//! process-global mutable state. `MIRROR_FS_LOG` accepts full `EnvFilter`
//! directives and serves as the fallback when no explicit level is given.

use thiserror::Error;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

#[derive(Debug, Error)]
pub enum TrcError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

pub struct Trc {
    env_filter: EnvFilter,
}

impl Trc {
    /// Build the filter from an explicit level/directive string. An explicit
    /// level wins over the environment; with neither, `info`.
    pub fn new(level: Option<&str>) -> Result<Self, TrcError> {
        let env_filter = match level {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_from_env("MIRROR_FS_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        };
        Ok(Self { env_filter })
    }

    pub fn init(self) -> Result<(), TrcError> {
        tracing_subscriber::registry()
            .with(self.env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
        Ok(())
    }
}
