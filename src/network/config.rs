//! Client configuration

use std::time::Duration;

use thiserror::Error;

use super::multiplexer::BackendKind;

/// Default `poll` wait in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

/// Shortest socket read timeout; a zero poll wait still bounds frame reads
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("timeout must be a finite, non-negative number of seconds, got {0}")]
    InvalidTimeout(f64),
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Default wait for [`poll`](super::AdminClient::poll), in seconds
    timeout: f64,
    /// Force a multiplexer backend instead of probing
    pub backend: Option<BackendKind>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            backend: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> f64 {
        self.timeout
    }

    pub fn set_timeout(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.timeout = validate_timeout(secs)?;
        Ok(())
    }

    /// Builder-style [`set_timeout`](Self::set_timeout)
    pub fn with_timeout(mut self, secs: f64) -> Result<Self, ConfigError> {
        self.set_timeout(secs)?;
        Ok(self)
    }

    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.backend = Some(kind);
        self
    }

    /// Socket read timeout matching the poll timeout, never below
    /// [`MIN_READ_TIMEOUT`]. A peer that stalls mid-frame for longer than this
    /// is treated as gone.
    pub fn read_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or(MIN_READ_TIMEOUT)
            .max(MIN_READ_TIMEOUT)
    }
}

/// Seconds → `Duration`, rejecting negative, non-finite and overflowing values
pub(crate) fn timeout_duration(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs))
}

fn validate_timeout(secs: f64) -> Result<f64, ConfigError> {
    timeout_duration(secs).map(|_| secs)
}
