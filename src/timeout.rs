//! Cancellation and deadline handling.
//!
//! The traversal itself only polls a [`CancellationToken`]. Deadlines are
//! layered on top: [`analyze_path_with_timeout`] runs the analysis on the
//! blocking pool, cancels the token when the deadline passes and hands back
//! the partial report the traversal returns.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::SamplerConfig;
use crate::error::{Result, SamplerError};
use crate::sampler::{analyze_path, Control, Report};

/// Default timeout duration in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300; // 5 minutes

/// Fast operation timeout in seconds (for simple operations)
pub const FAST_TIMEOUT_SECONDS: u64 = 10;

/// How long a cancelled analysis may take to hand back its partial report.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Shared, cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Timeout configuration for analysis operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Whether to log timeout warnings
    pub log_warnings: bool,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    /// Create a new timeout configuration
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    /// Create a fast timeout configuration (10 seconds)
    pub fn fast(operation: impl Into<String>) -> Self {
        Self::new(FAST_TIMEOUT_SECONDS, operation)
    }

    /// Create a default timeout configuration (5 minutes)
    pub fn default_timeout(operation: impl Into<String>) -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS, operation)
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: &TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        operation = %config.operation_name,
        seconds = config.duration.as_secs(),
        "starting operation with timeout"
    );

    match timeout(config.duration, future).await {
        Ok(result) => result,
        Err(_) => {
            if config.log_warnings {
                error!(
                    operation = %config.operation_name,
                    seconds = config.duration.as_secs(),
                    "operation timed out"
                );
            }
            Err(SamplerError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

/// Analyze a file, returning a partial report once `limit` elapses.
///
/// The result carries `TraversalOutcome::Cancelled` when the deadline cut
/// the traversal short. `SamplerError::Timeout` is only returned if the
/// analysis does not stop within [`CANCEL_GRACE`] of being cancelled, which
/// can happen while the container headers are still being parsed.
pub async fn analyze_path_with_timeout(
    path: impl Into<PathBuf>,
    config: SamplerConfig,
    limit: &TimeoutConfig,
) -> Result<Report> {
    let path = path.into();
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let mut control = Control::new().with_cancellation(worker_token);
        analyze_path(&path, &config, &mut control)
    });

    let joined = match timeout(limit.duration, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            if limit.log_warnings {
                warn!(
                    operation = %limit.operation_name,
                    seconds = limit.duration.as_secs(),
                    "deadline reached, cancelling analysis"
                );
            }
            token.cancel();
            let grace = TimeoutConfig {
                duration: CANCEL_GRACE,
                log_warnings: limit.log_warnings,
                operation_name: format!("{} (cancelling)", limit.operation_name),
            };
            with_timeout(&grace, async { Ok::<_, SamplerError>((&mut handle).await) }).await?
        }
    };
    joined.map_err(|e| SamplerError::Internal(e.to_string()))?
}
