//! Bounded readiness polling with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// How often, and for how long, to check a remote file's state.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the second status check.
    pub initial_interval: Duration,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    pub multiplier: u32,
    /// Total number of status checks, including the first.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            multiplier: 2,
            max_attempts: 30,
        }
    }
}

impl PollConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Delay after the `attempt`-th check (zero based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }
}

/// Observed readiness of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// Calls `check` until it reports something other than `Pending`.
///
/// Fails with `ProcessingFailed` for a terminal non-ready state and with
/// `ProcessingTimeout` once `max_attempts` checks have all been pending.
pub async fn wait_until_ready<F, Fut>(config: &PollConfig, name: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness>>,
{
    let max_attempts = config.max_attempts.max(1);
    for attempt in 0..max_attempts {
        match check().await? {
            Readiness::Ready => return Ok(()),
            Readiness::Failed(state) => {
                return Err(Error::ProcessingFailed {
                    name: name.to_owned(),
                    state,
                })
            }
            Readiness::Pending if attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                debug!(file = name, attempt, ?delay, "still processing");
                tokio::time::sleep(delay).await;
            }
            Readiness::Pending => {}
        }
    }
    Err(Error::ProcessingTimeout {
        name: name.to_owned(),
        attempts: max_attempts,
    })
}
