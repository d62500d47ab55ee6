use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::batch::shutdown_requested;
use crate::domain::DomainError;

/// One unit of background work driven by a [`PollingScheduler`].
#[async_trait]
pub trait PollingJob: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one pass and returns how many documents were processed.
    async fn run_pass(&self, shutdown: watch::Receiver<bool>) -> Result<usize, DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub idle_interval: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(10),
            backoff_floor: Duration::from_secs(10),
            backoff_ceiling: Duration::from_secs(3600),
        }
    }
}

/// Exponential backoff between a floor and a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Returns the delay to sleep now and doubles the next one.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

pub struct PollingScheduler {
    job: Arc<dyn PollingJob>,
    config: SchedulerConfig,
    backoff: Backoff,
}

impl PollingScheduler {
    pub fn new(job: Arc<dyn PollingJob>, config: SchedulerConfig) -> Self {
        Self {
            job,
            backoff: Backoff::new(config.backoff_floor, config.backoff_ceiling),
            config,
        }
    }

    /// How long to wait after a pass. `None` means start the next pass now.
    pub fn next_delay(&mut self, outcome: &Result<usize, DomainError>) -> Option<Duration> {
        match outcome {
            Ok(0) => {
                self.backoff.reset();
                Some(self.config.idle_interval)
            }
            Ok(_) => {
                self.backoff.reset();
                None
            }
            Err(_) => Some(self.backoff.on_failure()),
        }
    }

    /// Loops until `shutdown` flips to `true`. Pass errors are logged and
    /// never end the loop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let name = self.job.name().to_string();
        info!(job = %name, "scheduler started");

        while !*shutdown.borrow() {
            let outcome = self.job.run_pass(shutdown.clone()).await;

            match &outcome {
                Ok(0) => debug!(job = %name, "no documents pending"),
                Ok(processed) => info!(job = %name, processed, "pass completed"),
                Err(DomainError::Cancelled) => {
                    warn!(job = %name, "pass cancelled");
                }
                Err(e) => error!(job = %name, error = %e, "pass failed"),
            }

            let Some(delay) = self.next_delay(&outcome) else {
                continue;
            };
            if outcome.is_err() {
                warn!(job = %name, delay_secs = delay.as_secs(), "backing off");
            }

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(job = %name, "scheduler stopped");
    }
}
