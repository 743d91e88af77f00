//! RegistryJanitor: background sweep of abandoned waiters and stale
//! verification records, terminal or not.
//!
//! Waiters normally leave the registry on completion, timeout or handle drop.
//! The janitor only catches entries whose owning task vanished without
//! running any of those paths (for example an aborted runtime task).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::registry::CorrelationRegistry;
use crate::verification::VerificationCoordinator;
use crate::workflow::StepOutcome;

/// Operations are kept this long after their last possible change.
const OPERATION_RETENTION: Duration = Duration::from_secs(60 * 60);

pub struct RegistryJanitor {
    registry: Arc<CorrelationRegistry<StepOutcome>>,
    coordinator: Option<Arc<VerificationCoordinator>>,
    interval: Duration,
    max_age: Duration,
}

impl RegistryJanitor {
    pub fn new(
        registry: Arc<CorrelationRegistry<StepOutcome>>,
        interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            registry,
            coordinator: None,
            interval,
            max_age,
        }
    }

    /// Also prune stale operations from `coordinator` on every cycle.
    pub fn with_coordinator(mut self, coordinator: Arc<VerificationCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_age_ms = self.max_age.as_millis() as u64,
            "RegistryJanitor started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_rx.changed() => break,
            }

            self.sweep_once();
        }

        tracing::info!("RegistryJanitor stopped");
    }

    /// One sweep cycle. Returns the number of registry entries evicted.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.evict_older_than(self.max_age);
        if let Some(coordinator) = &self.coordinator {
            coordinator.prune_finalized(OPERATION_RETENTION);
        }
        if evicted > 0 {
            tracing::debug!(evicted, "RegistryJanitor: sweep complete");
        }
        evicted
    }
}
