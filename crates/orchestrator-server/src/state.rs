//! Shared handler state and service wiring.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use orchestrator_core::channels::{
    IdentityVerificationChannel, InMemoryChallengeLedger, LoggingNotificationChannel,
    NotificationChannel,
};
use orchestrator_core::janitor::RegistryJanitor;
use orchestrator_core::workflow::{InProcessEngine, ProcessRunner, StepOutcome, VerificationWorker};
use orchestrator_core::{CorrelationRegistry, OrchestratorConfig, VerificationCoordinator};

use crate::clients::{HttpNotificationChannel, HttpScaChannel};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ProcessRunner>,
    pub coordinator: Arc<VerificationCoordinator>,
    pub registry: Arc<CorrelationRegistry<StepOutcome>>,
}

/// Everything `main` needs to serve and later stop.
pub struct Services {
    pub state: AppState,
    pub background: Vec<JoinHandle<()>>,
}

impl Services {
    /// Wire channels, coordinator, engine and janitor from `config`.
    ///
    /// Background tasks stop when `shutdown_rx` flips to true.
    pub fn build(config: &OrchestratorConfig, shutdown_rx: watch::Receiver<bool>) -> Result<Self> {
        let notifications: Arc<dyn NotificationChannel> = match &config.notifications_base_path {
            Some(base) => {
                tracing::info!(base_path = %base, "Using HTTP notification channel");
                Arc::new(HttpNotificationChannel::new(base)?)
            }
            None => {
                tracing::warn!("No notifications_base_path configured; codes are only logged");
                Arc::new(LoggingNotificationChannel::new())
            }
        };
        let challenges: Arc<dyn IdentityVerificationChannel> = match &config.sca_base_path {
            Some(base) => {
                tracing::info!(base_path = %base, "Using HTTP SCA channel");
                Arc::new(HttpScaChannel::new(base)?)
            }
            None => {
                tracing::warn!("No sca_base_path configured; challenges are kept in memory");
                Arc::new(InMemoryChallengeLedger::new())
            }
        };

        Ok(Self::with_channels(config, notifications, challenges, shutdown_rx))
    }

    pub fn with_channels(
        config: &OrchestratorConfig,
        notifications: Arc<dyn NotificationChannel>,
        challenges: Arc<dyn IdentityVerificationChannel>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let registry = Arc::new(CorrelationRegistry::with_shards(config.registry_shards));
        let coordinator = Arc::new(
            VerificationCoordinator::new(notifications, challenges, registry.clone())
                .with_challenge_ttl(config.challenge_ttl()),
        );

        let worker = Arc::new(VerificationWorker::new(coordinator.clone()));
        let (engine, engine_task) = InProcessEngine::spawn(
            worker,
            registry.clone(),
            config.worker_count,
            config.job_queue_capacity,
            shutdown_rx.clone(),
        );
        let runner = Arc::new(ProcessRunner::new(
            engine,
            registry.clone(),
            config.waiter_timeout(),
        ));

        let janitor = RegistryJanitor::new(
            registry.clone(),
            config.janitor_interval(),
            config.stale_waiter_age(),
        )
        .with_coordinator(coordinator.clone());
        let janitor_task = tokio::spawn(async move { janitor.run(shutdown_rx).await });

        Self {
            state: AppState {
                runner,
                coordinator,
                registry,
            },
            background: vec![engine_task, janitor_task],
        }
    }
}
