//! Periodic task scheduling
//!
//! A [`PeriodicTask`] runs a [`PeriodicJob`] immediately on start and then on a
//! fixed interval, one run at a time. Stopping aborts the task and waits for it
//! to finish, so no run of the job is still in flight once `stop` returns.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

/// Work executed on every tick
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Execute one tick; failures are handled (logged) by the job itself
    async fn run(&self);
}

/// A job bound to an interval, with explicit start and stop
pub struct PeriodicTask {
    job: Arc<dyn PeriodicJob>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Create a stopped task
    pub fn new(job: Arc<dyn PeriodicJob>, period: Duration) -> Self {
        Self {
            job,
            period,
            handle: None,
        }
    }

    /// Tick interval
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task is scheduled
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start ticking; the first tick fires immediately
    ///
    /// No-op when already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let job = self.job.clone();
        let period = self.period;
        debug!("Starting periodic task {} every {:?}", job.name(), period);

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job.run().await;
            }
        }));
    }

    /// Cancel the task and wait until it has stopped
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Stopping periodic task {}", self.job.name());
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
