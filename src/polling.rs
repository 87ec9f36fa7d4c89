//! Cancellable fixed-delay polling shared by the job and session pollers.

use std::future::Future;

use anyhow::Result;
use tokio::{
    task::JoinHandle,
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

use crate::settings::PipelineConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Probes allowed before giving up; `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// What one probe decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    Continue,
    Done(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed(T),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Runs `probe` until it returns [`PollStep::Done`], the attempt ceiling is
/// hit, or `cancel` fires.
///
/// The first probe runs immediately; each following one is scheduled
/// `policy.interval` after the previous one resolved. A failed probe counts as
/// an attempt and is retried on the next tick.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    policy: PollPolicy,
    cancel: CancellationToken,
    mut probe: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T>>>,
{
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            log_debug!("{what}: poller cancelled before attempt {}", attempts + 1);
            return PollOutcome::Cancelled;
        }
        attempts = attempts.saturating_add(1);

        let result = tokio::select! {
            result = probe(attempts) => result,
            _ = cancel.cancelled() => {
                log_debug!("{what}: poller cancelled during attempt {attempts}");
                return PollOutcome::Cancelled;
            }
        };

        match result {
            Ok(PollStep::Done(value)) => {
                log_info!("{what}: settled after {attempts} attempt(s)");
                return PollOutcome::Completed(value);
            }
            Ok(PollStep::Continue) => {}
            Err(err) => log_warn!("{what}: poll attempt {attempts} failed: {err:#}"),
        }

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            log_warn!("{what}: giving up after {attempts} attempts");
            return PollOutcome::TimedOut { attempts };
        }

        tokio::select! {
            _ = time::sleep(policy.interval) => {}
            _ = cancel.cancelled() => {
                log_debug!("{what}: poller cancelled while waiting");
                return PollOutcome::Cancelled;
            }
        }
    }
}

/// A spawned poller. Dropping the handle leaves the task running; call
/// [`PollHandle::cancel`] to stop it.
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl PollHandle {
    /// Spawns `task`, handing it a fresh cancellation token.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(task(token.clone()));
        Self { token, join }
    }

    /// Signals the task to stop. Takes effect at its next await point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the task to wind down, mostly useful in tests.
    pub async fn join(self) {
        if let Err(err) = self.join.await {
            if !err.is_cancelled() {
                log_warn!("poller task panicked: {err}");
            }
        }
    }
}
