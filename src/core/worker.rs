use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use super::scheduler::SchedulerInner;
use super::types::TickOutcome;

/// 后台调度循环的句柄
pub(crate) struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn spawn(inner: Arc<SchedulerInner>) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(inner, token.clone()));
        Self { token, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 通知循环退出，不等待
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 取消并最多等待 `grace`，被强制中止时返回 false
    pub async fn stop(self, grace: Duration) -> bool {
        self.token.cancel();
        let abort = self.handle.abort_handle();

        match timeout(grace, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                // 已 panic 或已中止
                warn!("Scheduler loop ended abnormally: {}", err);
                true
            }
            Err(_) => {
                warn!("Scheduler loop did not stop within {:?}, aborting", grace);
                abort.abort();
                false
            }
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, token: CancellationToken) {
    info!("Scheduler loop started");
    let poll_interval = inner.config().poll_interval;
    let error_backoff = inner.config().error_backoff;

    while !token.is_cancelled() {
        let delay = match inner.run_once().await {
            // 可能还有到期的条目
            Ok(TickOutcome::Uploaded { .. }) | Ok(TickOutcome::Skipped(_)) => continue,
            Ok(TickOutcome::Failed { id, error }) => {
                debug!("Upload {} failed, retrying next tick: {}", id, error);
                poll_interval
            }
            Ok(TickOutcome::NotDue { next }) => {
                debug!("Next upload due at {}", next);
                poll_interval
            }
            Ok(TickOutcome::Idle) => poll_interval,
            Err(err) => {
                error!("Scheduler loop error: {}", err);
                error_backoff
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    info!("Scheduler loop stopped");
}
