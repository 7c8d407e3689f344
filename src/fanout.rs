//! Best-effort fan-out
//!
//! Runs one operation per backend concurrently and waits for all of them.
//! A failure never cancels or taints the others; callers only learn which
//! roles succeeded and which failed.

use futures_util::future::join_all;
use std::future::Future;

use crate::connection::Role;

/// Result of a [`join_best_effort`] call
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub succeeded: Vec<Role>,
    pub failed: Vec<(Role, anyhow::Error)>,
}

impl FanOutOutcome {
    #[must_use]
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

/// Await every task, collecting successes and failures per role
///
/// No ordering is guaranteed between tasks completing.
pub async fn join_best_effort<F>(tasks: Vec<(Role, F)>) -> FanOutOutcome
where
    F: Future<Output = anyhow::Result<()>>,
{
    let results = join_all(
        tasks
            .into_iter()
            .map(|(role, task)| async move { (role, task.await) }),
    )
    .await;

    let mut outcome = FanOutOutcome::default();
    for (role, result) in results {
        match result {
            Ok(()) => outcome.succeeded.push(role),
            Err(e) => outcome.failed.push((role, e)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failure_does_not_cancel_others() {
        let slow_ok = |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<(), anyhow::Error>(())
        };
        let tasks: Vec<(Role, std::pin::Pin<Box<dyn Future<Output = anyhow::Result<()>>>>)> = vec![
            (Role::Local, Box::pin(async { Err(anyhow::anyhow!("boom")) })),
            (Role::Cloud, Box::pin(slow_ok(20))),
        ];

        let outcome = join_best_effort(tasks).await;
        assert!(outcome.any_succeeded());
        assert_eq!(outcome.succeeded, vec![Role::Cloud]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed.first().map(|(role, _)| *role), Some(Role::Local));
    }

    #[tokio::test]
    async fn test_empty_fan_out() {
        let tasks: Vec<(Role, std::future::Ready<anyhow::Result<()>>)> = Vec::new();
        let outcome = join_best_effort(tasks).await;
        assert!(!outcome.any_succeeded());
        assert!(outcome.failed.is_empty());
    }
}
