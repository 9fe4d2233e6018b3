//! Bounded-interval, bounded-timeout polling with cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, UpgradeError};

/// Default interval between two checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// The condition holds.
    Done,
    /// Not there yet; carries what was observed for the timeout message.
    NotYet(String),
}

/// Poll `check` every `interval` until it reports [`PollStatus::Done`].
///
/// A check error is terminal and returned as is. Exceeding `timeout` yields
/// [`UpgradeError::Timeout`] naming `condition` and the last observation.
/// Cancelling `cancel` yields [`UpgradeError::Cancelled`].
/// The check runs at least once, even with a zero timeout.
pub async fn poll<F, Fut>(
    condition: &str,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus>>,
{
    // A timeout too large to represent as an instant never expires.
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if cancel.is_cancelled() {
            return Err(UpgradeError::Cancelled(condition.to_string()));
        }

        let observed = match check().await? {
            PollStatus::Done => {
                debug!("Condition met: {}", condition);
                return Ok(());
            }
            PollStatus::NotYet(observed) => observed,
        };
        trace!("Waiting for {}: {}", condition, observed);

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(UpgradeError::Timeout {
                        condition: condition.to_string(),
                        last_observed: observed,
                        timeout,
                    });
                }
                interval.min(deadline - now)
            }
            None => interval,
        };

        tokio::select! {
            () = cancel.cancelled() => {
                return Err(UpgradeError::Cancelled(condition.to_string()));
            }
            () = tokio::time::sleep(pause) => {}
        }
    }
}
