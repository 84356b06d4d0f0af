//! Bounded calls to external collaborators
//!
//! Every embedding call and storage operation runs with a per-attempt
//! timeout and exactly one retry before the failure is surfaced.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, TierMemError};

/// Which collaborator a bounded call talks to; decides the error a
/// timeout is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Storage,
    Embedding,
}

impl Collaborator {
    fn timeout_error(self, what: &str, timeout: Duration) -> TierMemError {
        let msg = format!("{what} timed out after {}ms", timeout.as_millis());
        match self {
            Collaborator::Storage => TierMemError::StorageUnavailable(msg),
            Collaborator::Embedding => TierMemError::EmbeddingUnavailable(msg),
        }
    }
}

/// Total attempts made by [`bounded`]: the first call plus one retry
pub const MAX_ATTEMPTS: u32 = 2;

fn is_retryable(err: &TierMemError) -> bool {
    matches!(
        err,
        TierMemError::StorageUnavailable(_)
            | TierMemError::EmbeddingUnavailable(_)
            | TierMemError::Io(_)
    )
}

/// Run `op` with a timeout per attempt, retrying once on a transient failure.
///
/// Errors that are answers rather than failures (`NotFound`, `Config`, ...)
/// are returned immediately without a retry.
pub async fn bounded<T, F, Fut>(
    collaborator: Collaborator,
    what: &str,
    timeout: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(collaborator.timeout_error(what, timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS && is_retryable(&e) => {
                warn!(attempt, error = %e, "{what} failed, retrying once");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
