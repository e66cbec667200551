use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::{CounterKey, DocumentNumber, DocumentType, EngineConfig, EngineError};

use super::{Store, UnitOfWork};

/// How often and how patiently a conflicting unit of work is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.number_retry_limit.max(1),
            backoff: config.backoff(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Run `attempt` until it succeeds, fails with something other than
/// [`EngineError::Conflict`], or the policy is exhausted.
///
/// Exhaustion is reported as [`EngineError::RetryExceeded`] naming `key`.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: RetryPolicy,
    key: &str,
    mut attempt: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    for n in 1..=policy.max_attempts {
        match attempt().await {
            Err(EngineError::Conflict(reason)) => {
                warn!(key, attempt = n, %reason, "unit of work conflicted");
                if n < policy.max_attempts {
                    tokio::time::sleep(policy.backoff * n).await;
                }
            }
            other => return other,
        }
    }
    Err(EngineError::RetryExceeded {
        key: key.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Issues gap-free, strictly increasing document numbers per
/// (document type, year).
#[derive(Clone)]
pub struct NumberGenerator {
    store: Arc<dyn Store>,
    policy: RetryPolicy,
    padding: usize,
}

impl NumberGenerator {
    pub fn new(store: Arc<dyn Store>, config: &EngineConfig) -> Self {
        Self {
            store,
            policy: RetryPolicy::from_config(config),
            padding: config.number_padding,
        }
    }

    /// Issue the next number in a unit of work of its own.
    ///
    /// The counter commits on its own here; documents that need the
    /// number to commit together with them use [`Self::issue_in`].
    #[instrument(skip(self))]
    pub async fn issue_number(
        &self,
        document_type: DocumentType,
        year: i32,
    ) -> Result<DocumentNumber, EngineError> {
        let key = CounterKey::new(document_type, year);
        let this = self;
        let number = retry_on_conflict(self.policy, &key.id(), move || async move {
            let mut uow = this.store.begin().await?;
            let number = this.issue_in(uow.as_mut(), key).await?;
            uow.commit().await?;
            Ok(number)
        })
        .await?;
        info!(%number, counter = %key, "number issued");
        Ok(number)
    }

    /// Issue the next number inside `uow`. The increment commits or rolls
    /// back with it.
    pub async fn issue_in(
        &self,
        uow: &mut dyn UnitOfWork,
        key: CounterKey,
    ) -> Result<DocumentNumber, EngineError> {
        let seq = uow.next_seq(key).await?;
        Ok(DocumentNumber::new(key.year, seq).with_padding(self.padding))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl std::fmt::Debug for NumberGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumberGenerator")
            .field("policy", &self.policy)
            .field("padding", &self.padding)
            .finish_non_exhaustive()
    }
}
