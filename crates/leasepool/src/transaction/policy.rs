//! Retry budget for transaction conflicts

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::BackoffStrategy;

/// How many times a conflicting transaction is re-run
///
/// `Unbounded` is kept distinct from any count: it is the behaviour of the
/// plain [`run_transaction`](super::run_transaction) form, and callers opt
/// into a bound explicitly with `Limited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retries {
    #[default]
    Unbounded,
    Limited(u32),
}

impl Retries {
    /// Whether another retry is allowed after `retries_done` retries
    pub fn allows(&self, retries_done: u32) -> bool {
        match self {
            Retries::Unbounded => true,
            Retries::Limited(max) => retries_done < *max,
        }
    }
}

/// Retry budget plus optional spacing between retries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPolicy {
    #[serde(default)]
    retries: Retries,
    #[serde(default)]
    backoff: Option<BackoffStrategy>,
}

impl TransactionPolicy {
    pub fn new(retries: Retries) -> Self {
        Self {
            retries,
            backoff: None,
        }
    }

    /// Sleep according to `backoff` between retries
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn retries(&self) -> Retries {
        self.retries
    }

    pub fn backoff(&self) -> Option<&BackoffStrategy> {
        self.backoff.as_ref()
    }

    /// Pause before retry number `attempt`, if any
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        self.backoff.as_ref().map(|b| b.calculate_delay(attempt))
    }
}

impl From<Retries> for TransactionPolicy {
    fn from(retries: Retries) -> Self {
        Self::new(retries)
    }
}
