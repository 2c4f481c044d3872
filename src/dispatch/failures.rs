use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::notifier::NotifierError;
use crate::store::StoreError;

/// Per-subscriber send errors collected during one dispatch.
///
/// Keyed by subscriber unique name; when a subscriber fails on several
/// notifiers the last error is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryFailures {
    notification_ids: Vec<i64>,
    errors: BTreeMap<String, NotifierError>,
}

impl DeliveryFailures {
    pub fn new(notification_ids: Vec<i64>) -> Self {
        Self {
            notification_ids,
            errors: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, subscriber: impl Into<String>, error: NotifierError) {
        self.errors.insert(subscriber.into(), error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Identifiers of the batch that was attempted
    pub fn notification_ids(&self) -> &[i64] {
        &self.notification_ids
    }

    pub fn errors(&self) -> &BTreeMap<String, NotifierError> {
        &self.errors
    }

    /// Unique names of the subscribers that failed, sorted
    pub fn failed_subscribers(&self) -> Vec<&str> {
        self.errors.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for DeliveryFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = self
            .notification_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let errors = self
            .errors
            .iter()
            .map(|(subscriber, error)| format!("{} => {}", subscriber, error))
            .collect::<Vec<_>>()
            .join("; ");

        write!(f, "failed to send notifications {}: {}", ids, errors)
    }
}

/// Errors returned by a dispatch attempt
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Some sends failed; the batch was still marked delivered
    #[error("{0}")]
    PartialFailure(DeliveryFailures),

    /// The delivered flag could not be set; `failures` holds any sends of the
    /// same pass that failed
    #[error("could not update delivery state: {source}")]
    Store {
        #[source]
        source: StoreError,
        failures: Option<DeliveryFailures>,
    },
}

impl DeliveryError {
    /// Per-subscriber send errors, whichever way the dispatch failed
    pub fn failures(&self) -> Option<&DeliveryFailures> {
        match self {
            DeliveryError::PartialFailure(failures) => Some(failures),
            DeliveryError::Store { failures, .. } => failures.as_ref(),
        }
    }
}
