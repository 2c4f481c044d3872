use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{DeliverySchedule, ScheduleError, SEND_IMMEDIATELY};

/// Channel entry as written in the routing config source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    /// Subscriber unique names, in delivery order
    #[serde(default)]
    pub subscribers: Vec<String>,
    /// Notifier names, in delivery order
    #[serde(default)]
    pub notifiers: Vec<String>,
    /// `@immediately` or a cron expression
    pub time_to_notify: String,
}

/// A validated channel with its parsed delivery schedule
#[derive(Debug, Clone)]
pub struct Channel {
    definition: ChannelDefinition,
    schedule: DeliverySchedule,
}

impl Channel {
    /// Validate a definition, parsing its schedule expression.
    pub fn from_definition(definition: ChannelDefinition) -> Result<Self, ScheduleError> {
        let schedule = DeliverySchedule::parse(&definition.time_to_notify)?;
        Ok(Self {
            definition,
            schedule,
        })
    }

    /// Build a channel that delivers at ingestion time.
    pub fn immediate(
        name: impl Into<String>,
        subscribers: Vec<String>,
        notifiers: Vec<String>,
    ) -> Self {
        Self {
            definition: ChannelDefinition {
                name: name.into(),
                subscribers,
                notifiers,
                time_to_notify: SEND_IMMEDIATELY.to_string(),
            },
            schedule: DeliverySchedule::Immediate,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn subscribers(&self) -> &[String] {
        &self.definition.subscribers
    }

    pub fn notifiers(&self) -> &[String] {
        &self.definition.notifiers
    }

    pub fn time_to_notify(&self) -> &str {
        &self.definition.time_to_notify
    }

    pub fn schedule(&self) -> &DeliverySchedule {
        &self.schedule
    }

    pub fn definition(&self) -> &ChannelDefinition {
        &self.definition
    }

    pub fn should_send_immediately(&self) -> bool {
        self.schedule.is_immediate()
    }

    /// Whether the channel's delivery window contains `now`
    pub fn should_send_now(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(now)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
    }
}

impl Eq for Channel {}
