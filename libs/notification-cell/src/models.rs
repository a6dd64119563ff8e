use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use shared_models::notification::NotificationKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Minute,
}

impl Cadence {
    pub fn kinds(&self) -> &'static [NotificationKind] {
        match self {
            Cadence::Hourly => &[
                NotificationKind::ConfirmBeforeAppt,
                NotificationKind::RemindBeforeAppt,
                NotificationKind::SecNotConfirmedBeforeAppt,
            ],
            Cadence::Minute => &[NotificationKind::CheckinBeforeAppt],
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hourly => write!(f, "hourly"),
            Cadence::Minute => write!(f, "minute"),
        }
    }
}

/// Result of firing the due jobs of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindOutcome {
    pub matched: usize,
    pub published: usize,
    pub failed_publishes: usize,
    pub stamped: usize,
    /// Appointments moved CONFIRM1 -> CONFIRM2 by the reminder kind.
    pub transitioned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindReport {
    pub kind: NotificationKind,
    pub result: Result<KindOutcome, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub cadence: Cadence,
    pub ran_at: DateTime<Utc>,
    pub kinds: Vec<KindReport>,
}

impl TickReport {
    pub fn outcome(&self, kind: NotificationKind) -> Option<&Result<KindOutcome, String>> {
        self.kinds.iter().find(|report| report.kind == kind).map(|report| &report.result)
    }

    pub fn failures(&self) -> usize {
        self.kinds.iter().filter(|report| report.result.is_err()).count()
    }
}

/// What the front desk should do next, derived from the most recent
/// notification fired for an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextActionHint {
    NothingSent,
    AwaitPatientConfirmation,
    ConfirmationReminderSent,
    CallPatient,
    AwaitCheckIn,
}

impl From<Option<NotificationKind>> for NextActionHint {
    fn from(last: Option<NotificationKind>) -> Self {
        match last {
            None => NextActionHint::NothingSent,
            Some(NotificationKind::ConfirmBeforeAppt) => NextActionHint::AwaitPatientConfirmation,
            Some(NotificationKind::RemindBeforeAppt) => NextActionHint::ConfirmationReminderSent,
            Some(NotificationKind::SecNotConfirmedBeforeAppt) => NextActionHint::CallPatient,
            Some(NotificationKind::CheckinBeforeAppt) => NextActionHint::AwaitCheckIn,
        }
    }
}
