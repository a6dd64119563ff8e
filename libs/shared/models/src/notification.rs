use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::lookup::AppointmentStatusCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    #[serde(rename = "CHECKIN_BEFORE_APPT")]
    CheckinBeforeAppt,
    #[serde(rename = "SEC_NOT_CONFIRMED_BEFORE_APPT")]
    SecNotConfirmedBeforeAppt,
    #[serde(rename = "CONFIRM_BEFORE_APPT")]
    ConfirmBeforeAppt,
    #[serde(rename = "REMIND_BEFORE_APPT")]
    RemindBeforeAppt,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::CheckinBeforeAppt,
        NotificationKind::SecNotConfirmedBeforeAppt,
        NotificationKind::ConfirmBeforeAppt,
        NotificationKind::RemindBeforeAppt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CheckinBeforeAppt => "CHECKIN_BEFORE_APPT",
            NotificationKind::SecNotConfirmedBeforeAppt => "SEC_NOT_CONFIRMED_BEFORE_APPT",
            NotificationKind::ConfirmBeforeAppt => "CONFIRM_BEFORE_APPT",
            NotificationKind::RemindBeforeAppt => "REMIND_BEFORE_APPT",
        }
    }

    /// Topic published when a job of this kind fires.
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationKind::CheckinBeforeAppt => "APPOINTMENT_CHECKIN_REQUEST",
            NotificationKind::SecNotConfirmedBeforeAppt => "APPOINTMENT_SECRETARY_NOT_CONFIRMED",
            NotificationKind::ConfirmBeforeAppt => "APPOINTMENT_CONFIRMATION_REQUEST",
            NotificationKind::RemindBeforeAppt => "APPOINTMENT_REMINDER",
        }
    }

    /// Appointment statuses a due job of this kind still applies to.
    pub fn eligible_statuses(&self) -> &'static [AppointmentStatusCode] {
        match self {
            NotificationKind::ConfirmBeforeAppt => &[AppointmentStatusCode::Schedule],
            NotificationKind::RemindBeforeAppt => &[AppointmentStatusCode::Confirm1],
            NotificationKind::SecNotConfirmedBeforeAppt => &[AppointmentStatusCode::Confirm1],
            NotificationKind::CheckinBeforeAppt => &[
                AppointmentStatusCode::Confirm1,
                AppointmentStatusCode::Confirm2,
                AppointmentStatusCode::Schedule,
            ],
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: i64,
    pub clinic_id: Uuid,
    pub appointment_id: Uuid,
    pub kind: NotificationKind,
    pub target_date: DateTime<Utc>,
    pub sent_date: Option<DateTime<Utc>>,
    pub meta_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn is_sent(&self) -> bool {
        self.sent_date.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_sent() && self.target_date <= now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationJob {
    pub clinic_id: Uuid,
    pub appointment_id: Uuid,
    pub kind: NotificationKind,
    pub target_date: DateTime<Utc>,
    pub meta_data: serde_json::Value,
}

/// Target date computed for one kind, with the lead time it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationDate {
    pub kind: NotificationKind,
    pub target_date: DateTime<Utc>,
    pub lead_time_minutes: i64,
}
