use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lookup::{TimeGroup, TimeGroupWindow};
use crate::notification::NotificationKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicSettings {
    #[serde(default)]
    pub clinic_id: Option<Uuid>,
    pub checkin_before_appt_minutes: i64,
    pub sec_not_confirmed_before_appt_hours: i64,
    pub confirm_before_appt_hours: i64,
    pub remind_before_appt_hours: i64,
    #[serde(default)]
    pub appointment_request_enabled: bool,
    #[serde(default = "TimeGroupWindow::canonical")]
    pub time_groups: Vec<TimeGroupWindow>,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            clinic_id: None,
            checkin_before_appt_minutes: 30,
            sec_not_confirmed_before_appt_hours: 24,
            confirm_before_appt_hours: 72,
            remind_before_appt_hours: 48,
            appointment_request_enabled: false,
            time_groups: TimeGroupWindow::canonical(),
        }
    }
}

impl ClinicSettings {
    pub fn lead_time_minutes(&self, kind: NotificationKind) -> i64 {
        match kind {
            NotificationKind::CheckinBeforeAppt => self.checkin_before_appt_minutes,
            NotificationKind::SecNotConfirmedBeforeAppt => self.sec_not_confirmed_before_appt_hours * 60,
            NotificationKind::ConfirmBeforeAppt => self.confirm_before_appt_hours * 60,
            NotificationKind::RemindBeforeAppt => self.remind_before_appt_hours * 60,
        }
    }

    pub fn time_group(&self, group: TimeGroup) -> Option<&TimeGroupWindow> {
        self.time_groups.iter().find(|window| window.group == group)
    }
}
