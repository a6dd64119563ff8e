use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatusCode {
    /// Provisional (wait-list) placeholder for the patient's next visit.
    WaitList,
    Schedule,
    #[serde(rename = "CONFIRM1")]
    Confirm1,
    #[serde(rename = "CONFIRM2")]
    Confirm2,
    CheckIn,
    Ready,
    Visit,
    Complete,
    Canceled,
    Rescheduled,
    Released,
}

use AppointmentStatusCode::*;

impl AppointmentStatusCode {
    pub const ALL: [AppointmentStatusCode; 11] = [
        WaitList, Schedule, Confirm1, Confirm2, CheckIn, Ready, Visit, Complete, Canceled,
        Rescheduled, Released,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitList => "WAIT_LIST",
            Schedule => "SCHEDULE",
            Confirm1 => "CONFIRM1",
            Confirm2 => "CONFIRM2",
            CheckIn => "CHECK_IN",
            Ready => "READY",
            Visit => "VISIT",
            Complete => "COMPLETE",
            Canceled => "CANCELED",
            Rescheduled => "RESCHEDULED",
            Released => "RELEASED",
        }
    }

    pub fn name_en(&self) -> &'static str {
        match self {
            WaitList => "Wait list",
            Schedule => "Scheduled",
            Confirm1 => "Confirmation requested",
            Confirm2 => "Confirmation reminder sent",
            CheckIn => "Checked in",
            Ready => "Ready",
            Visit => "In visit",
            Complete => "Completed",
            Canceled => "Canceled",
            Rescheduled => "Rescheduled",
            Released => "Released",
        }
    }

    pub fn name_fr(&self) -> &'static str {
        match self {
            WaitList => "Liste d'attente",
            Schedule => "Planifié",
            Confirm1 => "Confirmation demandée",
            Confirm2 => "Rappel de confirmation envoyé",
            CheckIn => "Arrivé",
            Ready => "Prêt",
            Visit => "En consultation",
            Complete => "Terminé",
            Canceled => "Annulé",
            Rescheduled => "Reporté",
            Released => "Congédié",
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, WaitList)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Complete | Canceled | Rescheduled | Released)
    }

    /// Legal next statuses. Terminal statuses have none.
    pub fn allowed_transitions(&self) -> &'static [AppointmentStatusCode] {
        match self {
            WaitList => &[Schedule, Canceled, Rescheduled, Released],
            Schedule => &[
                Confirm1, Confirm2, CheckIn, Ready, Visit, Complete, Canceled, Rescheduled,
                Released,
            ],
            Confirm1 => &[
                Confirm2, CheckIn, Ready, Visit, Complete, Canceled, Rescheduled, Released,
            ],
            Confirm2 => &[CheckIn, Ready, Visit, Complete, Canceled, Rescheduled, Released],
            CheckIn => &[Ready, Visit, Complete, Canceled, Rescheduled, Released],
            Ready => &[
                Confirm1, Confirm2, CheckIn, Visit, Complete, Canceled, Rescheduled, Released,
            ],
            Visit => &[Complete, Canceled, Released],
            Complete | Canceled | Rescheduled | Released => &[],
        }
    }

    pub fn can_transition_to(&self, target: AppointmentStatusCode) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

impl fmt::Display for AppointmentStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatusCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatusCode::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown appointment status code: {}", s))
    }
}

// ==============================================================================
// CANCEL / RESCHEDULE REASONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReasonCode {
    PatientRequest,
    StaffUnavailable,
    ClinicClosure,
    NoShow,
    /// "ad-hoc appointment initiated"
    AdhocAppointment,
    ReleasePatient,
    ReschedulePatientRequest,
    RescheduleStaffRequest,
    Other,
}

impl CancelReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReasonCode::PatientRequest => "PATIENT_REQUEST",
            CancelReasonCode::StaffUnavailable => "STAFF_UNAVAILABLE",
            CancelReasonCode::ClinicClosure => "CLINIC_CLOSURE",
            CancelReasonCode::NoShow => "NO_SHOW",
            CancelReasonCode::AdhocAppointment => "ADHOC_APPOINTMENT",
            CancelReasonCode::ReleasePatient => "RELEASE_PATIENT",
            CancelReasonCode::ReschedulePatientRequest => "RESCHEDULE_PATIENT_REQUEST",
            CancelReasonCode::RescheduleStaffRequest => "RESCHEDULE_STAFF_REQUEST",
            CancelReasonCode::Other => "OTHER",
        }
    }
}

impl fmt::Display for CancelReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    Cancel,
    Reschedule,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelReason {
    pub id: i64,
    pub code: CancelReasonCode,
    pub category: ReasonCategory,
    pub name_en: String,
    pub name_fr: String,
}

// ==============================================================================
// APPOINTMENT TYPES & VISIT MODES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTypeEntry {
    pub id: i64,
    pub code: String,
    pub name_en: String,
    pub name_fr: String,
    pub default_duration_minutes: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitMode {
    InPerson,
    Virtual,
    Phone,
}

impl fmt::Display for VisitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitMode::InPerson => write!(f, "IN_PERSON"),
            VisitMode::Virtual => write!(f, "VIRTUAL"),
            VisitMode::Phone => write!(f, "PHONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientStatus {
    Active,
    Released,
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatientStatus::Active => write!(f, "ACTIVE"),
            PatientStatus::Released => write!(f, "RELEASED"),
        }
    }
}

// ==============================================================================
// TIME GROUPS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeGroup {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeGroupWindow {
    pub group: TimeGroup,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeGroupWindow {
    pub fn new(group: TimeGroup, start: NaiveTime, end: NaiveTime) -> Self {
        Self { group, start, end }
    }

    /// MORNING 08:00-11:00, AFTERNOON 11:00-15:00, EVENING 15:00-18:00.
    pub fn canonical() -> Vec<TimeGroupWindow> {
        vec![
            TimeGroupWindow::new(TimeGroup::Morning, hm(8, 0), hm(11, 0)),
            TimeGroupWindow::new(TimeGroup::Afternoon, hm(11, 0), hm(15, 0)),
            TimeGroupWindow::new(TimeGroup::Evening, hm(15, 0), hm(18, 0)),
        ]
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
