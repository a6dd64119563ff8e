use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub staff_id: Uuid,
    pub appointment_type_id: i64,
    pub start_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub end_date: DateTime<Utc>,
    pub is_occupied: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Availability {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_free(&self) -> bool {
        !self.is_occupied && !self.is_deleted()
    }

    pub fn period(&self) -> Period {
        Period {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// Half-open time range used by overlap validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn from_duration(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
        }
    }
}

/// Pair of indices into the caller's input that overlap; `first < second`
/// in sorted-by-start order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodOverlap {
    pub first: usize,
    pub second: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarEntryType {
    Availability,
    Appointment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub entry_type: CalendarEntryType,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
}
