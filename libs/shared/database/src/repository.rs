use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared_models::appointment::{
    Appointment, HistoryOrder, NewStatusHistoryEntry, StatusHistoryEntry,
};
use shared_models::availability::Availability;
use shared_models::lookup::AppointmentStatusCode;
use shared_models::notification::{NewNotificationJob, NotificationJob, NotificationKind};
use shared_models::StoreError;

/// Soft-delete visibility. Every query states it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedFilter {
    #[default]
    ExcludeDeleted,
    IncludeDeleted,
}

impl DeletedFilter {
    pub fn admits(&self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            DeletedFilter::ExcludeDeleted => deleted_at.is_none(),
            DeletedFilter::IncludeDeleted => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentQuery {
    pub clinic_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub ids: Option<Vec<Uuid>>,
    pub statuses: Option<Vec<AppointmentStatusCode>>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_before: Option<DateTime<Utc>>,
    pub visit_id: Option<Uuid>,
    pub deleted: DeletedFilter,
}

impl AppointmentQuery {
    pub fn for_patient(clinic_id: Uuid, patient_id: Uuid) -> Self {
        Self {
            clinic_id: Some(clinic_id),
            patient_id: Some(patient_id),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<Uuid>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[AppointmentStatusCode]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    /// Non-terminal statuses only.
    pub fn active(self) -> Self {
        let active: Vec<AppointmentStatusCode> = AppointmentStatusCode::ALL
            .iter()
            .copied()
            .filter(|status| !status.is_terminal())
            .collect();
        self.with_statuses(&active)
    }

    pub fn starting_between(mut self, from: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.start_from = Some(from);
        self.start_before = Some(before);
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.deleted.admits(appointment.deleted_at)
            && self.clinic_id.map_or(true, |id| appointment.clinic_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&appointment.id))
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&appointment.status))
            && self.start_from.map_or(true, |from| appointment.start_date >= from)
            && self.start_before.map_or(true, |before| appointment.start_date < before)
            && self.visit_id.map_or(true, |id| appointment.visit_id == Some(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AvailabilityQuery {
    pub clinic_id: Option<Uuid>,
    pub ids: Option<Vec<Uuid>>,
    pub staff_ids: Option<Vec<Uuid>>,
    pub appointment_type_id: Option<i64>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
    pub occupied: Option<bool>,
    pub deleted: DeletedFilter,
}

impl AvailabilityQuery {
    pub fn matches(&self, availability: &Availability) -> bool {
        self.deleted.admits(availability.deleted_at)
            && self.clinic_id.map_or(true, |id| availability.clinic_id == id)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&availability.id))
            && self
                .staff_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&availability.staff_id))
            && self
                .appointment_type_id
                .map_or(true, |id| availability.appointment_type_id == id)
            && self.start_from.map_or(true, |from| availability.start_date >= from)
            && self.start_to.map_or(true, |to| availability.start_date <= to)
            && self.occupied.map_or(true, |occupied| availability.is_occupied == occupied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub appointment_id: Option<Uuid>,
    pub kind: Option<NotificationKind>,
    /// `target_date <= due_at`
    pub due_at: Option<DateTime<Utc>>,
    pub unsent_only: bool,
    pub sent_only: bool,
}

impl JobQuery {
    pub fn due(kind: NotificationKind, now: DateTime<Utc>) -> Self {
        Self {
            kind: Some(kind),
            due_at: Some(now),
            unsent_only: true,
            ..Default::default()
        }
    }

    pub fn for_appointment(appointment_id: Uuid) -> Self {
        Self {
            appointment_id: Some(appointment_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &NotificationJob) -> bool {
        self.appointment_id.map_or(true, |id| job.appointment_id == id)
            && self.kind.map_or(true, |kind| job.kind == kind)
            && self.due_at.map_or(true, |now| job.target_date <= now)
            && (!self.unsent_only || job.sent_date.is_none())
            && (!self.sent_only || job.sent_date.is_some())
    }
}

#[async_trait]
pub trait AppointmentRepository: Send {
    async fn find_appointment(
        &mut self,
        id: Uuid,
        deleted: DeletedFilter,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Ordered by start date, then id.
    async fn list_appointments(
        &mut self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_appointment(&mut self, appointment: Appointment)
        -> Result<Appointment, StoreError>;

    async fn update_appointment(&mut self, appointment: Appointment)
        -> Result<Appointment, StoreError>;
}

#[async_trait]
pub trait AvailabilityRepository: Send {
    async fn find_availability(
        &mut self,
        id: Uuid,
        deleted: DeletedFilter,
    ) -> Result<Option<Availability>, StoreError>;

    /// Ordered by start date, then id.
    async fn list_availabilities(
        &mut self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<Availability>, StoreError>;

    /// Insert rows, replacing any existing row with the same id.
    async fn upsert_availabilities(
        &mut self,
        rows: Vec<Availability>,
    ) -> Result<Vec<Availability>, StoreError>;

    async fn update_availability(&mut self, row: Availability) -> Result<Availability, StoreError>;

    async fn soft_delete_availabilities(
        &mut self,
        ids: &[Uuid],
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait NotificationJobRepository: Send {
    async fn insert_jobs(
        &mut self,
        jobs: Vec<NewNotificationJob>,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, StoreError>;

    async fn delete_jobs_for_appointment(&mut self, appointment_id: Uuid)
        -> Result<usize, StoreError>;

    /// Ordered by id.
    async fn list_jobs(&mut self, query: &JobQuery) -> Result<Vec<NotificationJob>, StoreError>;

    /// Stamps `sent_date` on the rows among `ids` that are still unsent and
    /// returns the ids actually stamped.
    async fn mark_jobs_sent(
        &mut self,
        ids: &[i64],
        sent_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError>;
}

#[async_trait]
pub trait StatusHistoryRepository: Send {
    async fn append_status_history(
        &mut self,
        entry: NewStatusHistoryEntry,
    ) -> Result<StatusHistoryEntry, StoreError>;

    async fn list_status_history(
        &mut self,
        appointment_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<StatusHistoryEntry>, StoreError>;

    /// Status of the newest history entry, `None` before the first change.
    async fn last_recorded_status(
        &mut self,
        appointment_id: Uuid,
    ) -> Result<Option<AppointmentStatusCode>, StoreError> {
        Ok(self
            .list_status_history(appointment_id, HistoryOrder::Desc)
            .await?
            .first()
            .map(|entry| entry.status))
    }
}

/// One transaction over every scheduling table. Dropping it without
/// `commit` rolls back all writes.
#[async_trait]
pub trait UnitOfWork:
    AppointmentRepository
    + AvailabilityRepository
    + NotificationJobRepository
    + StatusHistoryRepository
    + Send
{
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}
