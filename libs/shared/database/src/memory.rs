use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use shared_models::appointment::{
    Appointment, HistoryOrder, NewStatusHistoryEntry, StatusHistoryEntry,
};
use shared_models::availability::Availability;
use shared_models::notification::{NewNotificationJob, NotificationJob};
use shared_models::StoreError;

use crate::repository::{
    AppointmentQuery, AppointmentRepository, AvailabilityQuery, AvailabilityRepository,
    DeletedFilter, JobQuery, NotificationJobRepository, SchedulingStore, StatusHistoryRepository,
    UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    availabilities: HashMap<Uuid, Availability>,
    jobs: BTreeMap<i64, NotificationJob>,
    history: BTreeMap<i64, StatusHistoryEntry>,
    next_job_id: i64,
    next_history_id: i64,
}

impl Tables {
    fn check_appointment_constraints(&self, candidate: &Appointment) -> Result<(), StoreError> {
        if candidate.is_deleted() || candidate.is_terminal() {
            return Ok(());
        }

        let live_others = self
            .appointments
            .values()
            .filter(|other| other.id != candidate.id && !other.is_deleted() && !other.is_terminal());

        for other in live_others {
            if candidate.is_provisional()
                && other.is_provisional()
                && other.clinic_id == candidate.clinic_id
                && other.patient_id == candidate.patient_id
            {
                return Err(StoreError::UniqueViolation {
                    table: "appointments",
                    key: format!("provisional({}, {})", candidate.clinic_id, candidate.patient_id),
                });
            }
            if candidate.availability_id.is_some() && other.availability_id == candidate.availability_id {
                return Err(StoreError::UniqueViolation {
                    table: "appointments",
                    key: format!("availability_id({:?})", candidate.availability_id),
                });
            }
        }

        Ok(())
    }
}

/// Single-process store. All tables sit behind one mutex, so a unit of work
/// is fully serialised against every other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    snapshot: Option<Tables>,
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
            debug!("Unit of work dropped without commit, changes rolled back");
        }
    }
}

#[async_trait]
impl AppointmentRepository for MemoryUnitOfWork {
    async fn find_appointment(
        &mut self,
        id: Uuid,
        deleted: DeletedFilter,
    ) -> Result<Option<Appointment>, StoreError> {
        Ok(self
            .guard
            .appointments
            .get(&id)
            .filter(|appointment| deleted.admits(appointment.deleted_at))
            .cloned())
    }

    async fn list_appointments(
        &mut self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut rows: Vec<Appointment> = self
            .guard
            .appointments
            .values()
            .filter(|appointment| query.matches(appointment))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn insert_appointment(&mut self, appointment: Appointment) -> Result<Appointment, StoreError> {
        if self.guard.appointments.contains_key(&appointment.id) {
            return Err(StoreError::UniqueViolation {
                table: "appointments",
                key: appointment.id.to_string(),
            });
        }
        self.guard.check_appointment_constraints(&appointment)?;
        self.guard.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(&mut self, appointment: Appointment) -> Result<Appointment, StoreError> {
        if !self.guard.appointments.contains_key(&appointment.id) {
            return Err(StoreError::MissingRow {
                table: "appointments",
                id: appointment.id.to_string(),
            });
        }
        self.guard.check_appointment_constraints(&appointment)?;
        self.guard.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }
}

#[async_trait]
impl AvailabilityRepository for MemoryUnitOfWork {
    async fn find_availability(
        &mut self,
        id: Uuid,
        deleted: DeletedFilter,
    ) -> Result<Option<Availability>, StoreError> {
        Ok(self
            .guard
            .availabilities
            .get(&id)
            .filter(|availability| deleted.admits(availability.deleted_at))
            .cloned())
    }

    async fn list_availabilities(
        &mut self,
        query: &AvailabilityQuery,
    ) -> Result<Vec<Availability>, StoreError> {
        let mut rows: Vec<Availability> = self
            .guard
            .availabilities
            .values()
            .filter(|availability| query.matches(availability))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn upsert_availabilities(
        &mut self,
        rows: Vec<Availability>,
    ) -> Result<Vec<Availability>, StoreError> {
        for row in &rows {
            self.guard.availabilities.insert(row.id, row.clone());
        }
        Ok(rows)
    }

    async fn update_availability(&mut self, row: Availability) -> Result<Availability, StoreError> {
        if !self.guard.availabilities.contains_key(&row.id) {
            return Err(StoreError::MissingRow {
                table: "availabilities",
                id: row.id.to_string(),
            });
        }
        self.guard.availabilities.insert(row.id, row.clone());
        Ok(row)
    }

    async fn soft_delete_availabilities(
        &mut self,
        ids: &[Uuid],
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for id in ids {
            if let Some(row) = self.guard.availabilities.get_mut(id) {
                if row.deleted_at.is_none() {
                    row.deleted_at = Some(deleted_at);
                    row.deleted_by = Some(deleted_by);
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl NotificationJobRepository for MemoryUnitOfWork {
    async fn insert_jobs(
        &mut self,
        jobs: Vec<NewNotificationJob>,
        created_at: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, StoreError> {
        let mut inserted = Vec::with_capacity(jobs.len());
        for job in jobs {
            let duplicate = self.guard.jobs.values().any(|existing| {
                existing.appointment_id == job.appointment_id
                    && existing.kind == job.kind
                    && existing.sent_date.is_none()
            });
            if duplicate {
                return Err(StoreError::UniqueViolation {
                    table: "notification_jobs",
                    key: format!("({}, {})", job.appointment_id, job.kind),
                });
            }

            self.guard.next_job_id += 1;
            let row = NotificationJob {
                id: self.guard.next_job_id,
                clinic_id: job.clinic_id,
                appointment_id: job.appointment_id,
                kind: job.kind,
                target_date: job.target_date,
                sent_date: None,
                meta_data: job.meta_data,
                created_at,
            };
            self.guard.jobs.insert(row.id, row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn delete_jobs_for_appointment(&mut self, appointment_id: Uuid) -> Result<usize, StoreError> {
        let before = self.guard.jobs.len();
        self.guard.jobs.retain(|_, job| job.appointment_id != appointment_id);
        Ok(before - self.guard.jobs.len())
    }

    async fn list_jobs(&mut self, query: &JobQuery) -> Result<Vec<NotificationJob>, StoreError> {
        Ok(self
            .guard
            .jobs
            .values()
            .filter(|job| query.matches(job))
            .cloned()
            .collect())
    }

    async fn mark_jobs_sent(
        &mut self,
        ids: &[i64],
        sent_at: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut stamped = Vec::new();
        for id in ids {
            if let Some(job) = self.guard.jobs.get_mut(id) {
                if job.sent_date.is_none() {
                    job.sent_date = Some(sent_at);
                    stamped.push(*id);
                }
            }
        }
        Ok(stamped)
    }
}

#[async_trait]
impl StatusHistoryRepository for MemoryUnitOfWork {
    async fn append_status_history(
        &mut self,
        entry: NewStatusHistoryEntry,
    ) -> Result<StatusHistoryEntry, StoreError> {
        self.guard.next_history_id += 1;
        let row = StatusHistoryEntry {
            id: self.guard.next_history_id,
            appointment_id: entry.appointment_id,
            status: entry.status,
            previous_status: entry.previous_status,
            created_by: entry.created_by,
            created_at: entry.created_at,
        };
        self.guard.history.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_status_history(
        &mut self,
        appointment_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        let rows = self
            .guard
            .history
            .values()
            .filter(|entry| entry.appointment_id == appointment_id)
            .cloned();
        Ok(match order {
            HistoryOrder::Asc => rows.collect(),
            HistoryOrder::Desc => rows.rev().collect(),
        })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.snapshot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared_models::lookup::{AppointmentStatusCode, VisitMode};
    use shared_models::notification::NotificationKind;

    fn appointment(patient_id: Uuid, status: AppointmentStatusCode) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: Uuid::nil(),
            patient_id,
            staff_id: None,
            status,
            appointment_type_id: 1,
            visit_mode: VisitMode::InPerson,
            start_date: now,
            end_date: now + Duration::minutes(30),
            duration_minutes: 30,
            availability_id: None,
            previous_appointment_id: None,
            provisional_date: None,
            cancel_reschedule_reason_id: None,
            cancel_reschedule_text: None,
            upcoming_appointment: false,
            notes: None,
            canceled_at: None,
            canceled_by: None,
            actual_start_date: None,
            actual_end_date: None,
            visit_id: None,
            visit_summary_document_id: None,
            created_at: now,
            created_by: Uuid::nil(),
            updated_at: now,
            updated_by: Uuid::nil(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let row = appointment(Uuid::new_v4(), AppointmentStatusCode::Schedule);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_appointment(row.clone()).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_appointment(row.id, DeletedFilter::IncludeDeleted).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let row = appointment(Uuid::new_v4(), AppointmentStatusCode::Schedule);

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(row.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx.find_appointment(row.id, DeletedFilter::ExcludeDeleted).await.unwrap();
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn second_live_provisional_is_rejected() {
        let store = MemoryStore::new();
        let patient_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(appointment(patient_id, AppointmentStatusCode::WaitList))
            .await
            .unwrap();
        let err = tx
            .insert_appointment(appointment(patient_id, AppointmentStatusCode::WaitList))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn mark_jobs_sent_skips_already_sent_rows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let appointment_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let jobs = tx
            .insert_jobs(
                vec![NewNotificationJob {
                    clinic_id: Uuid::nil(),
                    appointment_id,
                    kind: NotificationKind::ConfirmBeforeAppt,
                    target_date: now,
                    meta_data: serde_json::json!({}),
                }],
                now,
            )
            .await
            .unwrap();
        let ids: Vec<i64> = jobs.iter().map(|job| job.id).collect();

        assert_eq!(tx.mark_jobs_sent(&ids, now).await.unwrap(), ids);
        assert!(tx.mark_jobs_sent(&ids, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_ordered_by_entry_id() {
        let store = MemoryStore::new();
        let appointment_id = Uuid::new_v4();
        let at = Utc::now();

        let mut tx = store.begin().await.unwrap();
        for (status, previous) in [
            (AppointmentStatusCode::WaitList, None),
            (AppointmentStatusCode::Schedule, Some(AppointmentStatusCode::WaitList)),
        ] {
            tx.append_status_history(NewStatusHistoryEntry {
                appointment_id,
                status,
                previous_status: previous,
                created_by: Uuid::nil(),
                created_at: at,
            })
            .await
            .unwrap();
        }

        let asc = tx.list_status_history(appointment_id, HistoryOrder::Asc).await.unwrap();
        let desc = tx.list_status_history(appointment_id, HistoryOrder::Desc).await.unwrap();
        assert_eq!(asc[0].status, AppointmentStatusCode::WaitList);
        assert_eq!(desc[0].status, AppointmentStatusCode::Schedule);
        assert!(asc[0].id < asc[1].id);
    }
}
