use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use availability_cell::{AvailabilityService, SlotSpec};
use lookup_cell::{LookupCatalog, ADHOC_APPOINTMENT_TYPE_CODE};
use notification_cell::NotificationScheduler;
use patient_cell::PatientDirectory;
use shared_config::AppConfig;
use shared_database::{
    AppointmentQuery, AppointmentRepository, DeletedFilter, SchedulingStore,
    StatusHistoryRepository, UnitOfWork,
};
use shared_models::appointment::{Appointment, HistoryOrder, StatusHistoryEntry};
use shared_models::auth::Identity;
use shared_models::events::{AppointmentEventPayload, EventName, EventPublisher};
use shared_models::lookup::{
    AppointmentStatusCode, CancelReason, CancelReasonCode, PatientStatus, VisitMode,
};
use shared_models::SchedulingError;
use shared_utils::time::day_bounds;

use crate::models::{
    AdhocAppointmentRequest, CancelAppointmentRequest, CancelPatientAppointmentsRequest,
    CompleteAppointmentRequest, CreateAppointmentRequest, RescheduleAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::events::AppointmentEventEmitter;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Events to publish once the surrounding unit of work commits.
pub type PendingEvents = Vec<AppointmentEventPayload>;

/// Where a new appointment's period is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotPlan {
    /// Bind an existing free slot and copy its details.
    Bind(Uuid),
    /// Create an occupied slot from the appointment's own details.
    Synthesize,
    /// Reuse a slot already held for the patient.
    TakeOver(Uuid),
    Unbound,
}

pub(crate) struct NewAppointment {
    pub patient_id: Uuid,
    pub slot: SlotPlan,
    pub staff_id: Option<Uuid>,
    pub appointment_type_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub visit_mode: VisitMode,
    pub status: AppointmentStatusCode,
    pub notes: Option<String>,
    pub previous_appointment_id: Option<Uuid>,
    pub provisional_date: Option<DateTime<Utc>>,
    pub schedule_notifications: bool,
}

impl NewAppointment {
    fn from_request(request: CreateAppointmentRequest) -> Self {
        Self {
            patient_id: request.patient_id,
            slot: request
                .availability_id
                .map_or(SlotPlan::Synthesize, SlotPlan::Bind),
            staff_id: request.staff_id,
            appointment_type_id: request.appointment_type_id,
            start_date: request.start_date,
            duration_minutes: request.duration_minutes,
            visit_mode: request.visit_mode,
            status: request.status.unwrap_or(AppointmentStatusCode::WaitList),
            notes: request.notes,
            previous_appointment_id: None,
            provisional_date: None,
            schedule_notifications: true,
        }
    }

    /// Start, duration and type when no slot supplies them.
    fn period(&self) -> Result<(DateTime<Utc>, i32, i64), SchedulingError> {
        let needs_staff = self.slot == SlotPlan::Synthesize && self.staff_id.is_none();
        match (self.start_date, self.duration_minutes, self.appointment_type_id) {
            (Some(start), Some(duration), Some(type_id)) if !needs_staff => Ok((start, duration, type_id)),
            _ => {
                let mut fields = Vec::new();
                if self.start_date.is_none() {
                    fields.push("startDate".to_string());
                }
                if self.duration_minutes.is_none() {
                    fields.push("durationMinutes".to_string());
                }
                if self.appointment_type_id.is_none() {
                    fields.push("appointmentTypeId".to_string());
                }
                if needs_staff {
                    fields.push("staffId".to_string());
                }
                Err(SchedulingError::Validation {
                    fields,
                    message: "Required when no availability is given".to_string(),
                })
            }
        }
    }
}

pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    catalog: Arc<dyn LookupCatalog>,
    availability: Arc<AvailabilityService>,
    notifications: Arc<NotificationScheduler>,
    patients: Arc<dyn PatientDirectory>,
    lifecycle: AppointmentLifecycleService,
    events: AppointmentEventEmitter,
}

impl AppointmentBookingService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SchedulingStore>,
        catalog: Arc<dyn LookupCatalog>,
        availability: Arc<AvailabilityService>,
        notifications: Arc<NotificationScheduler>,
        patients: Arc<dyn PatientDirectory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            lifecycle: AppointmentLifecycleService::new(catalog.clone()),
            catalog,
            availability,
            notifications,
            patients,
            events: AppointmentEventEmitter::new(config, publisher),
        }
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycleService {
        &self.lifecycle
    }

    // ==========================================================================
    // CREATE
    // ==========================================================================

    pub async fn create_appointment(
        &self,
        identity: &Identity,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let (appointment, events) = self.create_appointment_in(tx.as_mut(), identity, request).await?;
        tx.commit().await?;

        self.publish_events(events).await;
        Ok(appointment)
    }

    /// Joins the caller's unit of work. The returned events must be
    /// published by the caller after it commits.
    #[instrument(skip(self, tx, request), fields(patient_id = %request.patient_id))]
    pub async fn create_appointment_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        request: CreateAppointmentRequest,
    ) -> Result<(Appointment, PendingEvents), SchedulingError> {
        let now = Utc::now();
        let inserted = self
            .insert_appointment_in(tx, identity, NewAppointment::from_request(request), now)
            .await?;
        let appointment = self.finish_in(tx, identity, &inserted, now).await?;

        let event_name = if appointment.is_provisional() {
            EventName::AppointmentSetProvisional
        } else {
            EventName::AppointmentScheduled
        };
        let events = vec![self.events.event(event_name, identity, &appointment)];
        Ok((appointment, events))
    }

    pub(crate) async fn insert_appointment_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        draft: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        if draft.status.is_terminal() {
            return Err(SchedulingError::validation(
                "status",
                format!("An appointment cannot be created as {}", draft.status),
            ));
        }

        if draft.status.is_provisional() {
            let pending = tx
                .list_appointments(
                    &AppointmentQuery::for_patient(identity.clinic_id, draft.patient_id)
                        .with_statuses(&[AppointmentStatusCode::WaitList]),
                )
                .await?;
            if !pending.is_empty() {
                return Err(SchedulingError::validation(
                    "patientId",
                    "Patient already has a pending provisional appointment",
                ));
            }
        }

        let (availability_id, staff_id, appointment_type_id, start, duration) = match draft.slot {
            SlotPlan::Bind(id) => {
                let slot = self.availability.bind_in(tx, identity, id).await?;
                (
                    Some(slot.id),
                    Some(slot.staff_id),
                    slot.appointment_type_id,
                    slot.start_date,
                    slot.duration_minutes,
                )
            }
            plan => {
                let (start, duration, type_id) = draft.period()?;
                if duration < 0 {
                    return Err(SchedulingError::validation(
                        "durationMinutes",
                        "Duration cannot be negative",
                    ));
                }
                if self.catalog.appointment_type(type_id).await?.is_none() {
                    return Err(SchedulingError::validation(
                        "appointmentTypeId",
                        format!("Unknown appointment type {}", type_id),
                    ));
                }

                let availability_id = match plan {
                    SlotPlan::Synthesize => {
                        let staff_id = draft.staff_id.ok_or_else(|| {
                            SchedulingError::validation("staffId", "Required when no availability is given")
                        })?;
                        let slot = self
                            .availability
                            .synthesize_in(
                                tx,
                                identity,
                                SlotSpec {
                                    staff_id,
                                    appointment_type_id: type_id,
                                    start_date: start,
                                    duration_minutes: duration,
                                },
                            )
                            .await?;
                        Some(slot.id)
                    }
                    SlotPlan::TakeOver(id) => Some(id),
                    SlotPlan::Bind(_) | SlotPlan::Unbound => None,
                };
                (availability_id, draft.staff_id, type_id, start, duration)
            }
        };

        let provisional_date = if draft.status.is_provisional() {
            draft.provisional_date.or(Some(start))
        } else {
            None
        };

        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            clinic_id: identity.clinic_id,
            patient_id: draft.patient_id,
            staff_id,
            status: draft.status,
            appointment_type_id,
            visit_mode: draft.visit_mode,
            start_date: start,
            end_date: start,
            duration_minutes: duration,
            availability_id,
            previous_appointment_id: draft.previous_appointment_id,
            provisional_date,
            cancel_reschedule_reason_id: None,
            cancel_reschedule_text: None,
            upcoming_appointment: false,
            notes: draft.notes,
            canceled_at: None,
            canceled_by: None,
            actual_start_date: None,
            actual_end_date: None,
            visit_id: None,
            visit_summary_document_id: None,
            created_at: now,
            created_by: identity.user_id,
            updated_at: now,
            updated_by: identity.user_id,
            deleted_at: None,
            deleted_by: None,
        };
        appointment.set_period(start, duration);

        let appointment = tx.insert_appointment(appointment).await?;
        if draft.schedule_notifications {
            self.notifications
                .schedule_appointment_in(tx, &appointment)
                .await?;
        }

        info!(
            "Created {} appointment {} for patient {}",
            appointment.status, appointment.id, appointment.patient_id
        );
        Ok(appointment)
    }

    // ==========================================================================
    // UPDATE
    // ==========================================================================

    pub async fn update_appointment(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let current = self.load_in(tx.as_mut(), identity, appointment_id).await?;
        if current.is_terminal() {
            return Err(SchedulingError::validation(
                "status",
                format!("Appointment {} is {} and can no longer be edited", appointment_id, current.status),
            ));
        }

        let before = current.clone();
        let mut updated = current;
        if let Some(type_id) = request.appointment_type_id {
            if self.catalog.appointment_type(type_id).await?.is_none() {
                return Err(SchedulingError::validation(
                    "appointmentTypeId",
                    format!("Unknown appointment type {}", type_id),
                ));
            }
            updated.appointment_type_id = type_id;
        }
        if let Some(duration) = request.duration_minutes {
            if duration < 0 {
                return Err(SchedulingError::validation("durationMinutes", "Duration cannot be negative"));
            }
            updated.set_period(updated.start_date, duration);
        }
        if let Some(visit_mode) = request.visit_mode {
            updated.visit_mode = visit_mode;
        }
        if let Some(notes) = request.notes {
            updated.notes = Some(notes);
        }
        updated.touch(identity.user_id, now);

        let updated = tx.update_appointment(updated).await?;
        tx.commit().await?;

        debug!("Updated appointment {}", appointment_id);
        self.publish_events(vec![self
            .events
            .event(EventName::AppointmentUpdated, identity, &updated)
            .with_before_update(&before)])
            .await;
        Ok(updated)
    }

    /// Non-terminal status moves. Ending an appointment goes through
    /// cancel, reschedule or complete.
    pub async fn update_status(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        status: AppointmentStatusCode,
    ) -> Result<Appointment, SchedulingError> {
        if status.is_terminal() {
            return Err(SchedulingError::validation(
                "status",
                format!("{} is set through cancel, reschedule or complete", status),
            ));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let current = self.load_in(tx.as_mut(), identity, appointment_id).await?;
        let before = current.clone();

        let moved = self
            .lifecycle
            .transition_in(tx.as_mut(), identity, current, status, now)
            .await?;
        let moved = self.finish_in(tx.as_mut(), identity, &moved, now).await?;
        tx.commit().await?;

        let event_name = if status == AppointmentStatusCode::Schedule {
            EventName::AppointmentScheduled
        } else {
            EventName::AppointmentUpdated
        };
        self.publish_events(vec![self
            .events
            .event(event_name, identity, &moved)
            .with_before_update(&before)])
            .await;
        Ok(moved)
    }

    // ==========================================================================
    // CANCEL
    // ==========================================================================

    pub async fn cancel_appointment(
        &self,
        identity: &Identity,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let reason = self.resolve_reason(request.cancel_reason_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let current = self.load_in(tx.as_mut(), identity, request.appointment_id).await?;
        let canceled = self
            .cancel_in(
                tx.as_mut(),
                identity,
                current,
                &reason,
                request.cancel_reason_text,
                request.keep_availability_slot,
                now,
            )
            .await?;
        if reason.code == CancelReasonCode::ReleasePatient {
            self.patients
                .set_status(identity.clinic_id, canceled.patient_id, PatientStatus::Released)
                .await?;
        }
        let canceled = self.finish_in(tx.as_mut(), identity, &canceled, now).await?;
        tx.commit().await?;

        self.publish_events(vec![self
            .events
            .event(EventName::AppointmentCanceled, identity, &canceled)])
            .await;
        Ok(canceled)
    }

    pub async fn cancel_patient_appointments(
        &self,
        identity: &Identity,
        request: CancelPatientAppointmentsRequest,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let (canceled, events) = self
            .cancel_patient_appointments_in(tx.as_mut(), identity, request, Utc::now())
            .await?;
        tx.commit().await?;

        self.publish_events(events).await;
        Ok(canceled)
    }

    /// Cancels every live appointment of the patient except the one linked
    /// to `exclude_visit_id`. A release reason also releases the patient.
    #[instrument(skip(self, tx, request), fields(patient_id = %request.patient_id))]
    pub async fn cancel_patient_appointments_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        request: CancelPatientAppointmentsRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Appointment>, PendingEvents), SchedulingError> {
        let reason = self.resolve_reason(request.cancel_reason_id).await?;
        let targets = tx
            .list_appointments(&AppointmentQuery::for_patient(identity.clinic_id, request.patient_id).active())
            .await?;

        let mut canceled_ids = Vec::new();
        for appointment in targets {
            if request.exclude_visit_id.is_some() && appointment.visit_id == request.exclude_visit_id {
                debug!("Keeping appointment {} linked to the current visit", appointment.id);
                continue;
            }
            let canceled = self
                .cancel_in(
                    tx,
                    identity,
                    appointment,
                    &reason,
                    request.cancel_reason_text.clone(),
                    request.keep_availability_slot,
                    now,
                )
                .await?;
            canceled_ids.push(canceled.id);
        }

        if reason.code == CancelReasonCode::ReleasePatient {
            self.patients
                .set_status(identity.clinic_id, request.patient_id, PatientStatus::Released)
                .await?;
        }
        self.lifecycle
            .refresh_upcoming_in(tx, identity.clinic_id, request.patient_id, now)
            .await?;

        let mut canceled = Vec::with_capacity(canceled_ids.len());
        for id in canceled_ids {
            canceled.push(self.reload_in(tx, id).await?);
        }
        let events = canceled
            .iter()
            .map(|appointment| self.events.event(EventName::AppointmentCanceled, identity, appointment))
            .collect();

        info!("Canceled {} appointments of patient {}", canceled.len(), request.patient_id);
        Ok((canceled, events))
    }

    async fn cancel_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        mut appointment: Appointment,
        reason: &CancelReason,
        reason_text: Option<String>,
        keep_availability_slot: bool,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let target = if reason.code == CancelReasonCode::ReleasePatient {
            AppointmentStatusCode::Released
        } else {
            AppointmentStatusCode::Canceled
        };
        self.lifecycle.validate_status_transition(appointment.status, target)?;

        appointment.cancel_reschedule_reason_id = Some(reason.id);
        appointment.cancel_reschedule_text = reason_text;
        appointment.canceled_at = Some(now);
        appointment.canceled_by = Some(identity.user_id);

        if !keep_availability_slot {
            if let Some(slot_id) = appointment.availability_id {
                self.availability.release_in(tx, identity, slot_id).await?;
            }
        }
        self.notifications.delete_cron_job(tx, appointment.id).await?;

        self.lifecycle
            .transition_in(tx, identity, appointment, target, now)
            .await
    }

    // ==========================================================================
    // RESCHEDULE
    // ==========================================================================

    /// Ends the predecessor as RESCHEDULED and books its successor in the
    /// same unit of work.
    #[instrument(skip(self, request), fields(appointment_id = %request.appointment_id))]
    pub async fn reschedule_appointment(
        &self,
        identity: &Identity,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let reason = self.resolve_reason(request.reason_id).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let mut predecessor = self.load_in(tx.as_mut(), identity, request.appointment_id).await?;
        self.lifecycle
            .validate_status_transition(predecessor.status, AppointmentStatusCode::Rescheduled)?;

        let was_provisional = predecessor.is_provisional();
        let kept_slot = if request.keep_availability_slot {
            predecessor.availability_id
        } else {
            None
        };

        predecessor.cancel_reschedule_reason_id = Some(reason.id);
        predecessor.cancel_reschedule_text = request.reason_text.clone();
        if !request.keep_availability_slot {
            if let Some(slot_id) = predecessor.availability_id {
                self.availability.release_in(tx.as_mut(), identity, slot_id).await?;
            }
        }
        self.notifications
            .delete_cron_job(tx.as_mut(), predecessor.id)
            .await?;
        let predecessor = self
            .lifecycle
            .transition_in(tx.as_mut(), identity, predecessor, AppointmentStatusCode::Rescheduled, now)
            .await?;

        let moves = request.availability_id.is_some() || request.staff_id.is_some() || request.start_date.is_some();
        let slot = match request.availability_id {
            Some(id) => SlotPlan::Bind(id),
            None if moves => SlotPlan::Synthesize,
            None => kept_slot.map_or(SlotPlan::Unbound, SlotPlan::TakeOver),
        };
        let status = if was_provisional {
            AppointmentStatusCode::WaitList
        } else {
            AppointmentStatusCode::Schedule
        };

        let draft = NewAppointment {
            patient_id: predecessor.patient_id,
            slot,
            staff_id: request.staff_id.or(predecessor.staff_id),
            appointment_type_id: Some(request.appointment_type_id.unwrap_or(predecessor.appointment_type_id)),
            start_date: Some(request.start_date.unwrap_or(predecessor.start_date)),
            duration_minutes: Some(request.duration_minutes.unwrap_or(predecessor.duration_minutes)),
            visit_mode: request.visit_mode.unwrap_or(predecessor.visit_mode),
            status,
            notes: predecessor.notes.clone(),
            previous_appointment_id: Some(predecessor.id),
            provisional_date: predecessor.provisional_date,
            schedule_notifications: true,
        };
        let successor = self.insert_appointment_in(tx.as_mut(), identity, draft, now).await?;
        let successor = self.finish_in(tx.as_mut(), identity, &successor, now).await?;
        let predecessor = self.reload_in(tx.as_mut(), predecessor.id).await?;
        tx.commit().await?;

        info!("Rescheduled appointment {} to {}", predecessor.id, successor.id);
        self.publish_events(vec![self
            .events
            .event(EventName::AppointmentRescheduled, identity, &successor)
            .with_previous(&predecessor)])
            .await;
        Ok(successor)
    }

    // ==========================================================================
    // COMPLETE / ADHOC
    // ==========================================================================

    pub async fn complete_appointment(
        &self,
        identity: &Identity,
        request: CompleteAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let (completed, events) = self
            .complete_appointment_in(tx.as_mut(), identity, request, Utc::now())
            .await?;
        tx.commit().await?;

        self.publish_events(events).await;
        Ok(completed)
    }

    /// Records the visit outcome. Whether the patient is released or
    /// continues care is decided by the caller.
    pub async fn complete_appointment_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        request: CompleteAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<(Appointment, PendingEvents), SchedulingError> {
        let mut appointment = self.load_in(tx, identity, request.appointment_id).await?;
        let before = appointment.clone();

        appointment.visit_id = Some(request.visit_id);
        appointment.visit_summary_document_id = request.visit_summary_document_id;
        appointment.actual_start_date = request
            .actual_start_date
            .or(appointment.actual_start_date)
            .or(Some(appointment.start_date));
        appointment.actual_end_date = Some(request.actual_end_date.unwrap_or(now));

        let completed = self
            .lifecycle
            .transition_in(tx, identity, appointment, AppointmentStatusCode::Complete, now)
            .await?;
        let completed = self.finish_in(tx, identity, &completed, now).await?;

        let events = vec![self
            .events
            .event(EventName::AppointmentUpdated, identity, &completed)
            .with_before_update(&before)];
        Ok((completed, events))
    }

    /// Immediate walk-in visit. Same-day appointments of the patient are
    /// canceled first.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn adhoc_appointment(
        &self,
        identity: &Identity,
        request: AdhocAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        let reason = self
            .catalog
            .reason_by_code(CancelReasonCode::AdhocAppointment)
            .await?;
        let type_id = self.catalog.type_id_by_code(ADHOC_APPOINTMENT_TYPE_CODE).await?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let (day_start, day_end) = day_bounds(request.date);
        let same_day = tx
            .list_appointments(
                &AppointmentQuery::for_patient(identity.clinic_id, request.patient_id)
                    .active()
                    .starting_between(day_start, day_end),
            )
            .await?;
        if same_day.is_empty() {
            debug!("No same-day appointments to cancel for patient {}", request.patient_id);
        }

        let mut events = Vec::new();
        for appointment in same_day {
            let canceled = self
                .cancel_in(
                    tx.as_mut(),
                    identity,
                    appointment,
                    &reason,
                    Some(reason.name_en.clone()),
                    false,
                    now,
                )
                .await?;
            events.push(self.events.event(EventName::AppointmentCanceled, identity, &canceled));
        }

        let draft = NewAppointment {
            patient_id: request.patient_id,
            slot: SlotPlan::Unbound,
            staff_id: request.staff_id,
            appointment_type_id: Some(type_id),
            start_date: Some(request.date),
            duration_minutes: Some(0),
            visit_mode: request.visit_mode,
            status: AppointmentStatusCode::CheckIn,
            notes: None,
            previous_appointment_id: None,
            provisional_date: None,
            schedule_notifications: false,
        };
        let adhoc = self.insert_appointment_in(tx.as_mut(), identity, draft, now).await?;
        let adhoc = self.finish_in(tx.as_mut(), identity, &adhoc, now).await?;
        tx.commit().await?;

        events.push(self.events.event(EventName::AppointmentScheduled, identity, &adhoc));
        self.publish_events(events).await;
        Ok(adhoc)
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn find_appointment(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let mut tx = self.store.begin().await?;
        self.load_in(tx.as_mut(), identity, appointment_id).await
    }

    /// Ordered by start date.
    pub async fn patient_appointments(
        &self,
        identity: &Identity,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_appointments(&AppointmentQuery::for_patient(identity.clinic_id, patient_id))
            .await?)
    }

    pub async fn status_history(
        &self,
        identity: &Identity,
        appointment_id: Uuid,
        order: HistoryOrder,
    ) -> Result<Vec<StatusHistoryEntry>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        self.load_in(tx.as_mut(), identity, appointment_id).await?;
        Ok(tx.list_status_history(appointment_id, order).await?)
    }

    pub async fn upcoming_appointment(
        &self,
        identity: &Identity,
        patient_id: Uuid,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_appointments(&AppointmentQuery::for_patient(identity.clinic_id, patient_id).active())
            .await?
            .into_iter()
            .find(|appointment| appointment.upcoming_appointment))
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    pub async fn publish_events(&self, events: PendingEvents) -> usize {
        self.events.publish_all(events).await
    }

    pub(crate) fn emitter(&self) -> &AppointmentEventEmitter {
        &self.events
    }

    /// Recomputes the patient's upcoming flag and re-reads `appointment`.
    pub(crate) async fn finish_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        self.lifecycle
            .refresh_upcoming_in(tx, identity.clinic_id, appointment.patient_id, now)
            .await?;
        self.reload_in(tx, appointment.id).await
    }

    async fn load_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        appointment_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        tx.find_appointment(appointment_id, DeletedFilter::ExcludeDeleted)
            .await?
            .filter(|appointment| appointment.clinic_id == identity.clinic_id)
            .ok_or_else(|| SchedulingError::not_found("Appointment", appointment_id))
    }

    async fn reload_in(&self, tx: &mut dyn UnitOfWork, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        tx.find_appointment(appointment_id, DeletedFilter::IncludeDeleted)
            .await?
            .ok_or_else(|| SchedulingError::not_found("Appointment", appointment_id))
    }

    async fn resolve_reason(&self, reason_id: i64) -> Result<CancelReason, SchedulingError> {
        self.catalog
            .reason(reason_id)
            .await?
            .ok_or(SchedulingError::UnknownReason(reason_id))
    }
}
