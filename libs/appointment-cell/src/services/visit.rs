use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use lookup_cell::LookupCatalog;
use patient_cell::PatientDirectory;
use shared_database::{AppointmentQuery, AppointmentRepository, SchedulingStore, UnitOfWork};
use shared_models::appointment::Appointment;
use shared_models::auth::Identity;
use shared_models::events::EventName;
use shared_models::lookup::{AppointmentStatusCode, CancelReasonCode, PatientStatus, VisitMode};
use shared_models::SchedulingError;

use crate::models::{
    CancelPatientAppointmentsRequest, CompleteVisitRequest, ReactivatePatientRequest,
    VisitCompletion,
};
use crate::services::booking::{AppointmentBookingService, NewAppointment, PendingEvents, SlotPlan};

/// End-of-visit and return-to-care workflows built on the booking service.
pub struct VisitWorkflowService {
    store: Arc<dyn SchedulingStore>,
    catalog: Arc<dyn LookupCatalog>,
    patients: Arc<dyn PatientDirectory>,
    booking: Arc<AppointmentBookingService>,
}

impl VisitWorkflowService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        catalog: Arc<dyn LookupCatalog>,
        patients: Arc<dyn PatientDirectory>,
        booking: Arc<AppointmentBookingService>,
    ) -> Self {
        Self {
            store,
            catalog,
            patients,
            booking,
        }
    }

    /// Completes the visit's appointment, then either releases the patient
    /// or books the follow-up provisional appointment.
    #[instrument(skip(self, request), fields(appointment_id = %request.appointment.appointment_id))]
    pub async fn complete_visit(
        &self,
        identity: &Identity,
        request: CompleteVisitRequest,
    ) -> Result<VisitCompletion, SchedulingError> {
        let now = Utc::now();
        let visit_id = request.appointment.visit_id;

        let mut tx = self.store.begin().await?;
        let (completed, mut events) = self
            .booking
            .complete_appointment_in(tx.as_mut(), identity, request.appointment, now)
            .await?;

        let mut released = Vec::new();
        let mut next_provisional = None;
        if request.release_patient {
            let reason = self
                .catalog
                .reason_by_code(CancelReasonCode::ReleasePatient)
                .await?;
            let (canceled, cancel_events) = self
                .booking
                .cancel_patient_appointments_in(
                    tx.as_mut(),
                    identity,
                    CancelPatientAppointmentsRequest {
                        patient_id: completed.patient_id,
                        cancel_reason_id: reason.id,
                        cancel_reason_text: request.release_reason_text,
                        keep_availability_slot: false,
                        exclude_visit_id: Some(visit_id),
                    },
                    now,
                )
                .await?;
            released = canceled;
            events.extend(cancel_events);
        } else if let Some((provisional, follow_up_events)) =
            self.book_follow_up_in(tx.as_mut(), identity, &completed, now).await?
        {
            next_provisional = Some(provisional);
            events.extend(follow_up_events);
        }

        tx.commit().await?;
        self.booking.publish_events(events).await;

        info!(
            "Visit {} completed for patient {} (released: {})",
            visit_id, completed.patient_id, request.release_patient
        );
        Ok(VisitCompletion {
            completed,
            released,
            next_provisional,
        })
    }

    /// Provisional placeholder dated at the patient's next appointment, or
    /// at the completion time when there is none. Skipped when one is
    /// already pending.
    async fn book_follow_up_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        completed: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<Option<(Appointment, PendingEvents)>, SchedulingError> {
        let live = tx
            .list_appointments(&AppointmentQuery::for_patient(identity.clinic_id, completed.patient_id).active())
            .await?;
        if live.iter().any(|appointment| appointment.is_provisional()) {
            debug!("Patient {} already has a pending provisional appointment", completed.patient_id);
            return Ok(None);
        }

        let completed_at = completed.actual_end_date.unwrap_or(now);
        let anchor = live
            .iter()
            .find(|appointment| appointment.start_date >= completed_at)
            .map_or(completed_at, |appointment| appointment.start_date);

        let draft = NewAppointment {
            patient_id: completed.patient_id,
            slot: SlotPlan::Unbound,
            staff_id: completed.staff_id,
            appointment_type_id: Some(completed.appointment_type_id),
            start_date: Some(anchor),
            duration_minutes: Some(completed.duration_minutes),
            visit_mode: completed.visit_mode,
            status: AppointmentStatusCode::WaitList,
            notes: None,
            previous_appointment_id: None,
            provisional_date: None,
            schedule_notifications: true,
        };
        let provisional = self.booking.insert_appointment_in(tx, identity, draft, now).await?;
        let provisional = self.booking.finish_in(tx, identity, &provisional, now).await?;

        let events = vec![self
            .booking
            .emitter()
            .event(EventName::AppointmentSetProvisional, identity, &provisional)];
        Ok(Some((provisional, events)))
    }

    /// Marks a released patient active again and opens a fresh wait-list
    /// appointment.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn reactivate_patient(
        &self,
        identity: &Identity,
        request: ReactivatePatientRequest,
    ) -> Result<Appointment, SchedulingError> {
        let appointment_type = self
            .catalog
            .appointment_type(request.appointment_type_id)
            .await?
            .ok_or_else(|| {
                SchedulingError::validation(
                    "appointmentTypeId",
                    format!("Unknown appointment type {}", request.appointment_type_id),
                )
            })?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let draft = NewAppointment {
            patient_id: request.patient_id,
            slot: if request.staff_id.is_some() {
                SlotPlan::Synthesize
            } else {
                SlotPlan::Unbound
            },
            staff_id: request.staff_id,
            appointment_type_id: Some(appointment_type.id),
            start_date: Some(request.start_date.unwrap_or(now)),
            duration_minutes: Some(
                request
                    .duration_minutes
                    .unwrap_or(appointment_type.default_duration_minutes),
            ),
            visit_mode: VisitMode::InPerson,
            status: AppointmentStatusCode::WaitList,
            notes: None,
            previous_appointment_id: None,
            provisional_date: None,
            schedule_notifications: true,
        };
        let appointment = self
            .booking
            .insert_appointment_in(tx.as_mut(), identity, draft, now)
            .await?;
        let appointment = self
            .booking
            .finish_in(tx.as_mut(), identity, &appointment, now)
            .await?;
        self.patients
            .set_status(identity.clinic_id, request.patient_id, PatientStatus::Active)
            .await?;
        tx.commit().await?;

        self.booking
            .publish_events(vec![self.booking.emitter().event(
                EventName::AppointmentSetProvisional,
                identity,
                &appointment,
            )])
            .await;
        Ok(appointment)
    }
}
