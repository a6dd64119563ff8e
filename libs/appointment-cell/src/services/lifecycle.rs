use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lookup_cell::LookupCatalog;
use shared_database::{AppointmentQuery, AppointmentRepository, StatusHistoryRepository, UnitOfWork};
use shared_models::appointment::{Appointment, NewStatusHistoryEntry};
use shared_models::auth::Identity;
use shared_models::lookup::AppointmentStatusCode;
use shared_models::SchedulingError;

/// Status transitions, history entries and the patient's upcoming flag.
pub struct AppointmentLifecycleService {
    catalog: Arc<dyn LookupCatalog>,
}

impl AppointmentLifecycleService {
    pub fn new(catalog: Arc<dyn LookupCatalog>) -> Self {
        Self { catalog }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatusCode,
        new_status: AppointmentStatusCode,
    ) -> Result<(), SchedulingError> {
        if !self.catalog.is_valid_transition(current_status, new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(SchedulingError::IllegalTransition {
                from: current_status,
                to: new_status,
            });
        }

        debug!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatusCode) -> Vec<AppointmentStatusCode> {
        self.catalog.valid_transitions(current_status)
    }

    /// Moves `appointment` to `target`, writes it and appends the history
    /// entry. Other field changes made by the caller are written too.
    ///
    /// History records changes only: `previous_status` is the status of the
    /// last recorded change, `None` for the first one.
    pub async fn transition_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        mut appointment: Appointment,
        target: AppointmentStatusCode,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let previous = appointment.status;
        self.validate_status_transition(previous, target)?;

        let recorded = tx.last_recorded_status(appointment.id).await?;
        appointment.status = target;
        appointment.touch(identity.user_id, now);
        let updated = tx.update_appointment(appointment).await?;

        tx.append_status_history(NewStatusHistoryEntry {
            appointment_id: updated.id,
            status: target,
            previous_status: recorded,
            created_by: identity.user_id,
            created_at: now,
        })
        .await?;

        info!("Appointment {} moved {} -> {}", updated.id, previous, target);
        Ok(updated)
    }

    /// Flags the patient's next appointment: the earliest live non-provisional
    /// one starting at or after `now`, else the pending provisional one.
    pub async fn refresh_upcoming_in(
        &self,
        tx: &mut dyn UnitOfWork,
        clinic_id: Uuid,
        patient_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, SchedulingError> {
        let live = tx
            .list_appointments(&AppointmentQuery::for_patient(clinic_id, patient_id).active())
            .await?;

        let upcoming = live
            .iter()
            .find(|appointment| !appointment.is_provisional() && appointment.start_date >= now)
            .or_else(|| live.iter().find(|appointment| appointment.is_provisional()))
            .map(|appointment| appointment.id);

        let mut changed = Vec::new();
        for appointment in &live {
            let flagged = Some(appointment.id) == upcoming;
            if appointment.upcoming_appointment != flagged {
                let mut appointment = appointment.clone();
                appointment.upcoming_appointment = flagged;
                changed.push(appointment);
            }
        }

        // Terminal rows never keep the flag.
        let stale = tx
            .list_appointments(&AppointmentQuery::for_patient(clinic_id, patient_id))
            .await?
            .into_iter()
            .filter(|appointment| appointment.is_terminal() && appointment.upcoming_appointment);
        for mut appointment in stale {
            appointment.upcoming_appointment = false;
            changed.push(appointment);
        }

        for appointment in changed {
            tx.update_appointment(appointment).await?;
        }

        Ok(upcoming)
    }
}
