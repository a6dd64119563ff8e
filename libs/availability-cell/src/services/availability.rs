use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use lookup_cell::{ClinicSettingsProvider, LookupCatalog};
use shared_config::AppConfig;
use shared_database::{
    AvailabilityQuery, AvailabilityRepository, DeletedFilter, SchedulingStore, UnitOfWork,
};
use shared_models::auth::Identity;
use shared_models::availability::{
    Availability, CalendarEntry, CalendarEntryType, Period,
};
use shared_models::SchedulingError;

use crate::models::{
    BulkAvailabilityAction, BulkAvailabilityResult, CreateAvailabilityRequest, SlotSpec,
    SuggestionRequest, UpdateAvailabilityRequest,
};
use crate::services::overlap::find_overlapped_periods;
use crate::services::suggestion::rank_suggestions;

/// Owns availability rows: creation, bulk edits, suggestions and the
/// occupancy flag toggled by the appointment lifecycle.
pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    catalog: Arc<dyn LookupCatalog>,
    settings: Arc<dyn ClinicSettingsProvider>,
    proximity_days: i64,
}

impl AvailabilityService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SchedulingStore>,
        catalog: Arc<dyn LookupCatalog>,
        settings: Arc<dyn ClinicSettingsProvider>,
    ) -> Self {
        Self {
            store,
            catalog,
            settings,
            proximity_days: config.suggestion_proximity_days,
        }
    }

    pub async fn create_single_availability(
        &self,
        identity: &Identity,
        request: CreateAvailabilityRequest,
    ) -> Result<Availability, SchedulingError> {
        let mut created = self.bulk_create(identity, vec![request]).await?;
        created
            .pop()
            .ok_or_else(|| SchedulingError::conflict("Availability was not created"))
    }

    pub async fn bulk_create(
        &self,
        identity: &Identity,
        requests: Vec<CreateAvailabilityRequest>,
    ) -> Result<Vec<Availability>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let created = self.bulk_create_in(tx.as_mut(), identity, requests).await?;
        tx.commit().await?;

        info!("Created {} availability slots for clinic {}", created.len(), identity.clinic_id);
        Ok(created)
    }

    /// Inserts free slots inside the caller's unit of work. The whole batch
    /// is validated before anything is written.
    pub async fn bulk_create_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        requests: Vec<CreateAvailabilityRequest>,
    ) -> Result<Vec<Availability>, SchedulingError> {
        let now = Utc::now();
        let rows: Vec<Availability> = requests
            .iter()
            .map(|request| new_free_slot(request, identity, now))
            .collect();

        self.validate_batch(&rows).await?;

        Ok(tx.upsert_availabilities(rows).await?)
    }

    #[instrument(skip(self, identity, action), fields(clinic_id = %identity.clinic_id))]
    pub async fn bulk_action(
        &self,
        identity: &Identity,
        action: BulkAvailabilityAction,
    ) -> Result<BulkAvailabilityResult, SchedulingError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut batch: Vec<Availability> = Vec::with_capacity(action.create.len() + action.update.len());
        for request in &action.create {
            batch.push(new_free_slot(request, identity, now));
        }
        for request in &action.update {
            let existing = self.find_in_clinic(tx.as_mut(), identity, request.id).await?;
            batch.push(apply_update(existing, request, identity, now));
        }

        self.validate_batch(&batch).await?;

        for id in &action.remove {
            let existing = self.find_in_clinic(tx.as_mut(), identity, *id).await?;
            if existing.is_occupied {
                return Err(SchedulingError::conflict(format!(
                    "Availability {} is bound to an appointment and cannot be removed",
                    id
                )));
            }
        }

        let created_count = action.create.len();
        let mut written = tx.upsert_availabilities(batch).await?;
        let updated = written.split_off(created_count);
        let removed = tx
            .soft_delete_availabilities(&action.remove, identity.user_id, now)
            .await?;

        tx.commit().await?;

        info!(
            "Bulk availability action: {} created, {} updated, {} removed",
            written.len(),
            updated.len(),
            removed
        );

        Ok(BulkAvailabilityResult {
            created: written,
            updated,
            removed,
        })
    }

    pub async fn find_one(&self, identity: &Identity, id: Uuid) -> Result<Availability, SchedulingError> {
        let mut tx = self.store.begin().await?;
        self.find_in_clinic(tx.as_mut(), identity, id).await
    }

    /// Up to nine free future slots near `reference_date`, best first.
    #[instrument(skip(self, identity, request), fields(patient_id = %request.patient_id))]
    pub async fn get_availability_suggestions(
        &self,
        identity: &Identity,
        request: SuggestionRequest,
    ) -> Result<Vec<Availability>, SchedulingError> {
        if self.catalog.appointment_type(request.appointment_type_id).await?.is_none() {
            return Err(SchedulingError::UnknownAppointmentType(request.appointment_type_id));
        }

        let settings = self.settings.settings_for(identity.clinic_id).await?;
        let window = settings.time_group(request.time_group).copied();
        if window.is_none() {
            warn!("Clinic {} has no {:?} time group configured", identity.clinic_id, request.time_group);
        }

        let proximity = Duration::days(self.proximity_days);
        let query = AvailabilityQuery {
            clinic_id: Some(identity.clinic_id),
            staff_ids: request.staff_ids.clone(),
            appointment_type_id: Some(request.appointment_type_id),
            start_from: Some(request.reference_date - proximity),
            start_to: Some(request.reference_date + proximity),
            occupied: Some(false),
            deleted: DeletedFilter::ExcludeDeleted,
            ..Default::default()
        };

        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        let candidates: Vec<Availability> = tx
            .list_availabilities(&query)
            .await?
            .into_iter()
            .filter(|slot| slot.start_date > now)
            .collect();
        drop(tx);

        debug!("Ranking {} candidate slots", candidates.len());
        Ok(rank_suggestions(candidates, request.reference_date, window.as_ref()))
    }

    pub fn to_calendar_entry(availability: &Availability) -> CalendarEntry {
        CalendarEntry {
            id: availability.id,
            staff_id: availability.staff_id,
            start_date: availability.start_date,
            end_date: availability.end_date,
            duration_minutes: availability.duration_minutes,
            entry_type: CalendarEntryType::Availability,
            created_at: availability.created_at,
            created_by: availability.created_by,
            updated_at: availability.updated_at,
            updated_by: availability.updated_by,
        }
    }

    /// Marks a free slot as held. Fails if the slot is missing or taken.
    pub async fn bind_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        id: Uuid,
    ) -> Result<Availability, SchedulingError> {
        let mut slot = self.find_in_clinic(tx, identity, id).await?;
        if slot.is_occupied {
            return Err(SchedulingError::conflict(format!("Availability {} is already occupied", id)));
        }

        slot.is_occupied = true;
        slot.updated_at = Utc::now();
        slot.updated_by = identity.user_id;
        debug!("Binding availability {}", id);
        Ok(tx.update_availability(slot).await?)
    }

    /// Frees a slot. Soft-deleted slots are freed too; a missing row is
    /// logged and ignored.
    pub async fn release_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        id: Uuid,
    ) -> Result<Option<Availability>, SchedulingError> {
        let Some(mut slot) = tx.find_availability(id, DeletedFilter::IncludeDeleted).await? else {
            warn!("Availability {} not found while releasing", id);
            return Ok(None);
        };

        if !slot.is_occupied {
            return Ok(Some(slot));
        }

        slot.is_occupied = false;
        slot.updated_at = Utc::now();
        slot.updated_by = identity.user_id;
        debug!("Releasing availability {}", id);
        Ok(Some(tx.update_availability(slot).await?))
    }

    /// Creates an already-occupied slot for an appointment booked without one.
    pub async fn synthesize_in(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        slot: SlotSpec,
    ) -> Result<Availability, SchedulingError> {
        if slot.duration_minutes < 0 {
            return Err(SchedulingError::validation("durationMinutes", "Duration cannot be negative"));
        }

        let now = Utc::now();
        let slot = Availability {
            id: Uuid::new_v4(),
            clinic_id: identity.clinic_id,
            staff_id: slot.staff_id,
            appointment_type_id: slot.appointment_type_id,
            start_date: slot.start_date,
            duration_minutes: slot.duration_minutes,
            end_date: slot.start_date + Duration::minutes(slot.duration_minutes as i64),
            is_occupied: true,
            created_at: now,
            created_by: identity.user_id,
            updated_at: now,
            updated_by: identity.user_id,
            deleted_at: None,
            deleted_by: None,
        };

        let mut written = tx.upsert_availabilities(vec![slot]).await?;
        written
            .pop()
            .ok_or_else(|| SchedulingError::conflict("Availability was not created"))
    }

    async fn find_in_clinic(
        &self,
        tx: &mut dyn UnitOfWork,
        identity: &Identity,
        id: Uuid,
    ) -> Result<Availability, SchedulingError> {
        tx.find_availability(id, DeletedFilter::ExcludeDeleted)
            .await?
            .filter(|slot| slot.clinic_id == identity.clinic_id)
            .ok_or_else(|| SchedulingError::not_found("Availability", id))
    }

    /// Positive durations, known types, and no overlap between slots of the
    /// same staff member within the batch.
    async fn validate_batch(&self, rows: &[Availability]) -> Result<(), SchedulingError> {
        let non_positive: Vec<String> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.duration_minutes <= 0)
            .map(|(index, _)| format!("[{}].durationMinutes", index))
            .collect();
        if !non_positive.is_empty() {
            return Err(SchedulingError::Validation {
                fields: non_positive,
                message: "Availability duration must be positive".to_string(),
            });
        }

        let type_ids: HashSet<i64> = rows.iter().map(|row| row.appointment_type_id).collect();
        for type_id in type_ids {
            if self.catalog.appointment_type(type_id).await?.is_none() {
                return Err(SchedulingError::UnknownAppointmentType(type_id));
            }
        }

        // Any two periods of one batch sharing an instant are rejected,
        // whichever staff members they belong to.
        let periods: Vec<Period> = rows.iter().map(Availability::period).collect();
        let overlaps = find_overlapped_periods(&periods);

        if !overlaps.is_empty() {
            warn!("Rejecting availability batch with {} overlapping pairs", overlaps.len());
            return Err(SchedulingError::OverlappingPeriods { overlaps });
        }

        Ok(())
    }
}

fn new_free_slot(
    request: &CreateAvailabilityRequest,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Availability {
    Availability {
        id: Uuid::new_v4(),
        clinic_id: identity.clinic_id,
        staff_id: request.staff_id,
        appointment_type_id: request.appointment_type_id,
        start_date: request.start_date,
        duration_minutes: request.duration_minutes,
        end_date: request.start_date + Duration::minutes(request.duration_minutes as i64),
        is_occupied: false,
        created_at: now,
        created_by: identity.user_id,
        updated_at: now,
        updated_by: identity.user_id,
        deleted_at: None,
        deleted_by: None,
    }
}

fn apply_update(
    mut existing: Availability,
    request: &UpdateAvailabilityRequest,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Availability {
    if let Some(staff_id) = request.staff_id {
        existing.staff_id = staff_id;
    }
    if let Some(type_id) = request.appointment_type_id {
        existing.appointment_type_id = type_id;
    }
    if let Some(start) = request.start_date {
        existing.start_date = start;
    }
    if let Some(duration) = request.duration_minutes {
        existing.duration_minutes = duration;
    }
    existing.end_date = existing.start_date + Duration::minutes(existing.duration_minutes as i64);
    existing.updated_at = now;
    existing.updated_by = identity.user_id;
    existing
}
