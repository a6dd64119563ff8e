#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use appointment_cell::*;
use availability_cell::{AvailabilityService, CreateAvailabilityRequest};
use lookup_cell::{StaticClinicSettingsProvider, StaticLookupCatalog};
use notification_cell::{InMemoryEventPublisher, NotificationScheduler};
use patient_cell::InMemoryPatientDirectory;
use shared_database::{
    AvailabilityRepository, DeletedFilter, JobQuery, MemoryStore, NotificationJobRepository,
    SchedulingStore,
};
use shared_models::availability::Availability;
use shared_models::lookup::VisitMode;
use shared_models::notification::NotificationJob;
use shared_utils::test_utils::{TestClinic, TestConfig};

pub const CONSULT: i64 = 1;
pub const FOLLOW_UP: i64 = 2;

pub const PATIENT_REQUEST: i64 = 1;
pub const ADHOC_REASON: i64 = 5;
pub const RELEASE_PATIENT: i64 = 6;
pub const RESCHEDULE_PATIENT_REQUEST: i64 = 7;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<InMemoryEventPublisher>,
    pub patients: Arc<InMemoryPatientDirectory>,
    pub availability: Arc<AvailabilityService>,
    pub booking: Arc<AppointmentBookingService>,
    pub visits: VisitWorkflowService,
    pub clinic: TestClinic,
}

pub fn harness() -> Harness {
    let config = TestConfig::default().to_app_config();
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(StaticLookupCatalog::seeded());
    let settings = Arc::new(StaticClinicSettingsProvider::default());
    let publisher = Arc::new(InMemoryEventPublisher::new());
    let patients = Arc::new(InMemoryPatientDirectory::new());

    let availability = Arc::new(AvailabilityService::new(
        &config,
        store.clone(),
        catalog.clone(),
        settings.clone(),
    ));
    let notifications = Arc::new(NotificationScheduler::new(
        &config,
        store.clone(),
        settings,
        publisher.clone(),
    ));
    let booking = Arc::new(AppointmentBookingService::new(
        &config,
        store.clone(),
        catalog.clone(),
        availability.clone(),
        notifications,
        patients.clone(),
        publisher.clone(),
    ));
    let visits = VisitWorkflowService::new(store.clone(), catalog, patients.clone(), booking.clone());

    Harness {
        store,
        publisher,
        patients,
        availability,
        booking,
        visits,
        clinic: TestClinic::default(),
    }
}

impl Harness {
    pub async fn slot(&self, start: DateTime<Utc>) -> Availability {
        self.availability
            .create_single_availability(
                &self.clinic.identity(),
                CreateAvailabilityRequest {
                    staff_id: Uuid::new_v4(),
                    appointment_type_id: CONSULT,
                    start_date: start,
                    duration_minutes: 30,
                },
            )
            .await
            .unwrap()
    }

    pub async fn stored_slot(&self, id: Uuid) -> Availability {
        let mut tx = self.store.begin().await.unwrap();
        tx.find_availability(id, DeletedFilter::IncludeDeleted)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn jobs(&self, appointment_id: Uuid) -> Vec<NotificationJob> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_jobs(&JobQuery::for_appointment(appointment_id))
            .await
            .unwrap()
    }
}

/// Slot-less request with every period field filled in.
pub fn direct_request(patient_id: Uuid, start: DateTime<Utc>) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id,
        availability_id: None,
        staff_id: Some(Uuid::new_v4()),
        appointment_type_id: Some(CONSULT),
        start_date: Some(start),
        duration_minutes: Some(30),
        visit_mode: VisitMode::InPerson,
        status: None,
        notes: None,
    }
}

pub fn cancel_request(appointment_id: Uuid, reason_id: i64, keep_slot: bool) -> CancelAppointmentRequest {
    CancelAppointmentRequest {
        appointment_id,
        cancel_reason_id: reason_id,
        cancel_reason_text: Some("patient called".to_string()),
        keep_availability_slot: keep_slot,
    }
}

pub fn reschedule_request(appointment_id: Uuid) -> RescheduleAppointmentRequest {
    RescheduleAppointmentRequest {
        appointment_id,
        reason_id: RESCHEDULE_PATIENT_REQUEST,
        reason_text: None,
        keep_availability_slot: false,
        availability_id: None,
        staff_id: None,
        start_date: None,
        duration_minutes: None,
        appointment_type_id: None,
        visit_mode: None,
    }
}
