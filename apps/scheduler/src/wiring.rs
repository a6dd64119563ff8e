use std::sync::Arc;
use tracing::{info, warn};

use appointment_cell::{AppointmentBookingService, VisitWorkflowService};
use availability_cell::AvailabilityService;
use lookup_cell::{
    ClinicSettingsProvider, LookupCatalog, StaticClinicSettingsProvider, StaticLookupCatalog,
    SupabaseClinicSettingsProvider,
};
use notification_cell::{LoggingEventPublisher, NotificationScheduler, RedisEventPublisher};
use patient_cell::{InMemoryPatientDirectory, PatientDirectory, SupabasePatientDirectory};
use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::events::EventPublisher;

/// Every service of the scheduling core, wired against one store.
///
/// Hosts that own persistence and the request surface link this crate and
/// pass their own `SchedulingStore`. The bundled binary passes a
/// `MemoryStore`, so its state lives and dies with the process.
pub struct SchedulingServices {
    pub availability: Arc<AvailabilityService>,
    pub notifications: Arc<NotificationScheduler>,
    pub booking: Arc<AppointmentBookingService>,
    pub visits: Arc<VisitWorkflowService>,
}

pub async fn build_services(config: &AppConfig, store: Arc<dyn SchedulingStore>) -> SchedulingServices {
    let catalog: Arc<dyn LookupCatalog> = Arc::new(StaticLookupCatalog::seeded());

    let (settings, patients): (Arc<dyn ClinicSettingsProvider>, Arc<dyn PatientDirectory>) =
        if config.is_supabase_configured() {
            info!("Using Supabase for clinic settings and patient status");
            (
                Arc::new(SupabaseClinicSettingsProvider::new(config)),
                Arc::new(SupabasePatientDirectory::new(config)),
            )
        } else {
            (
                Arc::new(StaticClinicSettingsProvider::default()),
                Arc::new(InMemoryPatientDirectory::new()),
            )
        };

    let publisher = build_publisher(config).await;

    let availability = Arc::new(AvailabilityService::new(
        config,
        store.clone(),
        catalog.clone(),
        settings.clone(),
    ));
    let notifications = Arc::new(NotificationScheduler::new(
        config,
        store.clone(),
        settings,
        publisher.clone(),
    ));
    let booking = Arc::new(AppointmentBookingService::new(
        config,
        store.clone(),
        catalog.clone(),
        availability.clone(),
        notifications.clone(),
        patients.clone(),
        publisher,
    ));
    let visits = Arc::new(VisitWorkflowService::new(store, catalog, patients, booking.clone()));

    SchedulingServices {
        availability,
        notifications,
        booking,
        visits,
    }
}

/// Redis when configured and reachable, the log otherwise.
async fn build_publisher(config: &AppConfig) -> Arc<dyn EventPublisher> {
    if !config.is_redis_configured() {
        return Arc::new(LoggingEventPublisher);
    }

    match RedisEventPublisher::new(config).await {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            warn!("Redis event publisher unavailable, falling back to logging: {}", e);
            Arc::new(LoggingEventPublisher)
        }
    }
}
