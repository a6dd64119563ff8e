use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::settings::ClinicSettings;
use shared_models::SchedulingError;

#[async_trait]
pub trait ClinicSettingsProvider: Send + Sync {
    /// Settings for the clinic, else the clinic-less default row, else
    /// built-in defaults.
    async fn settings_for(&self, clinic_id: Uuid) -> Result<ClinicSettings, SchedulingError>;
}

#[derive(Default)]
pub struct StaticClinicSettingsProvider {
    fallback: ClinicSettings,
    per_clinic: HashMap<Uuid, ClinicSettings>,
}

impl StaticClinicSettingsProvider {
    pub fn new(fallback: ClinicSettings) -> Self {
        Self {
            fallback,
            per_clinic: HashMap::new(),
        }
    }

    pub fn with_clinic(mut self, clinic_id: Uuid, settings: ClinicSettings) -> Self {
        self.per_clinic.insert(clinic_id, settings);
        self
    }
}

#[async_trait]
impl ClinicSettingsProvider for StaticClinicSettingsProvider {
    async fn settings_for(&self, clinic_id: Uuid) -> Result<ClinicSettings, SchedulingError> {
        Ok(self
            .per_clinic
            .get(&clinic_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

pub struct SupabaseClinicSettingsProvider {
    supabase: SupabaseClient,
}

impl SupabaseClinicSettingsProvider {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn fetch_row(&self, filter: &str) -> Result<Option<ClinicSettings>, SchedulingError> {
        let path = format!("/rest/v1/clinic_settings?{}&limit=1", filter);

        let rows: Vec<ClinicSettings> = self
            .supabase
            .select(&path)
            .await
            .map_err(|e| {
                error!("Failed to fetch clinic settings ({}): {}", filter, e);
                SchedulingError::Dependency(format!("Clinic settings unavailable: {}", e))
            })?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ClinicSettingsProvider for SupabaseClinicSettingsProvider {
    async fn settings_for(&self, clinic_id: Uuid) -> Result<ClinicSettings, SchedulingError> {
        if let Some(settings) = self.fetch_row(&format!("clinic_id=eq.{}", clinic_id)).await? {
            debug!("Using clinic settings for {}", clinic_id);
            return Ok(settings);
        }

        if let Some(settings) = self.fetch_row("clinic_id=is.null").await? {
            debug!("Using default clinic settings row for {}", clinic_id);
            return Ok(settings);
        }

        warn!("No clinic settings rows found for {}, using built-in defaults", clinic_id);
        Ok(ClinicSettings::default())
    }
}
