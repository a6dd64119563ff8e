use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use lookup_cell::ClinicSettingsProvider;
use shared_config::AppConfig;
use shared_database::{
    AppointmentQuery, AppointmentRepository, DeletedFilter, JobQuery, NotificationJobRepository,
    SchedulingStore, StatusHistoryRepository, UnitOfWork,
};
use shared_models::appointment::{Appointment, NewStatusHistoryEntry};
use shared_models::events::{EventPublisher, NotificationEventPayload, NotifiedAppointment};
use shared_models::lookup::AppointmentStatusCode;
use shared_models::notification::{
    NewNotificationJob, NotificationDate, NotificationJob, NotificationKind,
};
use shared_models::settings::ClinicSettings;
use shared_models::SchedulingError;

use crate::models::{Cadence, KindOutcome, KindReport, NextActionHint, TickReport};
use crate::services::publisher::publish_logged;

type DueJob = (NotificationJob, Appointment);

/// Materialises the four notification jobs of an appointment and fires
/// them when they come due.
pub struct NotificationScheduler {
    store: Arc<dyn SchedulingStore>,
    settings: Arc<dyn ClinicSettingsProvider>,
    publisher: Arc<dyn EventPublisher>,
    source: String,
    claim_before_send: bool,
}

impl NotificationScheduler {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SchedulingStore>,
        settings: Arc<dyn ClinicSettingsProvider>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            settings,
            publisher,
            source: config.event_source.clone(),
            claim_before_send: config.notification_claim_before_send,
        }
    }

    /// Target date of every kind: appointment start minus the clinic's lead time.
    pub fn compute_dates(start: DateTime<Utc>, settings: &ClinicSettings) -> Vec<NotificationDate> {
        NotificationKind::ALL
            .iter()
            .map(|kind| {
                let lead_time_minutes = settings.lead_time_minutes(*kind);
                NotificationDate {
                    kind: *kind,
                    target_date: start - Duration::minutes(lead_time_minutes),
                    lead_time_minutes,
                }
            })
            .collect()
    }

    pub async fn create_jobs(
        &self,
        tx: &mut dyn UnitOfWork,
        dates: &[NotificationDate],
        clinic_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Vec<NotificationJob>, SchedulingError> {
        let jobs = dates
            .iter()
            .map(|date| NewNotificationJob {
                clinic_id,
                appointment_id,
                kind: date.kind,
                target_date: date.target_date,
                meta_data: json!({ "leadTimeMinutes": date.lead_time_minutes }),
            })
            .collect();

        let created = tx.insert_jobs(jobs, Utc::now()).await?;
        debug!("Created {} notification jobs for appointment {}", created.len(), appointment_id);
        Ok(created)
    }

    /// Computes dates from the clinic settings and creates the jobs.
    pub async fn schedule_appointment_in(
        &self,
        tx: &mut dyn UnitOfWork,
        appointment: &Appointment,
    ) -> Result<Vec<NotificationJob>, SchedulingError> {
        let settings = self.settings.settings_for(appointment.clinic_id).await?;
        let dates = Self::compute_dates(appointment.start_date, &settings);
        self.create_jobs(tx, &dates, appointment.clinic_id, appointment.id).await
    }

    pub async fn delete_cron_job(
        &self,
        tx: &mut dyn UnitOfWork,
        appointment_id: Uuid,
    ) -> Result<usize, SchedulingError> {
        let deleted = tx.delete_jobs_for_appointment(appointment_id).await?;
        debug!("Deleted {} notification jobs for appointment {}", deleted, appointment_id);
        Ok(deleted)
    }

    pub async fn notify_not_confirmed_appointments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<KindOutcome, SchedulingError> {
        self.fire_due(NotificationKind::ConfirmBeforeAppt, now).await
    }

    /// Also moves each reminded appointment from CONFIRM1 to CONFIRM2.
    pub async fn notify_not_reminded_appointments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<KindOutcome, SchedulingError> {
        self.fire_due(NotificationKind::RemindBeforeAppt, now).await
    }

    pub async fn notify_sec_not_confirmed_before_appt(
        &self,
        now: DateTime<Utc>,
    ) -> Result<KindOutcome, SchedulingError> {
        self.fire_due(NotificationKind::SecNotConfirmedBeforeAppt, now).await
    }

    pub async fn send_checkin_notification_before_appt(
        &self,
        now: DateTime<Utc>,
    ) -> Result<KindOutcome, SchedulingError> {
        self.fire_due(NotificationKind::CheckinBeforeAppt, now).await
    }

    pub async fn run_hourly_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.run_cadence(Cadence::Hourly, now).await
    }

    pub async fn run_minute_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.run_cadence(Cadence::Minute, now).await
    }

    /// Runs every kind of the cadence concurrently. A failing kind is
    /// logged and reported; the others still run.
    pub async fn run_cadence(&self, cadence: Cadence, now: DateTime<Utc>) -> TickReport {
        let kinds = cadence.kinds();
        let results = join_all(kinds.iter().map(|kind| self.fire_due(*kind, now))).await;

        let reports = kinds
            .iter()
            .zip(results)
            .map(|(kind, result)| {
                if let Err(e) = &result {
                    error!("{} notification batch failed: {}", kind, e);
                }
                KindReport {
                    kind: *kind,
                    result: result.map_err(|e| e.to_string()),
                }
            })
            .collect();

        TickReport {
            cadence,
            ran_at: now,
            kinds: reports,
        }
    }

    #[instrument(skip(self), fields(kind = %kind))]
    async fn fire_due(
        &self,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Result<KindOutcome, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let due = select_due(tx.as_mut(), kind, now).await?;
        if due.is_empty() {
            return Ok(KindOutcome::default());
        }

        let mut outcome = KindOutcome {
            matched: due.len(),
            ..Default::default()
        };
        let ids: Vec<i64> = due.iter().map(|(job, _)| job.id).collect();

        if self.claim_before_send {
            let stamped = tx.mark_jobs_sent(&ids, now).await?;
            outcome.stamped = stamped.len();
            if kind == NotificationKind::RemindBeforeAppt {
                outcome.transitioned = flip_to_confirm2(tx.as_mut(), &due, &stamped, now).await?;
            }
            tx.commit().await?;

            let claimed: Vec<DueJob> = due
                .into_iter()
                .filter(|(job, _)| stamped.contains(&job.id))
                .collect();
            self.publish_due(kind, &claimed, &mut outcome).await;
        } else {
            drop(tx);
            self.publish_due(kind, &due, &mut outcome).await;

            let mut tx = self.store.begin().await?;
            let stamped = tx.mark_jobs_sent(&ids, now).await?;
            outcome.stamped = stamped.len();
            if kind == NotificationKind::RemindBeforeAppt {
                outcome.transitioned = flip_to_confirm2(tx.as_mut(), &due, &stamped, now).await?;
            }
            tx.commit().await?;
        }

        info!(
            "{}: {} matched, {} published, {} stamped",
            kind, outcome.matched, outcome.published, outcome.stamped
        );
        Ok(outcome)
    }

    async fn publish_due(&self, kind: NotificationKind, due: &[DueJob], outcome: &mut KindOutcome) {
        for (job, appointment) in due {
            let payload = NotificationEventPayload {
                event_name: kind.topic().to_string(),
                source: self.source.clone(),
                clinic_id: job.clinic_id,
                patient_id: appointment.patient_id,
                appointment: NotifiedAppointment {
                    appointment_id: appointment.id,
                    staff_id: appointment.staff_id,
                    appointment_date_time: appointment.start_date,
                },
                meta_data: job.meta_data.as_object().cloned().unwrap_or_default(),
            };

            let published = match serde_json::to_value(&payload) {
                Ok(value) => publish_logged(self.publisher.as_ref(), kind.topic(), value).await,
                Err(e) => {
                    error!("Failed to encode {} payload for job {}: {}", kind, job.id, e);
                    false
                }
            };

            if published {
                outcome.published += 1;
            } else {
                outcome.failed_publishes += 1;
            }
        }
    }

    /// Whether a job of `kind` has already fired for the appointment.
    pub async fn check_if_notify(
        &self,
        appointment_id: Uuid,
        kind: NotificationKind,
    ) -> Result<bool, SchedulingError> {
        Ok(self
            .get_sent_events(appointment_id)
            .await?
            .iter()
            .any(|job| job.kind == kind))
    }

    /// Fired jobs of the appointment, oldest first.
    pub async fn get_sent_events(&self, appointment_id: Uuid) -> Result<Vec<NotificationJob>, SchedulingError> {
        let mut tx = self.store.begin().await?;
        let query = JobQuery {
            sent_only: true,
            ..JobQuery::for_appointment(appointment_id)
        };
        let mut sent = tx.list_jobs(&query).await?;
        sent.sort_by(|a, b| a.sent_date.cmp(&b.sent_date).then(a.id.cmp(&b.id)));
        Ok(sent)
    }

    pub async fn last_event_sent(&self, appointment_id: Uuid) -> Result<Option<NotificationKind>, SchedulingError> {
        Ok(self
            .get_sent_events(appointment_id)
            .await?
            .last()
            .map(|job| job.kind))
    }

    pub async fn next_action_hint(&self, appointment_id: Uuid) -> Result<NextActionHint, SchedulingError> {
        Ok(self.last_event_sent(appointment_id).await?.into())
    }
}

/// Unsent jobs of `kind` due at `now` whose appointment is live and in one
/// of the kind's eligible statuses.
async fn select_due(
    tx: &mut dyn UnitOfWork,
    kind: NotificationKind,
    now: DateTime<Utc>,
) -> Result<Vec<DueJob>, SchedulingError> {
    let jobs = tx.list_jobs(&JobQuery::due(kind, now)).await?;
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    let mut appointment_ids: Vec<Uuid> = jobs.iter().map(|job| job.appointment_id).collect();
    appointment_ids.sort();
    appointment_ids.dedup();

    let query = AppointmentQuery {
        deleted: DeletedFilter::ExcludeDeleted,
        ..AppointmentQuery::by_ids(appointment_ids)
    }
    .with_statuses(kind.eligible_statuses());

    let appointments: HashMap<Uuid, Appointment> = tx
        .list_appointments(&query)
        .await?
        .into_iter()
        .filter(|appointment| !appointment.is_provisional())
        .map(|appointment| (appointment.id, appointment))
        .collect();

    Ok(jobs
        .into_iter()
        .filter_map(|job| {
            appointments
                .get(&job.appointment_id)
                .cloned()
                .map(|appointment| (job, appointment))
        })
        .collect())
}

async fn flip_to_confirm2(
    tx: &mut dyn UnitOfWork,
    due: &[DueJob],
    stamped: &[i64],
    now: DateTime<Utc>,
) -> Result<usize, SchedulingError> {
    let mut transitioned = 0;

    for (job, appointment) in due.iter().filter(|(job, _)| stamped.contains(&job.id)) {
        let Some(mut current) = tx
            .find_appointment(appointment.id, DeletedFilter::ExcludeDeleted)
            .await?
        else {
            continue;
        };
        if current.status != AppointmentStatusCode::Confirm1 {
            warn!(
                "Appointment {} left CONFIRM1 before job {} was stamped",
                current.id, job.id
            );
            continue;
        }

        let recorded = tx.last_recorded_status(appointment.id).await?;
        current.status = AppointmentStatusCode::Confirm2;
        current.touch(Uuid::nil(), now);
        tx.update_appointment(current).await?;
        tx.append_status_history(NewStatusHistoryEntry {
            appointment_id: appointment.id,
            status: AppointmentStatusCode::Confirm2,
            previous_status: recorded,
            created_by: Uuid::nil(),
            created_at: now,
        })
        .await?;
        transitioned += 1;
    }

    Ok(transitioned)
}
