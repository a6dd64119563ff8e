mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use appointment_cell::*;
use common::*;
use shared_models::appointment::HistoryOrder;
use shared_models::lookup::{AppointmentStatusCode, PatientStatus, VisitMode};
use shared_models::SchedulingError;
use shared_utils::test_utils::days_from_now_at;

#[tokio::test]
async fn test_create_binds_slot_and_schedules_jobs() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let patient_id = Uuid::new_v4();

    let appointment = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(patient_id, slot.id))
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatusCode::WaitList);
    assert_eq!(appointment.availability_id, Some(slot.id));
    assert_eq!(appointment.staff_id, Some(slot.staff_id));
    assert_eq!(appointment.start_date, slot.start_date);
    assert_eq!(appointment.end_date, slot.end_date);
    assert_eq!(appointment.provisional_date, Some(slot.start_date));
    assert!(appointment.upcoming_appointment);
    assert!(h.stored_slot(slot.id).await.is_occupied);
    assert_eq!(h.jobs(appointment.id).await.len(), 4);

    let history = h
        .booking
        .status_history(&identity, appointment.id, HistoryOrder::Asc)
        .await
        .unwrap();
    assert!(history.is_empty());

    let events = h.publisher.events_for("APPOINTMENT_SET_PROVISIONAL").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["changeType"], "Appointment");
    assert_eq!(events[0].payload["appointment"]["appointmentStatus"]["code"], "WAIT_LIST");
}

#[tokio::test]
async fn test_create_without_slot_requires_period_fields() {
    let h = harness();
    let request = CreateAppointmentRequest {
        patient_id: Uuid::new_v4(),
        availability_id: None,
        staff_id: None,
        appointment_type_id: None,
        start_date: None,
        duration_minutes: None,
        visit_mode: VisitMode::InPerson,
        status: None,
        notes: None,
    };

    let result = h.booking.create_appointment(&h.clinic.identity(), request).await;

    assert_matches!(result, Err(SchedulingError::Validation { fields, .. }) => {
        assert_eq!(fields, vec!["startDate", "durationMinutes", "appointmentTypeId", "staffId"]);
    });
}

#[tokio::test]
async fn test_create_with_unknown_type_is_rejected() {
    let h = harness();
    let mut request = direct_request(Uuid::new_v4(), days_from_now_at(3, 9, 0));
    request.appointment_type_id = Some(99);

    let result = h.booking.create_appointment(&h.clinic.identity(), request).await;

    assert_matches!(result, Err(SchedulingError::Validation { fields, .. }) => {
        assert_eq!(fields, vec!["appointmentTypeId"]);
    });
}

#[tokio::test]
async fn test_create_synthesizes_occupied_slot() {
    let h = harness();
    let request = direct_request(Uuid::new_v4(), days_from_now_at(4, 14, 0))
        .with_status(AppointmentStatusCode::Schedule);

    let appointment = h.booking.create_appointment(&h.clinic.identity(), request).await.unwrap();

    let slot_id = appointment.availability_id.unwrap();
    let slot = h.stored_slot(slot_id).await;
    assert!(slot.is_occupied);
    assert_eq!(Some(slot.staff_id), appointment.staff_id);
    assert_eq!(appointment.provisional_date, None);
    assert_eq!(h.publisher.events_for("APPOINTMENT_SCHEDULED").await.len(), 1);
}

#[tokio::test]
async fn test_slot_exclusivity() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;

    h.booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();
    let second = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await;
    assert_matches!(second, Err(SchedulingError::Conflict { .. }));

    let missing = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), Uuid::new_v4()))
        .await;
    assert_matches!(missing, Err(SchedulingError::NotFound { entity: "Availability", .. }));
}

#[tokio::test]
async fn test_single_pending_provisional_per_patient() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    let first_slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let second_slot = h.slot(days_from_now_at(6, 10, 0)).await;

    h.booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(patient_id, first_slot.id))
        .await
        .unwrap();
    let second = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(patient_id, second_slot.id))
        .await;

    assert_matches!(second, Err(SchedulingError::Validation { fields, .. }) => {
        assert_eq!(fields, vec!["patientId"]);
    });
    assert!(!h.stored_slot(second_slot.id).await.is_occupied);
}

#[tokio::test]
async fn test_update_status_follows_transition_table() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let appointment = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();

    let illegal = h
        .booking
        .update_status(&identity, appointment.id, AppointmentStatusCode::Confirm1)
        .await;
    assert_matches!(
        illegal,
        Err(SchedulingError::IllegalTransition {
            from: AppointmentStatusCode::WaitList,
            to: AppointmentStatusCode::Confirm1
        })
    );

    let terminal = h
        .booking
        .update_status(&identity, appointment.id, AppointmentStatusCode::Canceled)
        .await;
    assert_matches!(terminal, Err(SchedulingError::Validation { .. }));

    let scheduled = h
        .booking
        .update_status(&identity, appointment.id, AppointmentStatusCode::Schedule)
        .await
        .unwrap();
    assert_eq!(scheduled.status, AppointmentStatusCode::Schedule);
    assert_eq!(h.publisher.events_for("APPOINTMENT_SCHEDULED").await.len(), 1);

    let history = h
        .booking
        .status_history(&identity, appointment.id, HistoryOrder::Desc)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|entry| entry.status).collect();
    assert_eq!(statuses, vec![AppointmentStatusCode::Schedule]);
    assert_eq!(history[0].previous_status, None);
}

#[tokio::test]
async fn test_status_history_is_newest_first_chain() {
    let h = harness();
    let identity = h.clinic.identity();
    let appointment = h
        .booking
        .create_appointment(
            &identity,
            direct_request(Uuid::new_v4(), Utc::now() - Duration::minutes(15)),
        )
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatusCode::WaitList);

    for status in [
        AppointmentStatusCode::Schedule,
        AppointmentStatusCode::Ready,
        AppointmentStatusCode::Confirm1,
    ] {
        h.booking
            .update_status(&identity, appointment.id, status)
            .await
            .unwrap();
    }
    h.booking
        .complete_appointment(
            &identity,
            CompleteAppointmentRequest {
                appointment_id: appointment.id,
                visit_id: Uuid::new_v4(),
                visit_summary_document_id: None,
                actual_start_date: None,
                actual_end_date: None,
            },
        )
        .await
        .unwrap();

    let history = h
        .booking
        .status_history(&identity, appointment.id, HistoryOrder::Desc)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|entry| entry.status).collect();
    let previous: Vec<_> = history.iter().map(|entry| entry.previous_status).collect();

    assert_eq!(
        statuses,
        vec![
            AppointmentStatusCode::Complete,
            AppointmentStatusCode::Confirm1,
            AppointmentStatusCode::Ready,
            AppointmentStatusCode::Schedule,
        ]
    );
    assert_eq!(
        previous,
        vec![
            Some(AppointmentStatusCode::Confirm1),
            Some(AppointmentStatusCode::Ready),
            Some(AppointmentStatusCode::Schedule),
            None,
        ]
    );
}

#[tokio::test]
async fn test_update_appointment_edits_live_rows_only() {
    let h = harness();
    let identity = h.clinic.identity();
    let appointment = h
        .booking
        .create_appointment(&identity, direct_request(Uuid::new_v4(), days_from_now_at(3, 9, 0)))
        .await
        .unwrap();

    let updated = h
        .booking
        .update_appointment(
            &identity,
            appointment.id,
            UpdateAppointmentRequest {
                duration_minutes: Some(45),
                visit_mode: Some(VisitMode::Virtual),
                notes: Some("bring previous results".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.end_date - updated.start_date, Duration::minutes(45));
    assert_eq!(updated.visit_mode, VisitMode::Virtual);
    assert_eq!(updated.status, appointment.status);

    let events = h.publisher.events_for("APPOINTMENT_UPDATED").await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload["appointmentBeforeUpdate"]["appointmentId"],
        appointment.id.to_string()
    );

    h.booking
        .cancel_appointment(&identity, cancel_request(appointment.id, PATIENT_REQUEST, false))
        .await
        .unwrap();
    let after_cancel = h
        .booking
        .update_appointment(&identity, appointment.id, UpdateAppointmentRequest::default())
        .await;
    assert_matches!(after_cancel, Err(SchedulingError::Validation { .. }));
}

#[tokio::test]
async fn test_cancel_frees_slot_and_deletes_jobs() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let appointment = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();

    let canceled = h
        .booking
        .cancel_appointment(&identity, cancel_request(appointment.id, PATIENT_REQUEST, false))
        .await
        .unwrap();

    assert_eq!(canceled.status, AppointmentStatusCode::Canceled);
    assert_eq!(canceled.cancel_reschedule_reason_id, Some(PATIENT_REQUEST));
    assert_eq!(canceled.cancel_reschedule_text.as_deref(), Some("patient called"));
    assert_eq!(canceled.canceled_by, Some(identity.user_id));
    assert!(!canceled.upcoming_appointment);
    assert!(!h.stored_slot(slot.id).await.is_occupied);
    assert!(h.jobs(appointment.id).await.is_empty());
    assert_eq!(h.publisher.events_for("APPOINTMENT_CANCELED").await.len(), 1);
}

#[tokio::test]
async fn test_cancel_can_keep_slot() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let appointment = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();

    h.booking
        .cancel_appointment(&identity, cancel_request(appointment.id, PATIENT_REQUEST, true))
        .await
        .unwrap();

    assert!(h.stored_slot(slot.id).await.is_occupied);
}

#[tokio::test]
async fn test_cancel_with_unknown_reason() {
    let h = harness();
    let identity = h.clinic.identity();
    let appointment = h
        .booking
        .create_appointment(&identity, direct_request(Uuid::new_v4(), days_from_now_at(3, 9, 0)))
        .await
        .unwrap();

    let result = h
        .booking
        .cancel_appointment(&identity, cancel_request(appointment.id, 99, false))
        .await;

    assert_matches!(result, Err(SchedulingError::UnknownReason(99)));
}

#[tokio::test]
async fn test_release_reason_releases_patient() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    let appointment = h
        .booking
        .create_appointment(&identity, direct_request(patient_id, days_from_now_at(3, 9, 0)))
        .await
        .unwrap();

    let released = h
        .booking
        .cancel_appointment(&identity, cancel_request(appointment.id, RELEASE_PATIENT, false))
        .await
        .unwrap();

    assert_eq!(released.status, AppointmentStatusCode::Released);
    assert_eq!(
        h.patients.status_of(identity.clinic_id, patient_id).await,
        Some(PatientStatus::Released)
    );
}

#[tokio::test]
async fn test_failed_patient_update_rolls_back_cancel() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let appointment = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();

    h.patients.fail_next();
    let result = h
        .booking
        .cancel_appointment(&identity, cancel_request(appointment.id, RELEASE_PATIENT, false))
        .await;

    assert_matches!(result, Err(SchedulingError::Dependency(_)));
    let stored = h.booking.find_appointment(&identity, appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatusCode::WaitList);
    assert!(h.stored_slot(slot.id).await.is_occupied);
    assert_eq!(h.jobs(appointment.id).await.len(), 4);
    assert!(h.publisher.events_for("APPOINTMENT_CANCELED").await.is_empty());
}

#[tokio::test]
async fn test_reschedule_to_new_slot() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    let old_slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let new_slot = h.slot(days_from_now_at(8, 15, 0)).await;
    let original = h
        .booking
        .create_appointment(
            &identity,
            CreateAppointmentRequest::for_slot(patient_id, old_slot.id)
                .with_status(AppointmentStatusCode::Schedule),
        )
        .await
        .unwrap();

    let mut request = reschedule_request(original.id);
    request.availability_id = Some(new_slot.id);
    let successor = h.booking.reschedule_appointment(&identity, request).await.unwrap();

    assert_eq!(successor.status, AppointmentStatusCode::Schedule);
    assert_eq!(successor.previous_appointment_id, Some(original.id));
    assert_eq!(successor.availability_id, Some(new_slot.id));
    assert_eq!(successor.start_date, new_slot.start_date);
    assert!(successor.upcoming_appointment);
    assert!(!h.stored_slot(old_slot.id).await.is_occupied);
    assert!(h.stored_slot(new_slot.id).await.is_occupied);
    assert!(h.jobs(original.id).await.is_empty());
    assert_eq!(h.jobs(successor.id).await.len(), 4);

    let predecessor = h.booking.find_appointment(&identity, original.id).await.unwrap();
    assert_eq!(predecessor.status, AppointmentStatusCode::Rescheduled);
    assert_eq!(predecessor.cancel_reschedule_reason_id, Some(RESCHEDULE_PATIENT_REQUEST));
    assert_eq!(
        h.booking.patient_appointments(&identity, patient_id).await.unwrap().len(),
        2
    );

    let events = h.publisher.events_for("APPOINTMENT_RESCHEDULED").await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload["previousAppointment"]["appointmentId"],
        original.id.to_string()
    );
}

#[tokio::test]
async fn test_reschedule_confirmed_appointment_to_new_date() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    let old_slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let original = h
        .booking
        .create_appointment(
            &identity,
            CreateAppointmentRequest::for_slot(patient_id, old_slot.id)
                .with_status(AppointmentStatusCode::Schedule),
        )
        .await
        .unwrap();
    for status in [AppointmentStatusCode::Confirm1, AppointmentStatusCode::Confirm2] {
        h.booking
            .update_status(&identity, original.id, status)
            .await
            .unwrap();
    }
    let before = h.booking.patient_appointments(&identity, patient_id).await.unwrap().len();

    let new_start = days_from_now_at(9, 14, 0);
    let mut request = reschedule_request(original.id);
    request.start_date = Some(new_start);
    let successor = h.booking.reschedule_appointment(&identity, request).await.unwrap();

    let after = h.booking.patient_appointments(&identity, patient_id).await.unwrap().len();
    assert_eq!(after, before + 1);

    assert_eq!(successor.previous_appointment_id, Some(original.id));
    assert_eq!(successor.status, AppointmentStatusCode::Schedule);
    assert_eq!(successor.start_date, new_start);
    assert_eq!(successor.staff_id, original.staff_id);

    let synthesized = successor.availability_id.unwrap();
    assert_ne!(synthesized, old_slot.id);
    let slot = h.stored_slot(synthesized).await;
    assert!(slot.is_occupied);
    assert_eq!(slot.start_date, new_start);
    assert!(!h.stored_slot(old_slot.id).await.is_occupied);

    let predecessor = h.booking.find_appointment(&identity, original.id).await.unwrap();
    assert_eq!(predecessor.status, AppointmentStatusCode::Rescheduled);
    let history = h
        .booking
        .status_history(&identity, original.id, HistoryOrder::Desc)
        .await
        .unwrap();
    assert_eq!(history[0].status, AppointmentStatusCode::Rescheduled);
    assert_eq!(history[0].previous_status, Some(AppointmentStatusCode::Confirm2));
}

#[tokio::test]
async fn test_reschedule_provisional_keeping_slot() {
    let h = harness();
    let identity = h.clinic.identity();
    let slot = h.slot(days_from_now_at(5, 10, 0)).await;
    let original = h
        .booking
        .create_appointment(&identity, CreateAppointmentRequest::for_slot(Uuid::new_v4(), slot.id))
        .await
        .unwrap();

    let mut request = reschedule_request(original.id);
    request.keep_availability_slot = true;
    let successor = h.booking.reschedule_appointment(&identity, request).await.unwrap();

    assert_eq!(successor.status, AppointmentStatusCode::WaitList);
    assert_eq!(successor.availability_id, Some(slot.id));
    assert_eq!(successor.provisional_date, original.provisional_date);
    assert_eq!(successor.start_date, original.start_date);
    assert!(h.stored_slot(slot.id).await.is_occupied);
}

#[tokio::test]
async fn test_reschedule_terminal_appointment_is_illegal() {
    let h = harness();
    let identity = h.clinic.identity();
    let appointment = h
        .booking
        .create_appointment(&identity, direct_request(Uuid::new_v4(), days_from_now_at(3, 9, 0)))
        .await
        .unwrap();
    h.booking
        .cancel_appointment(&identity, cancel_request(appointment.id, PATIENT_REQUEST, false))
        .await
        .unwrap();

    let result = h
        .booking
        .reschedule_appointment(&identity, reschedule_request(appointment.id))
        .await;

    assert_matches!(
        result,
        Err(SchedulingError::IllegalTransition {
            from: AppointmentStatusCode::Canceled,
            to: AppointmentStatusCode::Rescheduled
        })
    );
}

#[tokio::test]
async fn test_adhoc_cancels_same_day_appointments() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    let walk_in_at = days_from_now_at(2, 9, 0);

    let same_day = h
        .booking
        .create_appointment(
            &identity,
            direct_request(patient_id, days_from_now_at(2, 15, 0)).with_status(AppointmentStatusCode::Schedule),
        )
        .await
        .unwrap();
    let other_day = h
        .booking
        .create_appointment(
            &identity,
            direct_request(patient_id, days_from_now_at(4, 15, 0)).with_status(AppointmentStatusCode::Schedule),
        )
        .await
        .unwrap();

    let adhoc = h
        .booking
        .adhoc_appointment(
            &identity,
            AdhocAppointmentRequest {
                patient_id,
                visit_mode: VisitMode::Phone,
                date: walk_in_at,
                staff_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(adhoc.status, AppointmentStatusCode::CheckIn);
    assert_eq!(adhoc.duration_minutes, 0);
    assert_eq!(adhoc.visit_mode, VisitMode::Phone);
    assert_eq!(adhoc.availability_id, None);
    assert!(h.jobs(adhoc.id).await.is_empty());

    let canceled = h.booking.find_appointment(&identity, same_day.id).await.unwrap();
    assert_eq!(canceled.status, AppointmentStatusCode::Canceled);
    assert_eq!(canceled.cancel_reschedule_reason_id, Some(ADHOC_REASON));
    assert_eq!(
        canceled.cancel_reschedule_text.as_deref(),
        Some("Ad-hoc appointment initiated")
    );

    let untouched = h.booking.find_appointment(&identity, other_day.id).await.unwrap();
    assert_eq!(untouched.status, AppointmentStatusCode::Schedule);
}

#[tokio::test]
async fn test_upcoming_flag_moves_with_cancellation() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();

    let provisional = h
        .booking
        .create_appointment(&identity, direct_request(patient_id, days_from_now_at(20, 9, 0)))
        .await
        .unwrap();
    let scheduled = h
        .booking
        .create_appointment(
            &identity,
            direct_request(patient_id, days_from_now_at(3, 9, 0)).with_status(AppointmentStatusCode::Schedule),
        )
        .await
        .unwrap();

    let upcoming = h.booking.upcoming_appointment(&identity, patient_id).await.unwrap();
    assert_eq!(upcoming.map(|a| a.id), Some(scheduled.id));

    h.booking
        .cancel_appointment(&identity, cancel_request(scheduled.id, PATIENT_REQUEST, false))
        .await
        .unwrap();

    let upcoming = h.booking.upcoming_appointment(&identity, patient_id).await.unwrap();
    assert_eq!(upcoming.map(|a| a.id), Some(provisional.id));
}

#[tokio::test]
async fn test_cancel_patient_appointments_in_bulk() {
    let h = harness();
    let identity = h.clinic.identity();
    let patient_id = Uuid::new_v4();
    for days in [3, 6] {
        h.booking
            .create_appointment(
                &identity,
                direct_request(patient_id, days_from_now_at(days, 9, 0))
                    .with_status(AppointmentStatusCode::Schedule),
            )
            .await
            .unwrap();
    }

    let canceled = h
        .booking
        .cancel_patient_appointments(
            &identity,
            CancelPatientAppointmentsRequest {
                patient_id,
                cancel_reason_id: PATIENT_REQUEST,
                cancel_reason_text: None,
                keep_availability_slot: false,
                exclude_visit_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(canceled.len(), 2);
    assert!(canceled
        .iter()
        .all(|appointment| appointment.status == AppointmentStatusCode::Canceled));
    assert_eq!(h.publisher.events_for("APPOINTMENT_CANCELED").await.len(), 2);
    assert!(h
        .booking
        .upcoming_appointment(&identity, patient_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_other_clinic_cannot_see_appointment() {
    let h = harness();
    let appointment = h
        .booking
        .create_appointment(&h.clinic.identity(), direct_request(Uuid::new_v4(), Utc::now() + Duration::days(2)))
        .await
        .unwrap();

    let other = shared_models::auth::Identity::new(Uuid::new_v4(), Uuid::new_v4());
    let result = h.booking.find_appointment(&other, appointment.id).await;

    assert_matches!(result, Err(SchedulingError::NotFound { entity: "Appointment", .. }));
}
