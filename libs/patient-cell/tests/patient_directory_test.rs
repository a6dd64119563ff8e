use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::*;
use shared_models::lookup::PatientStatus;
use shared_models::SchedulingError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

#[tokio::test]
async fn test_supabase_directory_patches_patient_status() {
    let mock_server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({ "status": "RELEASED" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(patient_id, clinic_id, "RELEASED")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let directory = SupabasePatientDirectory::new(&config);

    let result = directory
        .set_status(clinic_id, patient_id, PatientStatus::Released)
        .await;
    assert!(result.is_ok(), "PATCH should succeed: {:?}", result);
}

#[tokio::test]
async fn test_supabase_directory_unknown_patient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let directory = SupabasePatientDirectory::new(&config);

    let result = directory
        .set_status(Uuid::new_v4(), Uuid::new_v4(), PatientStatus::Active)
        .await;
    assert_matches!(result, Err(SchedulingError::NotFound { entity: "Patient", .. }));
}

#[tokio::test]
async fn test_supabase_directory_server_error_is_dependency_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(MockSupabaseResponses::error_response("boom", "XX000")),
        )
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let directory = SupabasePatientDirectory::new(&config);

    let result = directory
        .set_status(Uuid::new_v4(), Uuid::new_v4(), PatientStatus::Released)
        .await;
    assert_matches!(result, Err(SchedulingError::Dependency(_)));
}

#[tokio::test]
async fn test_in_memory_directory_records_status_and_fails_on_demand() {
    let directory = InMemoryPatientDirectory::new();
    let clinic_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    directory
        .set_status(clinic_id, patient_id, PatientStatus::Released)
        .await
        .expect("set_status should succeed");
    assert_eq!(
        directory.status_of(clinic_id, patient_id).await,
        Some(PatientStatus::Released)
    );

    directory.fail_next();
    let result = directory
        .set_status(clinic_id, patient_id, PatientStatus::Active)
        .await;
    assert_matches!(result, Err(SchedulingError::Dependency(_)));
    assert_eq!(
        directory.status_of(clinic_id, patient_id).await,
        Some(PatientStatus::Released)
    );
}
