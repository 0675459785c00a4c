//! Contract tests for the collaborator clients against wiremock servers.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | GET | `/api/v1/wallet/{id}/?is_active` | `wallet_*` |
//! | GET | `/api/v1/storage_credentials/{id}/?is_active` | `storage_credentials_*` |
//! | GET | `/api/v1/device/{id}/?is_active` | `device_*` |
//! | GET | `/certificates/{id}` | `certificate_*` |
//! | GET | `/devices/{id}/certificates` | `active_certificate_*` |
//! | POST | `/things/{id}/shadow` | `shadow_*` |
//! | POST | `/validations` | `gtx_*` |

use transmission_core::{CertificateId, DeviceId, ShipmentId, StorageCredentialsId, WalletId};
use transmission_profiles::{
    http_client, CertificateStatus, CollaboratorConfig, DeviceRegistry, DeviceRegistryClient,
    GtxClient, GtxOutcome, GtxValidator, IdentityGateway, ProfilesClient, ProfilesError,
    ShadowClient, ShadowPublisher, ShadowUpdate,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http() -> reqwest::Client {
    http_client(&CollaboratorConfig {
        timeout_secs: 5,
        ..CollaboratorConfig::default()
    })
    .unwrap()
}

fn profiles(server: &MockServer) -> ProfilesClient {
    ProfilesClient::new(http(), server.uri().parse().unwrap())
}

// ── Profiles ─────────────────────────────────────────────────────────

#[tokio::test]
async fn wallet_lookup_forwards_caller_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wallet/wallet-1/"))
        .and(query_param("is_active", ""))
        .and(header("authorization", "Bearer caller-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let wallet = WalletId::new("wallet-1").unwrap();
    assert!(profiles(&server)
        .wallet_is_active("caller-jwt", &wallet)
        .await
        .unwrap());
}

#[tokio::test]
async fn wallet_lookup_treats_client_errors_as_denial() {
    let server = MockServer::start().await;
    for (id, status) in [("w-403", 403), ("w-404", 404)] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/wallet/{id}/")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let client = profiles(&server);
    for id in ["w-403", "w-404"] {
        let wallet = WalletId::new(id).unwrap();
        assert!(!client.wallet_is_active("t", &wallet).await.unwrap());
    }
}

#[tokio::test]
async fn wallet_lookup_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wallet/w/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = profiles(&server)
        .wallet_is_active("t", &WalletId::new("w").unwrap())
        .await
        .unwrap_err();
    match err {
        ProfilesError::ApiError { status, body, .. } => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn storage_credentials_lookup_uses_its_own_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/storage_credentials/sc-9/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StorageCredentialsId::new("sc-9").unwrap();
    assert!(profiles(&server)
        .storage_credentials_is_active("t", &creds)
        .await
        .unwrap());
}

#[tokio::test]
async fn device_lookup_uses_device_uuid() {
    let server = MockServer::start().await;
    let device = DeviceId::new();
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/device/{device}/")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(profiles(&server).device_is_active("t", &device).await.unwrap());
}

#[tokio::test]
async fn unreachable_profiles_is_transport_error() {
    let client = ProfilesClient::new(http(), "http://127.0.0.1:9".parse().unwrap());
    let err = client
        .wallet_is_active("t", &WalletId::new("w").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ProfilesError::Http { .. }));
}

// ── Device registry ──────────────────────────────────────────────────

#[tokio::test]
async fn certificate_lookup_parses_record() {
    let server = MockServer::start().await;
    let device = DeviceId::new();
    Mock::given(method("GET"))
        .and(path("/certificates/cert-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "certificate_id": "cert-1",
            "status": "ACTIVE",
            "device_id": device.to_string(),
            "public_key": "00".repeat(32)
        })))
        .mount(&server)
        .await;

    let registry = DeviceRegistryClient::new(http(), server.uri().parse().unwrap());
    let record = registry
        .certificate(&CertificateId::new("cert-1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, CertificateStatus::Active);
    assert_eq!(record.device_id, Some(device));
}

#[tokio::test]
async fn certificate_lookup_returns_none_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/certificates/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let registry = DeviceRegistryClient::new(http(), server.uri().parse().unwrap());
    let record = registry
        .certificate(&CertificateId::new("missing").unwrap())
        .await
        .unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn active_certificate_skips_inactive_ones() {
    let server = MockServer::start().await;
    let device = DeviceId::new();
    Mock::given(method("GET"))
        .and(path(format!("/devices/{device}/certificates")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"certificate_id": "old", "status": "INACTIVE", "public_key": "11".repeat(32)},
            {"certificate_id": "new", "status": "ACTIVE", "public_key": "22".repeat(32)},
            {"certificate_id": "odd", "status": "PENDING_TRANSFER", "public_key": "33".repeat(32)}
        ])))
        .mount(&server)
        .await;

    let registry = DeviceRegistryClient::new(http(), server.uri().parse().unwrap());
    let record = registry
        .active_certificate_for_device(&device)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.certificate_id.as_str(), "new");
}

// ── Shadow ───────────────────────────────────────────────────────────

#[tokio::test]
async fn shadow_update_wraps_desired_state() {
    let server = MockServer::start().await;
    let device = DeviceId::new();
    let shipment = ShipmentId::new();
    Mock::given(method("POST"))
        .and(path(format!("/things/{device}/shadow")))
        .and(body_json(serde_json::json!({
            "state": {"desired": {"shipmentId": shipment.to_string(), "shipmentState": "IN_TRANSIT"}}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ShadowClient::new(http(), server.uri().parse().unwrap());
    client
        .publish(
            &device,
            &ShadowUpdate {
                shipment_id: Some(shipment),
                shipment_state: Some("IN_TRANSIT".into()),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn shadow_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ShadowClient::new(http(), server.uri().parse().unwrap());
    let err = client
        .publish(
            &DeviceId::new(),
            &ShadowUpdate {
                shipment_id: None,
                shipment_state: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProfilesError::ApiError { status: 500, .. }));
}

// ── GTX ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn gtx_validation_returns_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validations"))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"status": "PENDING"})))
        .mount(&server)
        .await;

    let client = GtxClient::new(http(), server.uri().parse().unwrap());
    let outcome = client
        .request_validation(&ShipmentId::new(), "abcd")
        .await
        .unwrap();
    assert_eq!(outcome, GtxOutcome::Pending);
}

#[tokio::test]
async fn gtx_malformed_body_is_deserialization_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = GtxClient::new(http(), server.uri().parse().unwrap());
    let err = client
        .request_validation(&ShipmentId::new(), "abcd")
        .await
        .unwrap_err();
    assert!(matches!(err, ProfilesError::Deserialization { .. }));
}
