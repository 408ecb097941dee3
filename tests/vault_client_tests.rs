//! HTTP client behavior against a fake Vault listener: the login
//! exchange, data unwrapping, 404 semantics for reads versus deletes, and
//! error body propagation.

use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use vault_resource_controller::vault::api::VaultApi;
use vault_resource_controller::vault::error::VaultError;
use vault_resource_controller::vault::session::{
    establish, JwtSource, KubernetesJwtLogin, VaultConnection,
};

async fn login_handler(Json(body): Json<Value>) -> impl IntoResponse {
    if body.get("role").and_then(|r| r.as_str()) != Some("controller") {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "errors": ["invalid role"] })),
        );
    }
    if body.get("jwt").and_then(|j| j.as_str()).unwrap_or("").is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": ["missing jwt"] })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "auth": { "client_token": "s.test-token" } })),
    )
}

async fn read_secret() -> impl IntoResponse {
    Json(json!({
        "request_id": "abc",
        "data": { "password": "hunter2" },
    }))
}

async fn write_secret() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn delete_secret() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn denied() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "errors": ["permission denied"] })),
    )
}

/// Start the fake Vault and return its base address.
async fn fake_vault() -> String {
    let app = Router::new()
        .route("/v1/auth/kubernetes/login", post(login_handler))
        .route(
            "/v1/team-a/kv/app",
            get(read_secret).post(write_secret).delete(delete_secret),
        )
        .route("/v1/forbidden/app", delete(denied));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    address
}

fn login(role: &str) -> KubernetesJwtLogin {
    KubernetesJwtLogin {
        mount: "kubernetes".to_string(),
        role: role.to_string(),
        jwt: JwtSource::Value("test-jwt".to_string()),
    }
}

#[tokio::test]
async fn session_login_and_read_unwraps_data() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let client = establish(&connection, &login("controller")).await.unwrap();

    let payload = client.read("team-a/kv/app").await.unwrap().unwrap();
    assert_eq!(
        payload.get("password").and_then(|p| p.as_str()),
        Some("hunter2")
    );
}

#[tokio::test]
async fn login_failure_is_an_auth_error() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let err = establish(&connection, &login("wrong-role"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn read_of_missing_path_is_absent_not_error() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let client = establish(&connection, &login("controller")).await.unwrap();

    let payload = client.read("team-a/kv/missing").await.unwrap();
    assert!(payload.is_none());
}

#[tokio::test]
async fn delete_of_missing_path_surfaces_not_found() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let client = establish(&connection, &login("controller")).await.unwrap();

    let err = client.delete("team-a/kv/missing").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");

    client.delete("team-a/kv/app").await.unwrap();
}

#[tokio::test]
async fn error_bodies_are_collected_into_the_message() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let client = establish(&connection, &login("controller")).await.unwrap();

    let err = client.delete("forbidden/app").await.unwrap_err();
    match err {
        VaultError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 403);
            assert!(message.contains("permission denied"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn write_round_trip_succeeds() {
    let address = fake_vault().await;
    let connection = VaultConnection {
        address,
        namespace: None,
    };
    let client = establish(&connection, &login("controller")).await.unwrap();

    let payload = json!({ "password": "next" })
        .as_object()
        .cloned()
        .unwrap();
    let response = client.write("team-a/kv/app", &payload).await.unwrap();
    assert!(response.is_none());
}
