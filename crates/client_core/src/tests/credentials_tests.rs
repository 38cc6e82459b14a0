use super::*;
use axum::{http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

async fn spawn_token_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn request(room: &str) -> TokenRequest {
    TokenRequest {
        room_name: room.to_string(),
        participant_name: Some("Alice".into()),
        participant_identity: None,
    }
}

#[tokio::test]
async fn returns_credential_from_successful_response() {
    let seen: Arc<Mutex<Vec<TokenRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = seen.clone();
    let app = Router::new().route(
        TOKEN_ROUTE,
        post(move |Json(body): Json<TokenRequest>| {
            let seen = seen_in_handler.clone();
            async move {
                seen.lock().await.push(body);
                Json(TokenResponse {
                    token: "jwt-token".into(),
                    url: "wss://media.test".into(),
                })
            }
        }),
    );
    let server_url = spawn_token_server(app).await;

    let fetcher = HttpCredentialFetcher::new(&server_url).expect("fetcher");
    let credential = fetcher
        .fetch_credential(&request("room-1"))
        .await
        .expect("credential");

    assert_eq!(
        credential,
        SessionCredential {
            token: "jwt-token".into(),
            url: "wss://media.test".into(),
        }
    );
    let seen = seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].room_name, "room-1");
    assert_eq!(seen[0].participant_name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn non_success_status_is_a_token_generation_failure() {
    let app = Router::new().route(
        TOKEN_ROUTE,
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "not configured") }),
    );
    let server_url = spawn_token_server(app).await;

    let fetcher = HttpCredentialFetcher::new(&server_url).expect("fetcher");
    let err = fetcher
        .fetch_credential(&request("room-1"))
        .await
        .expect_err("should fail");

    assert!(matches!(err, CredentialError::Status { status: 503, .. }));
    assert!(err.to_string().starts_with("Token generation failed"));
}

#[tokio::test]
async fn malformed_body_is_reported() {
    let app = Router::new().route(TOKEN_ROUTE, post(|| async { "{\"token\":1}" }));
    let server_url = spawn_token_server(app).await;

    let fetcher = HttpCredentialFetcher::new(&server_url).expect("fetcher");
    let err = fetcher
        .fetch_credential(&request("room-1"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, CredentialError::Malformed(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let fetcher = HttpCredentialFetcher::new(&format!("http://{addr}")).expect("fetcher");
    let err = fetcher
        .fetch_credential(&request("room-1"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, CredentialError::Unreachable(_)));
}

#[test]
fn endpoint_is_joined_onto_server_url() {
    let fetcher = HttpCredentialFetcher::new("https://clubspaces.test/app/").expect("fetcher");
    assert_eq!(
        fetcher.endpoint().as_str(),
        "https://clubspaces.test/api/livekit/token"
    );
}
