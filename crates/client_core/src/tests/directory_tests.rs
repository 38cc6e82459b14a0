use super::*;
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;

fn sample_request() -> CreateRoomRequest {
    CreateRoomRequest {
        name: "Late night music".into(),
        description: None,
        topics: vec!["music".into()],
        is_public: true,
        host_id: "host-1".into(),
        host_name: "Host".into(),
        max_speakers: 13,
    }
}

fn sample_record(room_id: &str, invite_token: &str) -> RoomRecord {
    RoomRecord {
        room_id: room_id.into(),
        name: "Late night music".into(),
        description: None,
        topics: vec!["music".into()],
        is_public: true,
        host_id: "host-1".into(),
        host_name: "Host".into(),
        max_speakers: 13,
        invite_token: invite_token.into(),
        created_at: Utc::now(),
    }
}

async fn spawn_directory_server() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route(
            ROOMS_ROUTE,
            post(|Json(_req): Json<CreateRoomRequest>| async {
                Json(CreateRoomResponse {
                    room_id: "room-abc".into(),
                    invite_token: "invite-abc".into(),
                })
            }),
        )
        .route(
            &format!("{ROOMS_ROUTE}/:room_id"),
            get(|Path(room_id): Path<String>| async move {
                if room_id == "room-abc" {
                    Ok(Json(sample_record("room-abc", "invite-abc")))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        )
        .route(
            &format!("{INVITES_ROUTE}/:token"),
            get(|Path(token): Path<String>| async move {
                if token == "invite-abc" {
                    Ok(Json(sample_record("room-abc", "invite-abc")))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn http_directory_creates_and_reads_rooms() {
    let server_url = spawn_directory_server().await;
    let directory = HttpRoomDirectory::new(&server_url).expect("directory");

    let created = create_room_or_fallback(&directory, &sample_request()).await;
    assert_eq!(created.room_id, "room-abc");
    assert_eq!(created.invite_token, "invite-abc");
    assert!(!created.ad_hoc);

    let record = directory.get_room("room-abc").await.expect("get room");
    assert_eq!(record.map(|r| r.name).as_deref(), Some("Late night music"));
    assert!(directory.get_room("nope").await.expect("get room").is_none());
}

#[tokio::test]
async fn unavailable_directory_degrades_to_ad_hoc_room() {
    let created = create_room_or_fallback(&MissingRoomDirectory, &sample_request()).await;
    assert!(created.ad_hoc);
    assert!(created.room_id.starts_with("room-"));
    assert_eq!(created.room_id.split('-').count(), 3);
    assert!(!created.invite_token.is_empty());

    let other = mint_ad_hoc_room();
    assert_ne!(created.invite_token, other.invite_token);
}

#[test]
fn parses_room_and_invite_links() {
    assert_eq!(
        parse_room_reference("https://example.test/clubspaces/room/room-123"),
        RoomReference::RoomId("room-123".into())
    );
    assert_eq!(
        parse_room_reference("https://example.test/clubspaces/invite/tok_9?ref=share"),
        RoomReference::InviteToken("tok_9".into())
    );
    assert_eq!(
        parse_room_reference("  room-plain  "),
        RoomReference::RoomId("room-plain".into())
    );
}

#[tokio::test]
async fn invite_tokens_resolve_through_directory() {
    let server_url = spawn_directory_server().await;
    let directory = HttpRoomDirectory::new(&server_url).expect("directory");

    let resolved = resolve_room_reference(
        &directory,
        RoomReference::InviteToken("invite-abc".into()),
    )
    .await;
    assert_eq!(resolved, "room-abc");

    let unresolved = resolve_room_reference(
        &MissingRoomDirectory,
        RoomReference::InviteToken("invite-xyz".into()),
    )
    .await;
    assert_eq!(unresolved, "invite-xyz");
}
