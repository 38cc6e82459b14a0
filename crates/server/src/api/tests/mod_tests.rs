use super::*;

async fn setup(livekit_url: Option<&str>) -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext {
        storage,
        livekit: LiveKitConfig {
            api_key: "k".into(),
            api_secret: "s".into(),
            ttl_seconds: 60,
        },
        livekit_url: livekit_url.map(str::to_string),
    }
}

fn room_request(name: &str) -> CreateRoomRequest {
    CreateRoomRequest {
        name: name.to_string(),
        description: None,
        topics: vec!["  music ".into(), "".into()],
        is_public: true,
        host_id: "host-1".into(),
        host_name: "Host".into(),
        max_speakers: 13,
    }
}

#[tokio::test]
async fn token_requires_configured_livekit_url() {
    let ctx = setup(None).await;
    let err = issue_token(
        &ctx,
        TokenRequest {
            room_name: "room-1".into(),
            participant_name: None,
            participant_identity: None,
        },
    )
    .await
    .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotConfigured);
    assert!(err.message.contains("not configured"));
}

#[tokio::test]
async fn token_rejects_blank_room_name() {
    let ctx = setup(Some("wss://media.test")).await;
    let err = issue_token(
        &ctx,
        TokenRequest {
            room_name: "   ".into(),
            participant_name: None,
            participant_identity: None,
        },
    )
    .await
    .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn token_uses_supplied_identity_and_returns_url() {
    let ctx = setup(Some("wss://media.test")).await;
    let response = issue_token(
        &ctx,
        TokenRequest {
            room_name: "room-1".into(),
            participant_name: Some("Alice".into()),
            participant_identity: Some("alice".into()),
        },
    )
    .await
    .expect("token");
    assert_eq!(response.url, "wss://media.test");
    assert_eq!(response.token.split('.').count(), 3);
}

#[tokio::test]
async fn created_room_is_retrievable_by_id_and_invite() {
    let ctx = setup(None).await;
    let created = create_room(&ctx, room_request(" Late night music "))
        .await
        .expect("create");
    assert!(created.room_id.starts_with("room-"));
    assert!(!created.invite_token.is_empty());

    let by_id = get_room(&ctx, &created.room_id).await.expect("by id");
    assert_eq!(by_id.name, "Late night music");
    assert_eq!(by_id.topics, vec!["music"]);

    let by_invite = get_room_by_invite(&ctx, &created.invite_token)
        .await
        .expect("by invite");
    assert_eq!(by_invite.room_id, created.room_id);
}

#[tokio::test]
async fn room_validation_rejects_bad_input() {
    let ctx = setup(None).await;

    let err = create_room(&ctx, room_request("   ")).await.expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut too_many = room_request("ok");
    too_many.max_speakers = 40;
    let err = create_room(&ctx, too_many).await.expect_err("speaker cap");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let ctx = setup(None).await;
    let err = get_room(&ctx, "room-missing").await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}
