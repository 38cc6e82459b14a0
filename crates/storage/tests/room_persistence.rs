use chrono::{TimeZone, Utc};
use shared::api::CreateRoomRequest;
use storage::Storage;

#[tokio::test]
async fn rooms_survive_reopening_the_database() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("clubspaces_persistence_{suffix}"));
    let db_path = temp_root.join("rooms.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let created_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage
            .create_room(
                "room-night",
                "invite-night",
                &CreateRoomRequest {
                    name: "Late night music".into(),
                    description: Some("lo-fi until sunrise".into()),
                    topics: vec!["music".into(), "lofi".into()],
                    is_public: true,
                    host_id: "hana".into(),
                    host_name: "Hana".into(),
                    max_speakers: 8,
                },
                created_at,
            )
            .await
            .expect("create room");
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let record = reopened
        .get_room_by_invite("invite-night")
        .await
        .expect("lookup")
        .expect("room persisted");
    assert_eq!(record.room_id, "room-night");
    assert_eq!(record.topics, vec!["music".to_string(), "lofi".to_string()]);
    assert_eq!(record.max_speakers, 8);
    assert_eq!(record.created_at, created_at);

    let listed = reopened.list_public_rooms(10).await.expect("list");
    assert_eq!(listed.len(), 1);

    drop(reopened);
    std::fs::remove_dir_all(temp_root).expect("cleanup");
}
