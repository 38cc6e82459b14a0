use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::api::{CreateRoomRequest, RoomRecord};

/// SQLite-backed room directory.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

const ROOM_COLUMNS: &str = "room_id, name, description, topics_json, is_public, host_id, \
                            host_name, max_speakers, invite_token, created_at";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_room(
        &self,
        room_id: &str,
        invite_token: &str,
        request: &CreateRoomRequest,
        created_at: DateTime<Utc>,
    ) -> Result<RoomRecord> {
        let topics_json =
            serde_json::to_string(&request.topics).context("failed to encode room topics")?;

        sqlx::query(
            "INSERT INTO rooms (room_id, name, description, topics_json, is_public, host_id,
                                host_name, max_speakers, invite_token, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&topics_json)
        .bind(request.is_public)
        .bind(&request.host_id)
        .bind(&request.host_name)
        .bind(i64::from(request.max_speakers))
        .bind(invite_token)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert room '{room_id}'"))?;

        Ok(RoomRecord {
            room_id: room_id.to_string(),
            name: request.name.clone(),
            description: request.description.clone(),
            topics: request.topics.clone(),
            is_public: request.is_public,
            host_id: request.host_id.clone(),
            host_name: request.host_name.clone(),
            max_speakers: request.max_speakers,
            invite_token: invite_token.to_string(),
            created_at,
        })
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>> {
        let row = sqlx::query(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE room_id = ?"))
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| room_from_row(&row)).transpose()
    }

    pub async fn get_room_by_invite(&self, invite_token: &str) -> Result<Option<RoomRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE invite_token = ?"
        ))
        .bind(invite_token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| room_from_row(&row)).transpose()
    }

    pub async fn list_public_rooms(&self, limit: u32) -> Result<Vec<RoomRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE is_public = 1
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(room_from_row).collect()
    }
}

fn room_from_row(row: &SqliteRow) -> Result<RoomRecord> {
    let topics_json: String = row.try_get("topics_json")?;
    let topics = serde_json::from_str(&topics_json).context("stored room topics are invalid")?;
    let max_speakers: i64 = row.try_get("max_speakers")?;

    Ok(RoomRecord {
        room_id: row.try_get("room_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        topics,
        is_public: row.try_get("is_public")?,
        host_id: row.try_get("host_id")?,
        host_name: row.try_get("host_name")?,
        max_speakers: u32::try_from(max_speakers).context("stored max_speakers out of range")?,
        invite_token: row.try_get("invite_token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
