//! Song repository
//!
//! Read-side access to the archive of songs recorded from live channels.
//! The player samples (title, artist) pairs from here to build random
//! playlists; archive commands use it for lookups and search.

use crate::models::Song;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

/// Queries the player and the archive commands need from the song archive
#[async_trait]
pub trait SongRepository: Send + Sync {
    /// Distinct (title, artist) pairs recorded on any of `channels`
    async fn distinct_title_artist(&self, channels: &[String]) -> Result<Vec<(String, String)>>;

    /// Number of distinct (title, artist) pairs recorded on any of `channels`
    async fn count_distinct(&self, channels: &[String]) -> Result<i64>;

    /// One concrete recording of `title` by `artist` on any of `channels`
    async fn find_song(&self, channels: &[String], title: &str, artist: &str)
        -> Result<Option<Song>>;

    /// Song by unique identifier
    async fn song_by_guid(&self, guid: &str) -> Result<Option<Song>>;

    /// Songs whose guid starts with `query` or whose title/artist contains it
    ///
    /// Newest air time first, case-insensitive.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Song>>;

    /// Store a song record (replaces an existing record with the same guid)
    async fn insert_song(&self, song: &Song) -> Result<()>;
}

/// [`SongRepository`] backed by the SQLite `songs` table
#[derive(Clone)]
pub struct SqliteSongRepository {
    pool: SqlitePool,
}

impl SqliteSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SONG_COLUMNS: &str = "guid, title, artist, album, air_time, channel, file_path, image_url";

fn song_from_row(row: &SqliteRow) -> Song {
    Song {
        guid: row.get("guid"),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        air_time: row.get::<DateTime<Utc>, _>("air_time"),
        channel: row.get("channel"),
        file_path: row.get("file_path"),
        image_url: row.get("image_url"),
    }
}

/// Append `channel IN (?, ?, ...)` to `builder`
fn push_channel_filter(builder: &mut QueryBuilder<'_, Sqlite>, channels: &[String]) {
    builder.push("channel IN (");
    let mut separated = builder.separated(", ");
    for channel in channels {
        separated.push_bind(channel.clone());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl SongRepository for SqliteSongRepository {
    async fn distinct_title_artist(&self, channels: &[String]) -> Result<Vec<(String, String)>> {
        if channels.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT DISTINCT title, artist FROM songs WHERE ");
        push_channel_filter(&mut builder, channels);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("title"), row.get("artist")))
            .collect())
    }

    async fn count_distinct(&self, channels: &[String]) -> Result<i64> {
        if channels.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS total FROM (SELECT DISTINCT title, artist FROM songs WHERE ",
        );
        push_channel_filter(&mut builder, channels);
        builder.push(")");

        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.get("total"))
    }

    async fn find_song(
        &self,
        channels: &[String],
        title: &str,
        artist: &str,
    ) -> Result<Option<Song>> {
        if channels.is_empty() {
            return Ok(None);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM songs WHERE ", SONG_COLUMNS));
        push_channel_filter(&mut builder, channels);
        builder
            .push(" AND title = ")
            .push_bind(title.to_string())
            .push(" AND artist = ")
            .push_bind(artist.to_string())
            .push(" LIMIT 1");

        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(song_from_row))
    }

    async fn song_by_guid(&self, guid: &str) -> Result<Option<Song>> {
        let row = sqlx::query(&format!("SELECT {} FROM songs WHERE guid = ?", SONG_COLUMNS))
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(song_from_row))
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Song>> {
        let prefix = format!("{}%", query);
        let contains = format!("%{}%", query.to_lowercase());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM songs
            WHERE guid LIKE ? OR lower(title) LIKE ? OR lower(artist) LIKE ?
            ORDER BY air_time DESC
            LIMIT ?
            "#,
            SONG_COLUMNS
        ))
        .bind(&prefix)
        .bind(&contains)
        .bind(&contains)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(song_from_row).collect())
    }

    async fn insert_song(&self, song: &Song) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO songs (guid, title, artist, album, air_time, channel, file_path, image_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.guid)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.air_time)
        .bind(&song.channel)
        .bind(&song.file_path)
        .bind(&song.image_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
