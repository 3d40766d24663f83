//! Shared fixtures for the warehouse integration tests

#![allow(dead_code)]

use songplay_warehouse::config::{BackendType, EtlConfig};
use songplay_warehouse::models::FieldValue;
use songplay_warehouse::orchestrator::Orchestrator;
use songplay_warehouse::warehouse::{DuckDbWarehouse, Warehouse, WarehouseSchema};

/// 2018-11-12 02:36:57.796 UTC
pub const TS_FIRST: i64 = 1541990217796;
/// 2018-11-15 16:23:01.796 UTC
pub const TS_LATER: i64 = 1542298981796;

/// In-memory warehouse with every table created
pub async fn warehouse() -> DuckDbWarehouse {
    let warehouse = DuckDbWarehouse::in_memory().unwrap();
    for ddl in WarehouseSchema::create_tables_sql(BackendType::DuckDb) {
        warehouse.execute_batch(&ddl).await.unwrap();
    }
    warehouse
}

/// Orchestrator over a fresh in-memory warehouse, with no staging sources
pub async fn orchestrator() -> Orchestrator<DuckDbWarehouse> {
    Orchestrator::new(warehouse().await, EtlConfig::duckdb(":memory:"))
}

fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Stage one song-catalog entry
pub async fn stage_song<W: Warehouse>(
    warehouse: &W,
    song_id: &str,
    title: &str,
    artist_id: &str,
    artist_name: &str,
    year: i64,
    duration: &str,
) {
    let sql = format!(
        "INSERT INTO staging_songs (num_songs, artist_id, artist_latitude, artist_longitude, \
         artist_location, artist_name, song_id, title, duration, year) \
         VALUES (1, {}, NULL, NULL, 'Los Angeles, CA', {}, {}, {}, {}, {})",
        sql_text(artist_id),
        sql_text(artist_name),
        sql_text(song_id),
        sql_text(title),
        duration,
        year
    );
    warehouse.execute(&sql).await.unwrap();
}

/// A listening event waiting to be staged
#[derive(Debug, Clone)]
pub struct Event {
    pub artist: Option<String>,
    pub song: Option<String>,
    pub page: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub level: String,
    pub ts: i64,
    pub session_id: i64,
}

impl Event {
    pub fn play(artist: &str, song: &str, user_id: &str, level: &str, ts: i64) -> Self {
        Self {
            artist: Some(artist.to_string()),
            song: Some(song.to_string()),
            page: "NextSong".to_string(),
            user_id: user_id.to_string(),
            first_name: "Ryan".to_string(),
            last_name: "Smith".to_string(),
            level: level.to_string(),
            ts,
            session_id: 583,
        }
    }

    pub fn page(page: &str, user_id: &str, ts: i64) -> Self {
        Self {
            artist: None,
            song: None,
            page: page.to_string(),
            ..Self::play("", "", user_id, "free", ts)
        }
    }
}

fn sql_opt(value: &Option<String>) -> String {
    value.as_deref().map(sql_text).unwrap_or_else(|| "NULL".to_string())
}

/// Stage one listening event
pub async fn stage_event<W: Warehouse>(warehouse: &W, event: &Event) {
    let sql = format!(
        "INSERT INTO staging_events (artist, auth, firstName, gender, itemInSession, lastName, \
         length, level, location, method, page, registration, sessionId, song, status, ts, \
         userAgent, userId) \
         VALUES ({}, 'Logged In', {}, 'M', 0, {}, 237.0, {}, 'San Jose-Sunnyvale-Santa Clara, CA', \
         'PUT', {}, '1540992000000', {}, {}, 200, {}, 'Mozilla/5.0', {})",
        sql_opt(&event.artist),
        sql_text(&event.first_name),
        sql_text(&event.last_name),
        sql_text(&event.level),
        sql_text(&event.page),
        event.session_id,
        sql_opt(&event.song),
        event.ts,
        sql_text(&event.user_id)
    );
    warehouse.execute(&sql).await.unwrap();
}

/// Row count of a table
pub async fn count<W: Warehouse>(warehouse: &W, table: &str) -> i64 {
    warehouse
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .await
        .unwrap()
        .scalar_i64()
        .unwrap()
}

/// First value of a single-column query
pub async fn single<W: Warehouse>(warehouse: &W, sql: &str, column: &str) -> FieldValue {
    warehouse.query(sql).await.unwrap().first_value(column)
}
