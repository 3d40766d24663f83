//! Entity loaders for the star schema
//!
//! One insert per row. Song, artist and time inserts never conflict-check:
//! repeats are tolerated and cleaned up by the deduplication pass.
//!
//! Failure policy per table:
//! - `users` and `songplays`: a NOT NULL violation is a recoverable skip
//! - everything else: logged with the statement and fatal

use std::collections::HashSet;

use crate::error::{EtlError, EtlResult};
use crate::format::{format_row, insert_statement};
use crate::models::{FactCandidate, RawRow, StagingEventRow, StagingSongRow, TimeRow};
use crate::warehouse::{Warehouse, WarehouseError};

pub const SONGS_TABLE: &str = "songs";
pub const ARTISTS_TABLE: &str = "artists";
pub const USERS_TABLE: &str = "users";
pub const TIME_TABLE: &str = "time";
pub const SONGPLAYS_TABLE: &str = "songplays";

pub const SONG_COLUMNS: [&str; 5] = ["song_id", "title", "artist_id", "year", "duration"];

pub const ARTIST_COLUMNS: [&str; 5] = ["artist_id", "name", "location", "latitude", "longitude"];

pub const USER_COLUMNS: [&str; 6] = [
    "user_id",
    "first_name",
    "last_name",
    "gender",
    "level",
    "observed_at",
];

pub const TIME_COLUMNS: [&str; 7] = [
    "start_time",
    "hour",
    "day",
    "week",
    "month",
    "year",
    "weekday",
];

pub const SONGPLAY_COLUMNS: [&str; 8] = [
    "time_id",
    "user_id",
    "level",
    "song_id",
    "artist_id",
    "session_id",
    "location",
    "user_agent",
];

/// Result of a single load attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A row was inserted
    Inserted,
    /// Nothing was inserted and the run continues
    Skipped,
}

/// Foreign keys of a fact that has a time anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactKeys {
    pub time_id: i64,
    pub artist_id: Option<String>,
    pub song_id: Option<String>,
}

/// Issues the inserts for every star-schema table
pub struct Loader<'a, W: Warehouse> {
    warehouse: &'a W,
    /// Timestamps already written to `time` during this run
    seen_times: HashSet<i64>,
}

impl<'a, W: Warehouse> Loader<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self {
            warehouse,
            seen_times: HashSet::new(),
        }
    }

    /// Format `row` and insert it into `table`
    ///
    /// The statement travels with the error so callers can log it.
    async fn insert(
        &self,
        table: &str,
        columns: &[&str],
        row: &RawRow,
    ) -> Result<(), (String, WarehouseError)> {
        let statement = insert_statement(table, columns, &format_row(row));
        tracing::trace!("{}", statement);

        match self.warehouse.execute(&statement).await {
            Ok(_) => Ok(()),
            Err(e) => Err((statement, e)),
        }
    }

    /// Insert and treat any failure as fatal
    async fn insert_or_fail(&self, table: &str, columns: &[&str], row: &RawRow) -> EtlResult<()> {
        self.insert(table, columns, row)
            .await
            .map_err(|(statement, source)| {
                tracing::error!("Error on query: {} -- {}", statement, source);
                EtlError::Insert {
                    table: table.to_string(),
                    statement,
                    source,
                }
            })
    }

    /// Insert, skipping on a NOT NULL violation
    async fn insert_or_skip(
        &self,
        table: &str,
        columns: &[&str],
        row: &RawRow,
    ) -> EtlResult<LoadOutcome> {
        match self.insert(table, columns, row).await {
            Ok(()) => Ok(LoadOutcome::Inserted),
            Err((statement, source)) if source.is_not_null_violation() => {
                tracing::warn!("Skipping {} row: {} -- {}", table, source, statement);
                Ok(LoadOutcome::Skipped)
            }
            Err((statement, source)) => {
                tracing::error!("Error on query: {} -- {}", statement, source);
                Err(EtlError::Insert {
                    table: table.to_string(),
                    statement,
                    source,
                })
            }
        }
    }

    pub async fn load_song(&self, song: &StagingSongRow) -> EtlResult<()> {
        self.insert_or_fail(SONGS_TABLE, &SONG_COLUMNS, &song.song_row())
            .await
    }

    pub async fn load_artist(&self, song: &StagingSongRow) -> EtlResult<()> {
        self.insert_or_fail(ARTISTS_TABLE, &ARTIST_COLUMNS, &song.artist_row())
            .await
    }

    /// Insert the user behind an event.
    ///
    /// Anonymous events have no user id and are expected in the stream;
    /// they come back as [`LoadOutcome::Skipped`].
    pub async fn load_user(&self, event: &StagingEventRow) -> EtlResult<LoadOutcome> {
        self.insert_or_skip(USERS_TABLE, &USER_COLUMNS, &event.user_row())
            .await
    }

    /// Insert the time row for a song-play event on first sight of its
    /// timestamp in this run.
    ///
    /// A timestamp that cannot be broken into calendar fields is fatal.
    pub async fn load_time(
        &mut self,
        event: &StagingEventRow,
    ) -> EtlResult<(TimeRow, LoadOutcome)> {
        let time = event
            .time_row()
            .ok_or_else(|| EtlError::MalformedTimestamp(event.ts.to_string()))?;

        if !self.seen_times.insert(time.epoch_millis) {
            return Ok((time, LoadOutcome::Skipped));
        }

        self.insert_or_fail(TIME_TABLE, &TIME_COLUMNS, &time.to_raw_row())
            .await?;
        Ok((time, LoadOutcome::Inserted))
    }

    /// Insert a song-play fact with its resolved keys
    pub async fn load_songplay(
        &self,
        candidate: &FactCandidate,
        keys: &FactKeys,
    ) -> EtlResult<LoadOutcome> {
        if candidate.user_id.is_null_like() {
            tracing::warn!(
                "Skipping songplay at {} without a user",
                candidate.time.start_time_text()
            );
            return Ok(LoadOutcome::Skipped);
        }

        let row = RawRow::from([
            ("time_id".to_string(), keys.time_id.into()),
            ("user_id".to_string(), candidate.user_id.clone()),
            ("level".to_string(), candidate.level.clone()),
            ("song_id".to_string(), keys.song_id.clone().into()),
            ("artist_id".to_string(), keys.artist_id.clone().into()),
            ("session_id".to_string(), candidate.session_id.clone()),
            ("location".to_string(), candidate.location.clone()),
            ("user_agent".to_string(), candidate.user_agent.clone()),
        ]);

        self.insert_or_skip(SONGPLAYS_TABLE, &SONGPLAY_COLUMNS, &row)
            .await
    }
}
