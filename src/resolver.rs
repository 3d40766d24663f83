//! Relationship resolver: natural-key lookups for a fact's foreign keys
//!
//! Each lookup returns at most one row. A key that matches nothing is
//! reported as `None`, never as zero or an empty string.

use crate::error::EtlResult;
use crate::format::format_value;
use crate::loader::FactKeys;
use crate::models::{FactCandidate, FieldValue, TimeRow};
use crate::warehouse::Warehouse;

/// Foreign keys found for a fact candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub time_id: Option<i64>,
    pub artist_id: Option<String>,
    pub song_id: Option<String>,
}

impl ResolvedKeys {
    /// Keys for the fact loader; `None` when there is no time anchor
    pub fn into_fact_keys(self) -> Option<FactKeys> {
        Some(FactKeys {
            time_id: self.time_id?,
            artist_id: self.artist_id,
            song_id: self.song_id,
        })
    }
}

/// Lookup of the time row for one exact timestamp, newest row first
pub fn time_lookup_sql(time: &TimeRow) -> String {
    format!(
        "SELECT time_id FROM time WHERE start_time = CAST({} AS TIMESTAMP) ORDER BY time_id DESC LIMIT 1",
        format_value("start_time", &FieldValue::Text(time.start_time_text()))
    )
}

pub fn artist_lookup_sql(name: &FieldValue) -> String {
    format!(
        "SELECT artist_id FROM artists WHERE name = {} LIMIT 1",
        format_value("name", name)
    )
}

pub fn song_lookup_sql(title: &FieldValue, artist_id: &str) -> String {
    format!(
        "SELECT song_id FROM songs WHERE title = {} AND artist_id = {} LIMIT 1",
        format_value("title", title),
        format_value("artist_id", &FieldValue::from(artist_id))
    )
}

/// Resolves foreign keys against the loaded dimension tables
pub struct RelationshipResolver<'a, W: Warehouse> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse> RelationshipResolver<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Resolve every foreign key of a candidate.
    ///
    /// The song lookup needs the artist, so an unknown artist leaves the song
    /// unresolved as well.
    pub async fn resolve(&self, candidate: &FactCandidate) -> EtlResult<ResolvedKeys> {
        let time_id = self.time_id(&candidate.time).await?;
        let artist_id = self.artist_id(&candidate.artist).await?;
        let song_id = match &artist_id {
            Some(artist_id) => self.song_id(&candidate.song, artist_id).await?,
            None => None,
        };

        Ok(ResolvedKeys {
            time_id,
            artist_id,
            song_id,
        })
    }

    /// Surrogate id of the time row for exactly this timestamp
    pub async fn time_id(&self, time: &TimeRow) -> EtlResult<Option<i64>> {
        let result = self.warehouse.query(&time_lookup_sql(time)).await?;
        Ok(result.first_value("time_id").as_i64())
    }

    pub async fn artist_id(&self, name: &FieldValue) -> EtlResult<Option<String>> {
        if name.is_null_like() {
            return Ok(None);
        }
        let result = self.warehouse.query(&artist_lookup_sql(name)).await?;
        Ok(text_key(result.first_value("artist_id")))
    }

    pub async fn song_id(&self, title: &FieldValue, artist_id: &str) -> EtlResult<Option<String>> {
        if title.is_null_like() {
            return Ok(None);
        }
        let result = self.warehouse.query(&song_lookup_sql(title, artist_id)).await?;
        Ok(text_key(result.first_value("song_id")))
    }
}

fn text_key(value: FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        other => Some(other.to_string()),
    }
}
