//! Typed views over staging rows
//!
//! The staging readers return loosely-typed [`RawRow`]s keyed by snake_case
//! column aliases. These types pick the columns each loader needs and project
//! them onto the star-schema column names.

use serde::{Deserialize, Serialize};

use super::time::TimeRow;
use super::value::{FieldValue, RawRow, field};

/// Page value marking a song-play event; only these become facts
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// One song-catalog entry from `staging_songs`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingSongRow {
    pub num_songs: FieldValue,
    pub song_id: FieldValue,
    pub title: FieldValue,
    pub artist_id: FieldValue,
    pub artist_name: FieldValue,
    pub artist_location: FieldValue,
    pub artist_latitude: FieldValue,
    pub artist_longitude: FieldValue,
    pub duration: FieldValue,
    pub year: FieldValue,
}

impl StagingSongRow {
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            num_songs: field(row, "num_songs"),
            song_id: field(row, "song_id"),
            title: field(row, "title"),
            artist_id: field(row, "artist_id"),
            artist_name: field(row, "artist_name"),
            artist_location: field(row, "artist_location"),
            artist_latitude: field(row, "artist_latitude"),
            artist_longitude: field(row, "artist_longitude"),
            duration: field(row, "duration"),
            year: field(row, "year"),
        }
    }

    /// Columns of the `songs` dimension
    pub fn song_row(&self) -> RawRow {
        RawRow::from([
            ("song_id".to_string(), self.song_id.clone()),
            ("title".to_string(), self.title.clone()),
            ("artist_id".to_string(), self.artist_id.clone()),
            ("year".to_string(), self.year.clone()),
            ("duration".to_string(), self.duration.clone()),
        ])
    }

    /// Columns of the `artists` dimension
    pub fn artist_row(&self) -> RawRow {
        RawRow::from([
            ("artist_id".to_string(), self.artist_id.clone()),
            ("name".to_string(), self.artist_name.clone()),
            ("location".to_string(), self.artist_location.clone()),
            ("latitude".to_string(), self.artist_latitude.clone()),
            ("longitude".to_string(), self.artist_longitude.clone()),
        ])
    }
}

/// One listening-session event from `staging_events`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingEventRow {
    pub artist: FieldValue,
    pub auth: FieldValue,
    pub first_name: FieldValue,
    pub gender: FieldValue,
    pub item_in_session: FieldValue,
    pub last_name: FieldValue,
    pub length: FieldValue,
    pub level: FieldValue,
    pub location: FieldValue,
    pub method: FieldValue,
    pub page: FieldValue,
    pub registration: FieldValue,
    pub session_id: FieldValue,
    pub song: FieldValue,
    pub status: FieldValue,
    pub ts: FieldValue,
    pub user_agent: FieldValue,
    pub user_id: FieldValue,
}

impl StagingEventRow {
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            artist: field(row, "artist"),
            auth: field(row, "auth"),
            first_name: field(row, "first_name"),
            gender: field(row, "gender"),
            item_in_session: field(row, "item_in_session"),
            last_name: field(row, "last_name"),
            length: field(row, "length"),
            level: field(row, "level"),
            location: field(row, "location"),
            method: field(row, "method"),
            page: field(row, "page"),
            registration: field(row, "registration"),
            session_id: field(row, "session_id"),
            song: field(row, "song"),
            status: field(row, "status"),
            ts: field(row, "ts"),
            user_agent: field(row, "user_agent"),
            user_id: field(row, "user_id"),
        }
    }

    /// True when this event is a song play and may become a fact
    pub fn is_song_play(&self) -> bool {
        self.page.as_str() == Some(SONG_PLAY_PAGE)
    }

    /// Event timestamp in epoch milliseconds, if it is a well-formed integer
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.ts.as_i64()
    }

    /// Calendar breakdown of the event timestamp
    pub fn time_row(&self) -> Option<TimeRow> {
        self.timestamp_millis().and_then(TimeRow::from_epoch_millis)
    }

    /// User id with blank strings treated as absent and numeric text as an integer
    pub fn user_key(&self) -> FieldValue {
        match self.user_id.clone().blank_as_null() {
            FieldValue::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .unwrap_or(FieldValue::Text(text)),
            other => other,
        }
    }

    /// Columns of the `users` dimension, stamped with the event time
    pub fn user_row(&self) -> RawRow {
        RawRow::from([
            ("user_id".to_string(), self.user_key()),
            ("first_name".to_string(), self.first_name.clone()),
            ("last_name".to_string(), self.last_name.clone()),
            ("gender".to_string(), self.gender.clone()),
            ("level".to_string(), self.level.clone()),
            ("observed_at".to_string(), self.timestamp_millis().into()),
        ])
    }

    /// Fact candidate for a song-play event; `None` for any other page
    pub fn fact_candidate(&self, time: TimeRow) -> Option<FactCandidate> {
        if !self.is_song_play() {
            return None;
        }

        Some(FactCandidate {
            artist: self.artist.clone(),
            song: self.song.clone(),
            user_id: self.user_key(),
            level: self.level.clone(),
            session_id: self.session_id.clone(),
            location: self.location.clone(),
            user_agent: self.user_agent.clone(),
            time,
        })
    }
}

/// A song-play event waiting for its foreign keys to be resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    /// Artist name as reported by the player
    pub artist: FieldValue,
    /// Song title as reported by the player
    pub song: FieldValue,
    pub user_id: FieldValue,
    pub level: FieldValue,
    pub session_id: FieldValue,
    pub location: FieldValue,
    pub user_agent: FieldValue,
    /// Time bucket of the event
    pub time: TimeRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(page: &str) -> RawRow {
        RawRow::from([
            ("artist".to_string(), FieldValue::from("Thundercat")),
            ("song".to_string(), FieldValue::from("Fair Chance")),
            ("page".to_string(), FieldValue::from(page)),
            ("ts".to_string(), FieldValue::Integer(1541990217796)),
            ("user_id".to_string(), FieldValue::Integer(26)),
            ("first_name".to_string(), FieldValue::from("Ryan")),
            ("level".to_string(), FieldValue::from("free")),
        ])
    }

    #[test]
    fn test_song_row_projection() {
        let raw = RawRow::from([
            ("song_id".to_string(), FieldValue::from("S1")),
            ("title".to_string(), FieldValue::from("Fair Chance")),
            ("artist_id".to_string(), FieldValue::from("A1")),
            ("artist_name".to_string(), FieldValue::from("Thundercat")),
            ("year".to_string(), FieldValue::Integer(2020)),
            ("duration".to_string(), FieldValue::Float(237.0)),
        ]);
        let song = StagingSongRow::from_raw(&raw);

        let row = song.song_row();
        assert_eq!(row.len(), 5);
        assert_eq!(row["year"], FieldValue::Integer(2020));

        let artist = song.artist_row();
        assert_eq!(artist["name"], FieldValue::from("Thundercat"));
        assert_eq!(artist["latitude"], FieldValue::Null);
    }

    #[test]
    fn test_only_next_song_is_fact() {
        let play = StagingEventRow::from_raw(&event(SONG_PLAY_PAGE));
        let home = StagingEventRow::from_raw(&event("Home"));
        let time = play.time_row().unwrap();

        assert!(play.fact_candidate(time.clone()).is_some());
        assert!(home.fact_candidate(time).is_none());
    }

    #[test]
    fn test_user_row_blank_id() {
        let mut raw = event(SONG_PLAY_PAGE);
        raw.insert("user_id".to_string(), FieldValue::from(""));
        let row = StagingEventRow::from_raw(&raw).user_row();
        assert_eq!(row["user_id"], FieldValue::Null);
        assert_eq!(row["observed_at"], FieldValue::Integer(1541990217796));
    }

    #[test]
    fn test_user_key_from_text() {
        let mut raw = event(SONG_PLAY_PAGE);
        raw.insert("user_id".to_string(), FieldValue::from("26"));
        assert_eq!(StagingEventRow::from_raw(&raw).user_key(), FieldValue::Integer(26));
    }

    #[test]
    fn test_malformed_timestamp() {
        let mut raw = event(SONG_PLAY_PAGE);
        raw.insert("ts".to_string(), FieldValue::from("yesterday"));
        let row = StagingEventRow::from_raw(&raw);
        assert!(row.timestamp_millis().is_none());
        assert!(row.time_row().is_none());
    }
}
