//! Row models for the staging layer and the star schema
//!
//! Staging rows are loosely typed; the dimension rows derived from them are
//! built as [`RawRow`]s so that every insert flows through the row formatter.

pub mod staging;
pub mod time;
pub mod value;

pub use staging::{FactCandidate, SONG_PLAY_PAGE, StagingEventRow, StagingSongRow};
pub use time::{START_TIME_FORMAT, TimeRow};
pub use value::{FieldValue, NAN_MARKER, RawRow, field};
