//! Orchestrator: drives a full ETL run against one warehouse
//!
//! The run is a linear state machine with fail-fast semantics:
//!
//! ```text
//! Idle -> StagingLoaded -> DimensionsLoaded -> FactsLoaded -> Deduplicated -> Done
//! ```
//!
//! A failing step halts the run in the state it had reached. Nothing is rolled
//! back across steps and there is no automatic resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::dedup::{DedupStats, Deduplicator};
use crate::error::{EtlError, EtlResult};
use crate::loader::{LoadOutcome, Loader};
use crate::models::{FactCandidate, StagingEventRow};
use crate::resolver::RelationshipResolver;
use crate::staging;
use crate::warehouse::{Warehouse, WarehouseError, WarehouseSchema};

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    StagingLoaded,
    DimensionsLoaded,
    FactsLoaded,
    Deduplicated,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::StagingLoaded => "staging_loaded",
            RunState::DimensionsLoaded => "dimensions_loaded",
            RunState::FactsLoaded => "facts_loaded",
            RunState::Deduplicated => "deduplicated",
            RunState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// What happened to one fact candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactOutcome {
    /// A songplay row was inserted
    Loaded,
    /// The insert was skipped (no user)
    Skipped,
    /// No time row matched, the fact loader was never invoked
    Unanchored,
}

/// Result of an ETL run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Last state reached
    pub state: RunState,
    /// Bulk-copy statements executed
    pub staging_copies: usize,
    pub staging_songs_read: usize,
    pub staging_events_read: usize,
    pub songs_loaded: usize,
    pub artists_loaded: usize,
    pub users_loaded: usize,
    /// Users skipped on a NOT NULL violation (anonymous sessions)
    pub users_skipped: usize,
    pub time_rows_loaded: usize,
    pub songplays_loaded: usize,
    pub songplays_skipped: usize,
    /// Song plays dropped because no time row matched
    pub songplays_unanchored: usize,
    pub dedup: Vec<DedupStats>,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: RunState::Idle,
            staging_copies: 0,
            staging_songs_read: 0,
            staging_events_read: 0,
            songs_loaded: 0,
            artists_loaded: 0,
            users_loaded: 0,
            users_skipped: 0,
            time_rows_loaded: 0,
            songplays_loaded: 0,
            songplays_skipped: 0,
            songplays_unanchored: 0,
            dedup: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Duplicate rows removed across all tables
    pub fn duplicates_removed(&self) -> u64 {
        self.dedup.iter().map(|s| s.rows_removed).sum()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the ETL steps in order against one warehouse
///
/// Owns the warehouse connection for the whole run and lends it to each
/// component in turn.
pub struct Orchestrator<W: Warehouse> {
    warehouse: W,
    config: EtlConfig,
    state: RunState,
}

impl<W: Warehouse> Orchestrator<W> {
    pub fn new(warehouse: W, config: EtlConfig) -> Self {
        Self {
            warehouse,
            config,
            state: RunState::Idle,
        }
    }

    /// Get reference to the warehouse
    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// State reached by the most recent run
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Create any missing staging and star-schema tables
    pub async fn ensure_schema(&self) -> EtlResult<()> {
        for ddl in WarehouseSchema::create_tables_sql(self.warehouse.backend_type()) {
            self.execute_ddl(&ddl).await?;
        }
        Ok(())
    }

    /// Drop every table and create it again
    pub async fn reset_schema(&self) -> EtlResult<()> {
        let backend = self.warehouse.backend_type();
        tracing::info!("Resetting {} warehouse schema", backend);

        for ddl in WarehouseSchema::drop_tables_sql(backend) {
            self.execute_ddl(&ddl).await?;
        }
        self.ensure_schema().await
    }

    async fn execute_ddl(&self, ddl: &str) -> EtlResult<()> {
        self.warehouse.execute_batch(ddl).await.map_err(|e| {
            tracing::error!("Error on query: {} -- {}", ddl, e);
            EtlError::Warehouse(e)
        })
    }

    /// Run every step to completion or to the first fatal error
    pub async fn run(&mut self) -> EtlResult<RunReport> {
        let start = std::time::Instant::now();
        let mut report = RunReport::new();
        self.state = RunState::Idle;

        tracing::info!(
            "Starting ETL run {} at {} against {}",
            report.run_id,
            report.started_at,
            self.warehouse.backend_type()
        );

        let result = self.run_steps(&mut report).await;
        report.state = self.state;
        report.duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                tracing::info!(
                    "ETL run {} finished in {}ms: {} songplays loaded, {} duplicates removed",
                    report.run_id,
                    report.duration_ms,
                    report.songplays_loaded,
                    report.duplicates_removed()
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    "ETL run {} halted in state {} ({}): {}",
                    report.run_id,
                    self.state,
                    e.class(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Run only the deduplication pass
    pub async fn run_dedup_only(&mut self) -> EtlResult<Vec<DedupStats>> {
        let stats = Deduplicator::new(&self.warehouse).deduplicate_all().await?;
        self.advance(RunState::Deduplicated);
        Ok(stats)
    }

    async fn run_steps(&mut self, report: &mut RunReport) -> EtlResult<()> {
        if !self.warehouse.health_check().await? {
            return Err(WarehouseError::ConnectionFailed("Health check failed".to_string()).into());
        }
        self.ensure_schema().await?;

        report.staging_copies = staging::load_staging(&self.warehouse, &self.config.staging).await?;
        self.advance(RunState::StagingLoaded);

        let events = self.load_dimensions(report).await?;
        self.advance(RunState::DimensionsLoaded);

        self.load_facts(&events, report).await?;
        self.advance(RunState::FactsLoaded);

        report.dedup = Deduplicator::new(&self.warehouse).deduplicate_all().await?;
        self.advance(RunState::Deduplicated);

        self.advance(RunState::Done);
        Ok(())
    }

    fn advance(&mut self, state: RunState) {
        tracing::debug!("Run state {} -> {}", self.state, state);
        self.state = state;
    }

    /// Load songs, artists, users and time rows; returns the staged events
    /// for the fact step
    async fn load_dimensions(&self, report: &mut RunReport) -> EtlResult<Vec<StagingEventRow>> {
        let mut loader = Loader::new(&self.warehouse);

        let songs = staging::read_staging_songs(&self.warehouse).await?;
        report.staging_songs_read = songs.len();
        tracing::info!("Loading songs and artists from {} staging rows", songs.len());
        for song in &songs {
            loader.load_song(song).await?;
            report.songs_loaded += 1;
            loader.load_artist(song).await?;
            report.artists_loaded += 1;
        }

        let events = staging::read_staging_events(&self.warehouse).await?;
        report.staging_events_read = events.len();
        tracing::info!("Loading users and time from {} staging events", events.len());
        for event in &events {
            match loader.load_user(event).await? {
                LoadOutcome::Inserted => report.users_loaded += 1,
                LoadOutcome::Skipped => report.users_skipped += 1,
            }

            if event.is_song_play()
                && loader.load_time(event).await?.1 == LoadOutcome::Inserted
            {
                report.time_rows_loaded += 1;
            }
        }

        Ok(events)
    }

    async fn load_facts(
        &self,
        events: &[StagingEventRow],
        report: &mut RunReport,
    ) -> EtlResult<()> {
        tracing::info!("Loading songplays");

        for event in events.iter().filter(|e| e.is_song_play()) {
            let time = event
                .time_row()
                .ok_or_else(|| EtlError::MalformedTimestamp(event.ts.to_string()))?;
            let Some(candidate) = event.fact_candidate(time) else {
                continue;
            };

            match self.load_fact(&candidate).await? {
                FactOutcome::Loaded => report.songplays_loaded += 1,
                FactOutcome::Skipped => report.songplays_skipped += 1,
                FactOutcome::Unanchored => report.songplays_unanchored += 1,
            }
        }

        Ok(())
    }

    /// Resolve and load a single fact candidate
    pub async fn load_fact(&self, candidate: &FactCandidate) -> EtlResult<FactOutcome> {
        let resolved = RelationshipResolver::new(&self.warehouse)
            .resolve(candidate)
            .await?;

        let Some(keys) = resolved.into_fact_keys() else {
            tracing::warn!(
                "Dropping songplay at {}: no time row matches",
                candidate.time.start_time_text()
            );
            return Ok(FactOutcome::Unanchored);
        };

        let outcome = Loader::new(&self.warehouse)
            .load_songplay(candidate, &keys)
            .await?;
        Ok(match outcome {
            LoadOutcome::Inserted => FactOutcome::Loaded,
            LoadOutcome::Skipped => FactOutcome::Skipped,
        })
    }
}
