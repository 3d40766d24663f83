//! Staging step: bulk copy into the staging tables and typed readers over them

use crate::config::{BackendType, StagingSection};
use crate::error::{EtlError, EtlResult};
use crate::models::{StagingEventRow, StagingSongRow};
use crate::warehouse::Warehouse;

/// Reads the song catalog with snake_case aliases and floating-point decimals
pub const SELECT_STAGING_SONGS: &str = "SELECT num_songs, song_id, title, artist_id, artist_name, \
     artist_location, \
     CAST(artist_latitude AS DOUBLE PRECISION) AS artist_latitude, \
     CAST(artist_longitude AS DOUBLE PRECISION) AS artist_longitude, \
     CAST(duration AS DOUBLE PRECISION) AS duration, \
     year \
     FROM staging_songs";

/// Reads listening events in timestamp order
pub const SELECT_STAGING_EVENTS: &str = "SELECT artist, auth, firstName AS first_name, gender, \
     itemInSession AS item_in_session, lastName AS last_name, \
     CAST(length AS DOUBLE PRECISION) AS length, \
     level, location, method, page, registration, sessionId AS session_id, song, status, ts, \
     userAgent AS user_agent, userId AS user_id \
     FROM staging_events \
     ORDER BY ts";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Bulk-copy statements for the configured sources
///
/// Empty when the backend has no bulk-copy path (PostgreSQL) or when no
/// source is configured.
pub fn copy_statements(staging: &StagingSection, backend: BackendType) -> Vec<String> {
    let mut statements = Vec::new();

    match backend {
        BackendType::Redshift => {
            let credentials = staging
                .iam_role_arn
                .as_deref()
                .map(|arn| quote(&format!("aws_iam_role={}", arn)))
                .unwrap_or_else(|| "''".to_string());

            if let Some(source) = &staging.log_data {
                let json_path = staging.log_json_path.as_deref().unwrap_or("auto");
                statements.push(format!(
                    "COPY staging_events FROM {} CREDENTIALS {} JSON {} REGION {};",
                    quote(source),
                    credentials,
                    quote(json_path),
                    quote(&staging.region)
                ));
            }
            if let Some(source) = &staging.song_data {
                statements.push(format!(
                    "COPY staging_songs FROM {} CREDENTIALS {} JSON 'auto' REGION {};",
                    quote(source),
                    credentials,
                    quote(&staging.region)
                ));
            }
        }
        BackendType::DuckDb => {
            if let Some(source) = &staging.log_data {
                statements.push(format!(
                    "INSERT INTO staging_events BY NAME SELECT * FROM read_json_auto({});",
                    quote(source)
                ));
            }
            if let Some(source) = &staging.song_data {
                statements.push(format!(
                    "INSERT INTO staging_songs BY NAME SELECT * FROM read_json_auto({});",
                    quote(source)
                ));
            }
        }
        BackendType::Postgres => {}
    }

    statements
}

/// Run the bulk copy into the staging tables
///
/// # Returns
/// Number of copy statements executed
pub async fn load_staging<W: Warehouse>(
    warehouse: &W,
    staging: &StagingSection,
) -> EtlResult<usize> {
    let backend = warehouse.backend_type();

    if !staging.has_sources() {
        tracing::info!("No staging sources configured, using staging tables as they are");
        return Ok(0);
    }
    if backend == BackendType::Postgres {
        tracing::info!("Staging tables on postgres are populated externally, skipping copy");
        return Ok(0);
    }

    let statements = copy_statements(staging, backend);
    for statement in &statements {
        tracing::info!("Copying into staging: {}", statement);
        warehouse.execute(statement).await.map_err(|e| {
            tracing::error!("Staging copy failed: {} -- {}", e, statement);
            EtlError::Staging(format!("{} ({})", e, statement))
        })?;
    }

    Ok(statements.len())
}

/// Read every song-catalog row
pub async fn read_staging_songs<W: Warehouse>(warehouse: &W) -> EtlResult<Vec<StagingSongRow>> {
    let result = warehouse.query(SELECT_STAGING_SONGS).await?;
    tracing::debug!(
        "Read {} staging song rows in {}ms",
        result.row_count(),
        result.execution_time_ms
    );
    Ok(result.rows.iter().map(StagingSongRow::from_raw).collect())
}

/// Read every listening event, oldest first
pub async fn read_staging_events<W: Warehouse>(warehouse: &W) -> EtlResult<Vec<StagingEventRow>> {
    let result = warehouse.query(SELECT_STAGING_EVENTS).await?;
    tracing::debug!(
        "Read {} staging event rows in {}ms",
        result.row_count(),
        result.execution_time_ms
    );
    Ok(result.rows.iter().map(StagingEventRow::from_raw).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_sources() -> StagingSection {
        StagingSection {
            log_data: Some("s3://udacity-dend/log_data".to_string()),
            log_json_path: Some("s3://udacity-dend/log_json_path.json".to_string()),
            song_data: Some("s3://udacity-dend/song_data".to_string()),
            iam_role_arn: Some("arn:aws:iam::123456789012:role/dwhRole".to_string()),
            region: "us-west-2".to_string(),
        }
    }

    #[test]
    fn test_redshift_copy_statements() {
        let statements = copy_statements(&s3_sources(), BackendType::Redshift);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "COPY staging_events FROM 's3://udacity-dend/log_data' \
             CREDENTIALS 'aws_iam_role=arn:aws:iam::123456789012:role/dwhRole' \
             JSON 's3://udacity-dend/log_json_path.json' REGION 'us-west-2';"
        );
        assert!(statements[1].contains("JSON 'auto'"));
    }

    #[test]
    fn test_duckdb_copy_statements() {
        let staging = StagingSection {
            log_data: Some("data/log_data/*.json".to_string()),
            song_data: Some("data/song_data/**/*.json".to_string()),
            ..Default::default()
        };
        let statements = copy_statements(&staging, BackendType::DuckDb);
        assert_eq!(
            statements,
            vec![
                "INSERT INTO staging_events BY NAME SELECT * FROM read_json_auto('data/log_data/*.json');",
                "INSERT INTO staging_songs BY NAME SELECT * FROM read_json_auto('data/song_data/**/*.json');",
            ]
        );
    }

    #[test]
    fn test_postgres_has_no_copy() {
        assert!(copy_statements(&s3_sources(), BackendType::Postgres).is_empty());
    }

    #[test]
    fn test_source_quotes_escaped() {
        let staging = StagingSection {
            song_data: Some("it's/*.json".to_string()),
            ..Default::default()
        };
        let statements = copy_statements(&staging, BackendType::DuckDb);
        assert!(statements[0].contains("'it''s/*.json'"));
    }
}
