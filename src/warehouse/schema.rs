//! Warehouse schema definitions
//!
//! DDL for the two staging tables and the star schema, per SQL dialect.
//! Redshift gets identity columns and distribution hints; PostgreSQL and
//! DuckDB draw surrogate ids from sequences instead.
//!
//! Natural keys are never enforced as unique on the local dialects: rows are
//! inserted first and duplicates are removed by the deduplication pass.

use crate::config::BackendType;

/// Tables in creation order
pub const ALL_TABLES: [&str; 7] = [
    "staging_events",
    "staging_songs",
    "songplays",
    "users",
    "songs",
    "artists",
    "time",
];

/// Sequences backing surrogate ids outside Redshift
pub const SEQUENCES: [&str; 2] = ["time_id_seq", "songplay_id_seq"];

/// Warehouse schema helper
pub struct WarehouseSchema;

impl WarehouseSchema {
    /// One `CREATE` statement per table (and sequence) for `backend`
    pub fn create_tables_sql(backend: BackendType) -> Vec<String> {
        let mut statements = Vec::new();

        if backend != BackendType::Redshift {
            for sequence in SEQUENCES {
                statements.push(format!("CREATE SEQUENCE IF NOT EXISTS {} START 1;", sequence));
            }
        }

        statements.push(Self::staging_events(backend));
        statements.push(STAGING_SONGS.to_string());
        statements.push(Self::songplays(backend));
        statements.push(Self::users(backend));
        statements.push(Self::songs(backend));
        statements.push(Self::artists(backend));
        statements.push(Self::time(backend));
        statements
    }

    /// One `DROP` statement per table, sequences last
    pub fn drop_tables_sql(backend: BackendType) -> Vec<String> {
        let mut statements: Vec<String> = ALL_TABLES
            .iter()
            .map(|table| format!("DROP TABLE IF EXISTS {};", table))
            .collect();

        if backend != BackendType::Redshift {
            for sequence in SEQUENCES {
                statements.push(format!("DROP SEQUENCE IF EXISTS {};", sequence));
            }
        }
        statements
    }

    fn staging_events(backend: BackendType) -> String {
        // Anonymous sessions carry an empty user id; only Redshift's COPY maps it to NULL
        let user_id_type = match backend {
            BackendType::Redshift => "BIGINT",
            _ => "VARCHAR",
        };

        format!(
            r#"CREATE TABLE IF NOT EXISTS staging_events (
    artist          TEXT,
    auth            TEXT,
    firstName       TEXT,
    gender          CHAR,
    itemInSession   INTEGER,
    lastName        TEXT,
    length          DECIMAL(9, 5),
    level           TEXT,
    location        TEXT,
    method          TEXT,
    page            TEXT,
    registration    VARCHAR(15),
    sessionId       INTEGER,
    song            TEXT,
    status          INTEGER,
    ts              BIGINT,
    userAgent       TEXT,
    userId          {user_id_type}
);"#
        )
    }

    fn songplays(backend: BackendType) -> String {
        match backend {
            BackendType::Redshift => r#"CREATE TABLE IF NOT EXISTS songplays (
    songplay_id     BIGINT          IDENTITY(0,1),
    time_id         BIGINT          NOT NULL,
    user_id         BIGINT          NOT NULL,
    level           TEXT            NOT NULL,
    song_id         TEXT,
    artist_id       TEXT,
    session_id      INTEGER,
    location        TEXT,
    user_agent      TEXT,
    primary key(songplay_id)
)
distkey(songplay_id)
sortkey(time_id);"#
                .to_string(),
            _ => r#"CREATE TABLE IF NOT EXISTS songplays (
    songplay_id     BIGINT          DEFAULT nextval('songplay_id_seq'),
    time_id         BIGINT          NOT NULL,
    user_id         BIGINT          NOT NULL,
    level           TEXT            NOT NULL,
    song_id         TEXT,
    artist_id       TEXT,
    session_id      INTEGER,
    location        TEXT,
    user_agent      TEXT
);"#
            .to_string(),
        }
    }

    fn users(backend: BackendType) -> String {
        let columns = r#"    user_id         BIGINT          NOT NULL,
    first_name      TEXT            NOT NULL,
    last_name       TEXT            NOT NULL,
    gender          CHAR,
    level           TEXT            NOT NULL,
    observed_at     BIGINT"#;

        match backend {
            BackendType::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS users (\n{},\n    primary key(user_id)\n)\ndistkey(user_id)\nsortkey(last_name);",
                columns
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS users (\n{}\n);", columns),
        }
    }

    fn songs(backend: BackendType) -> String {
        let columns = r#"    song_id         TEXT            NOT NULL,
    title           TEXT            NOT NULL,
    artist_id       TEXT            NOT NULL,
    year            INTEGER,
    duration        DOUBLE PRECISION NOT NULL"#;

        match backend {
            BackendType::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS songs (\n{},\n    primary key(song_id)\n)\ndistkey(song_id)\nsortkey(title);",
                columns
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS songs (\n{}\n);", columns),
        }
    }

    fn artists(backend: BackendType) -> String {
        let columns = r#"    artist_id       TEXT            NOT NULL,
    name            TEXT            NOT NULL,
    location        TEXT,
    latitude        DECIMAL(5, 2),
    longitude       DECIMAL(5, 2)"#;

        match backend {
            BackendType::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS artists (\n{},\n    primary key(artist_id)\n)\ndistkey(artist_id)\nsortkey(name);",
                columns
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS artists (\n{}\n);", columns),
        }
    }

    fn time(backend: BackendType) -> String {
        let surrogate = match backend {
            BackendType::Redshift => "BIGINT          IDENTITY(0,1)",
            _ => "BIGINT          DEFAULT nextval('time_id_seq')",
        };
        let columns = format!(
            r#"    time_id         {surrogate},
    start_time      TIMESTAMP       NOT NULL,
    hour            INTEGER         NOT NULL,
    day             INTEGER         NOT NULL,
    week            INTEGER         NOT NULL,
    month           INTEGER         NOT NULL,
    year            INTEGER         NOT NULL,
    weekday         INTEGER         NOT NULL"#
        );

        match backend {
            BackendType::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS time (\n{},\n    primary key(time_id)\n)\ndistkey(month)\nsortkey(start_time);",
                columns
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS time (\n{}\n);", columns),
        }
    }
}

const STAGING_SONGS: &str = r#"CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs           INTEGER,
    artist_id           TEXT,
    artist_latitude     DECIMAL(5, 2),
    artist_longitude    DECIMAL(5, 2),
    artist_location     VARCHAR(512),
    artist_name         VARCHAR(512),
    song_id             TEXT,
    title               VARCHAR(512),
    duration            DECIMAL(9, 5),
    year                INTEGER
);"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redshift_schema_has_distribution_hints() {
        let ddl = WarehouseSchema::create_tables_sql(BackendType::Redshift).join("\n");
        assert!(ddl.contains("IDENTITY(0,1)"));
        assert!(ddl.contains("distkey(user_id)"));
        assert!(!ddl.contains("nextval"));
        assert!(!ddl.contains("SEQUENCE"));
    }

    #[test]
    fn test_local_schema_uses_sequences() {
        for backend in [BackendType::Postgres, BackendType::DuckDb] {
            let statements = WarehouseSchema::create_tables_sql(backend);
            assert!(statements[0].starts_with("CREATE SEQUENCE"));
            let ddl = statements.join("\n");
            assert!(ddl.contains("nextval('time_id_seq')"));
            assert!(ddl.contains("nextval('songplay_id_seq')"));
            assert!(!ddl.contains("primary key"));
            assert!(!ddl.contains("distkey"));
        }
    }

    #[test]
    fn test_every_table_created_and_dropped() {
        let create = WarehouseSchema::create_tables_sql(BackendType::DuckDb).join("\n");
        let drop = WarehouseSchema::drop_tables_sql(BackendType::DuckDb);
        for table in ALL_TABLES {
            assert!(create.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)));
            assert!(drop.contains(&format!("DROP TABLE IF EXISTS {};", table)));
        }
        // Sequences are referenced by table defaults, so they go last
        assert!(drop.last().unwrap().starts_with("DROP SEQUENCE"));
    }

    #[test]
    fn test_song_duration_is_floating_point() {
        for backend in [BackendType::Redshift, BackendType::Postgres, BackendType::DuckDb] {
            let ddl = WarehouseSchema::create_tables_sql(backend).join("\n");
            assert!(ddl.contains("duration        DOUBLE PRECISION NOT NULL"));
        }
    }

    #[test]
    fn test_users_track_observation_time() {
        let ddl = WarehouseSchema::create_tables_sql(BackendType::Postgres).join("\n");
        assert!(ddl.contains("observed_at     BIGINT"));
    }
}
