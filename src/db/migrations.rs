//! Schema versioning.
//!
//! `schema_meta` holds the schema version and, once an embedding provider has
//! been used against the database, the model that produced the stored vectors.
//! New databases are created at [`CURRENT_SCHEMA_VERSION`]; later schema
//! changes append a step to [`MIGRATIONS`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// `MIGRATIONS[i]` upgrades version `i + 1` to `i + 2`.
const MIGRATIONS: &[Migration] = &[];

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Get the stored embedding model identifier, if any.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'embedding_model'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [model],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    if version > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            schema_version = version,
            "database was written by a newer MemoryPilot"
        );
        return Ok(());
    }

    while version < CURRENT_SCHEMA_VERSION {
        let Some(step) = version
            .checked_sub(1)
            .and_then(|i| MIGRATIONS.get(i as usize))
        else {
            tracing::error!(schema_version = version, "no migration from this schema version");
            break;
        };
        tracing::info!(from = version, to = version + 1, "running migration");
        step(conn)?;
        version += 1;
        update_schema_version(conn, version)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn fresh_db_is_current_without_a_model() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_embedding_model(&conn).unwrap(), None);
    }

    #[test]
    fn migrations_keep_the_recorded_model() {
        let conn = test_db();
        set_embedding_model(&conn, "mxbai-embed-large").unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(
            get_embedding_model(&conn).unwrap().as_deref(),
            Some("mxbai-embed-large")
        );
    }

    #[test]
    fn newer_schema_is_left_alone() {
        let conn = test_db();
        update_schema_version(&conn, CURRENT_SCHEMA_VERSION + 1).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION + 1);
    }
}
