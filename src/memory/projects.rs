use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{format_timestamp, parse_timestamp, Project};
use crate::error::StoreResult;
use crate::pipeline::event::{Event, EventPayload};

/// Insert a project or refresh the one already registered at the same path.
///
/// On conflict the stored `id` and `created_at` win; name, remote and
/// `last_seen` take the new values. Returns the row as stored.
pub fn upsert_project(conn: &Connection, project: &Project) -> StoreResult<Project> {
    conn.execute(
        "INSERT INTO projects (id, name, path, git_remote, created_at, last_seen) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(path) DO UPDATE SET \
             name = excluded.name, \
             git_remote = excluded.git_remote, \
             last_seen = excluded.last_seen",
        params![
            project.id,
            project.name,
            project.path,
            project.git_remote,
            format_timestamp(&project.created_at),
            format_timestamp(&project.last_seen),
        ],
    )?;

    let stored = conn.query_row(
        "SELECT id, name, path, git_remote, created_at, last_seen FROM projects WHERE path = ?1",
        params![project.path],
        project_from_row,
    )?;
    tracing::debug!(id = %stored.id, path = %stored.path, "project upserted");
    Ok(stored)
}

/// Exact-path lookup. Absence is `Ok(None)`.
pub fn find_project_by_path(conn: &Connection, path: &str) -> StoreResult<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT id, name, path, git_remote, created_at, last_seen FROM projects WHERE path = ?1",
            params![path],
            project_from_row,
        )
        .optional()?;
    Ok(project)
}

pub fn count_projects(conn: &Connection) -> StoreResult<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Resolve the owning project of an event.
///
/// An explicit reference is kept as is. A commit registers (or refreshes) its
/// repository. Other kinds stay unowned.
pub fn project_for_event(conn: &Connection, event: &Event) -> StoreResult<Option<String>> {
    if event.project_id.is_some() {
        return Ok(event.project_id.clone());
    }
    match &event.payload {
        EventPayload::GitCommit(commit) => {
            let project = Project::from_path(commit.repo.clone(), commit.remote.clone());
            Ok(Some(upsert_project(conn, &project)?.id))
        }
        _ => Ok(None),
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let created_at: String = row.get(4)?;
    let last_seen: String = row.get(5)?;
    let parse = |idx: usize, raw: &str| {
        parse_timestamp(raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
    };
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        git_remote: row.get(3)?,
        created_at: parse(4, &created_at)?,
        last_seen: parse(5, &last_seen)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::pipeline::event::{GitCommit, TerminalCmd};

    #[test]
    fn upsert_is_idempotent_by_path() {
        let conn = db::open_memory_database().unwrap();
        let first = upsert_project(&conn, &Project::from_path("/src/widget", None)).unwrap();

        let again = Project::from_path("/src/widget", Some("git@example.com:widget.git".into()));
        let second = upsert_project(&conn, &again).unwrap();

        assert_eq!(count_projects(&conn).unwrap(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.git_remote.as_deref(), Some("git@example.com:widget.git"));
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn find_missing_path_is_not_an_error() {
        let conn = db::open_memory_database().unwrap();
        assert!(find_project_by_path(&conn, "/nowhere").unwrap().is_none());

        upsert_project(&conn, &Project::from_path("/src/gadget", None)).unwrap();
        let found = find_project_by_path(&conn, "/src/gadget").unwrap().unwrap();
        assert_eq!(found.name, "gadget");
        assert!(find_project_by_path(&conn, "/src/gadget/").unwrap().is_none());
    }

    #[test]
    fn commit_events_register_their_repository() {
        let conn = db::open_memory_database().unwrap();
        let event = Event::new(EventPayload::GitCommit(GitCommit {
            repo: "/src/widget".into(),
            hash: "abc".into(),
            message: "init".into(),
            author: "dev".into(),
            diff: String::new(),
            files: vec![],
            remote: Some("https://example.com/widget.git".into()),
        }));

        let id = project_for_event(&conn, &event).unwrap().unwrap();
        let project = find_project_by_path(&conn, "/src/widget").unwrap().unwrap();
        assert_eq!(project.id, id);
        assert_eq!(project_for_event(&conn, &event).unwrap(), Some(id));

        let cmd = Event::new(EventPayload::TerminalCmd(TerminalCmd {
            command: "cargo build".into(),
            shell: None,
        }));
        assert_eq!(project_for_event(&conn, &cmd).unwrap(), None);
    }
}
