//! SQLite-backed repository.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Repository, StoreError, StoreResult, StoredFile};
use crate::duplicates::HashedEntry;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    path               TEXT NOT NULL UNIQUE,
    relative_path      TEXT NOT NULL,
    size               INTEGER NOT NULL,
    modified           INTEGER NOT NULL,
    hash               TEXT NOT NULL,
    hash_algorithm     TEXT NOT NULL,
    is_archive_content INTEGER NOT NULL DEFAULT 0,
    archive_source     TEXT,
    duplicate_of       INTEGER REFERENCES files(id) ON DELETE SET NULL,
    updated_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
CREATE INDEX IF NOT EXISTS idx_files_size ON files(size);
CREATE INDEX IF NOT EXISTS idx_files_duplicate_of ON files(duplicate_of);
";

const COLUMNS: &str =
    "id, path, size, modified, hash, hash_algorithm, is_archive_content, archive_source, duplicate_of";

/// Repository stored in a SQLite database file (or in memory).
pub struct SqliteRepository {
    conn: Connection,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("path", &self.conn.path())
            .finish()
    }
}

fn to_sql_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<StoredFile> {
    let size: i64 = row.get(2)?;
    let archive_source: Option<String> = row.get(7)?;
    Ok(StoredFile {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        size: u64::try_from(size).unwrap_or(0),
        modified: row.get(3)?,
        hash: row.get(4)?,
        hash_algorithm: row.get(5)?,
        is_archive_content: row.get(6)?,
        archive_source: archive_source.map(PathBuf::from),
        duplicate_of: row.get(8)?,
    })
}

impl SqliteRepository {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema applied.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Cannot create database directory {}: {}", parent.display(), e);
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, true)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, on_disk: bool) -> StoreResult<Self> {
        if on_disk {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
        }
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        log::debug!("SQLite repository initialized");
        Ok(Self { conn })
    }

    /// Raw connection, for ad-hoc queries.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn query_files(&self, filter: &str, param: &dyn rusqlite::ToSql) -> StoreResult<Vec<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM files WHERE {filter} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([param], from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl Repository for SqliteRepository {
    fn upsert(&mut self, entry: &HashedEntry) -> StoreResult<i64> {
        let file = &entry.entry;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO files (path, relative_path, size, modified, hash, hash_algorithm, \
                                is_archive_content, archive_source, duplicate_of, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9) \
             ON CONFLICT(path) DO UPDATE SET \
                relative_path = excluded.relative_path, \
                size = excluded.size, \
                modified = excluded.modified, \
                hash = excluded.hash, \
                hash_algorithm = excluded.hash_algorithm, \
                is_archive_content = excluded.is_archive_content, \
                archive_source = excluded.archive_source, \
                duplicate_of = NULL, \
                updated_at = excluded.updated_at",
            params![
                path_text(&file.path),
                path_text(&file.relative_path),
                to_sql_size(file.size),
                file.modified,
                entry.hash,
                entry.hash_algorithm,
                file.is_archive_content,
                file.archive_source.as_deref().map(path_text),
                now,
            ],
        )?;
        self.get_id(&file.path)?
            .ok_or_else(|| StoreError::NotFound(file.path.clone()))
    }

    fn get_id(&self, path: &Path) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![path_text(path)],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn mark_duplicate(&mut self, path: &Path, original_id: i64) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE files SET duplicate_of = ?1 WHERE path = ?2",
            params![original_id, path_text(path)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    fn find_by_digest(&self, hash: &str) -> StoreResult<Vec<StoredFile>> {
        self.query_files("hash = ?1", &hash)
    }

    fn find_by_size(&self, size: u64) -> StoreResult<Vec<StoredFile>> {
        self.query_files("size = ?1", &to_sql_size(size))
    }

    fn duplicates(&self) -> StoreResult<Vec<StoredFile>> {
        let sql = format!("SELECT {COLUMNS} FROM files WHERE duplicate_of IS NOT NULL ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn begin_batch(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::detect_duplicates;
    use crate::scanner::FileEntry;
    use crate::store::{persist_entries, resolve_digest};

    fn hashed(path: &str, size: u64, hash: &str) -> HashedEntry {
        HashedEntry::new(FileEntry::new(PathBuf::from(path), size, 100), hash, "blake3")
    }

    #[test]
    fn test_upsert_keeps_id_stable() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let first = repo.upsert(&hashed("/a", 1, "h1")).unwrap();
        let again = repo.upsert(&hashed("/a", 2, "h2")).unwrap();
        let other = repo.upsert(&hashed("/b", 1, "h1")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(repo.count().unwrap(), 2);
        assert_eq!(repo.get_id(Path::new("/a")).unwrap(), Some(first));
        assert_eq!(repo.get_id(Path::new("/zzz")).unwrap(), None);
        assert_eq!(repo.find_by_digest("h2").unwrap()[0].size, 2);
    }

    #[test]
    fn test_find_by_digest_and_size() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert(&hashed("/a", 10, "x")).unwrap();
        repo.upsert(&hashed("/b", 20, "x")).unwrap();
        repo.upsert(&hashed("/c", 10, "y")).unwrap();

        let by_digest: Vec<_> = repo
            .find_by_digest("x")
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(by_digest, vec![PathBuf::from("/a"), PathBuf::from("/b")]);

        let by_size: Vec<_> = repo
            .find_by_size(10)
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(by_size, vec![PathBuf::from("/a"), PathBuf::from("/c")]);
    }

    #[test]
    fn test_mark_duplicate_unknown_path() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let id = repo.upsert(&hashed("/a", 1, "h")).unwrap();
        assert!(matches!(
            repo.mark_duplicate(Path::new("/missing"), id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_persist_entries_links_duplicates() {
        let mut entries = vec![
            hashed("/r/original.txt", 19, "aa"),
            hashed("/r/dup1.txt", 19, "aa"),
            hashed("/r/sub/dup2.txt", 19, "aa"),
            hashed("/r/unique.txt", 16, "bb"),
        ];
        detect_duplicates(&mut entries);

        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let stats = persist_entries(&mut repo, &entries).unwrap();
        assert_eq!(stats.stored, 4);
        assert_eq!(stats.linked, 2);

        let original_id = repo.get_id(Path::new("/r/original.txt")).unwrap().unwrap();
        let dups = repo.duplicates().unwrap();
        assert_eq!(dups.len(), 2);
        assert!(dups.iter().all(|d| d.duplicate_of == Some(original_id)));
    }

    #[test]
    fn test_resolve_digest_uses_largest_first() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert(&hashed("/short", 5, "h")).unwrap();
        let big = repo.upsert(&hashed("/a/much/longer/path", 9, "h")).unwrap();
        repo.upsert(&hashed("/single", 5, "other")).unwrap();

        assert_eq!(resolve_digest(&mut repo, "h").unwrap(), Some(big));
        assert_eq!(resolve_digest(&mut repo, "other").unwrap(), None);

        let dups = repo.duplicates().unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].path, PathBuf::from("/short"));

        // Stable on re-run
        assert_eq!(resolve_digest(&mut repo, "h").unwrap(), Some(big));
    }

    #[test]
    fn test_failed_batch_is_discarded() {
        let mut entry = hashed("/dup", 1, "h");
        entry.is_duplicate = true;
        entry.duplicate_of = Some(PathBuf::from("/never-stored"));

        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let result = persist_entries(&mut repo, &[hashed("/a", 1, "x"), entry]);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(repo.count().unwrap(), 0);

        // Connection is usable for the next batch
        persist_entries(&mut repo, &[hashed("/a", 1, "x")]).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("nested/safedupe.db");
        {
            let mut repo = SqliteRepository::open(&db).unwrap();
            repo.upsert(&hashed("/a", 1, "h")).unwrap();
        }
        let repo = SqliteRepository::open(&db).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }
}
