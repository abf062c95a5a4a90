//! Per-batch embedded staging store
//!
//! Each input batch gets a fresh SQLite database holding its four normalized
//! relations. The store is either in-memory (sequential runs) or backed by a
//! uniquely named file in the scratch directory (parallel runs), and never
//! outlives or is shared across batches.
//!
//! Inserts run under uniqueness constraints with explicit insert-or-ignore
//! semantics: a constraint violation is reported as "already present" while
//! every other failure propagates as a staging error.

use crate::app::models::{ArticleRow, AuthorAffiliationRow, MeshHeadingRow, PublicationTypeRow};
use crate::config::StagingMode;
use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, Transaction, params};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// DDL for the four staged relations
const SCHEMA_SQL: &str = "
    CREATE TABLE articles (
      pmid INTEGER PRIMARY KEY,
      article_title TEXT,
      date_created TEXT,
      date_revised TEXT,
      issn TEXT,
      issn_type TEXT,
      cited_medium TEXT,
      volume TEXT,
      issue TEXT,
      pub_year TEXT,
      pub_month TEXT,
      journal_title TEXT,
      journal_abbreviation TEXT,
      journal_nlm_id TEXT
    );

    CREATE TABLE mesh_headings (
      pmid INTEGER NOT NULL,
      descriptor_code TEXT,
      major_topic INTEGER NOT NULL,
      PRIMARY KEY (pmid, descriptor_code)
    );

    CREATE TABLE publication_types (
      pmid INTEGER NOT NULL,
      type_name TEXT,
      type_code TEXT,
      ordinal INTEGER NOT NULL,
      PRIMARY KEY (pmid, ordinal)
    );

    CREATE TABLE author_affiliations (
      pmid INTEGER NOT NULL,
      author_ordinal INTEGER NOT NULL,
      initials TEXT,
      fore_name TEXT,
      last_name TEXT,
      affiliation_ordinal INTEGER NOT NULL,
      affiliation TEXT,
      PRIMARY KEY (pmid, author_ordinal, affiliation_ordinal)
    );
";

/// Embedded transactional store for one batch's normalized relations
pub struct StagingStore {
    connection: Option<Connection>,
    schema_defined: bool,
    mode: StagingMode,
    path: Option<PathBuf>,
}

impl StagingStore {
    /// Open a fresh store for one batch.
    ///
    /// `StagingMode::Memory` needs no durability and is fastest;
    /// `StagingMode::File` backs the store with `<scratch_dir>/<stem>.db`,
    /// uniquely named per batch so parallel workers never collide. The file
    /// is swept by the caller after the run.
    pub fn open(mode: StagingMode, batch_stem: &str, scratch_dir: &Path) -> Result<Self> {
        let (connection, path) = match mode {
            StagingMode::Memory => {
                let conn = Connection::open_in_memory()
                    .map_err(|e| Error::staging("failed to open in-memory store", e))?;
                (conn, None)
            }
            StagingMode::File => {
                std::fs::create_dir_all(scratch_dir).map_err(|e| {
                    Error::io(
                        format!("failed to create scratch directory '{}'", scratch_dir.display()),
                        e,
                    )
                })?;
                let path = scratch_dir.join(format!("{batch_stem}.db"));
                let conn = Connection::open(&path).map_err(|e| {
                    Error::staging(format!("failed to open store file '{}'", path.display()), e)
                })?;
                configure_file_store(&conn)?;
                (conn, Some(path))
            }
        };

        debug!("Opened {} staging store for batch '{}'", mode, batch_stem);

        Ok(Self {
            connection: Some(connection),
            schema_defined: false,
            mode,
            path,
        })
    }

    /// Create the four staged relations. Calling this twice is an error.
    pub fn define_schema(&mut self) -> Result<()> {
        if self.schema_defined {
            return Err(Error::SchemaExists);
        }

        self.connection()?
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::staging("failed to define staging schema", e))?;
        self.schema_defined = true;
        Ok(())
    }

    /// Begin the batch-level transaction that all inserts run under
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        match self.connection.as_mut() {
            Some(conn) => conn
                .transaction()
                .map_err(|e| Error::staging("failed to begin batch transaction", e)),
            None => Err(Error::StoreClosed),
        }
    }

    /// Borrow the live connection for reads
    pub fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::StoreClosed)
    }

    /// Backing mode of this store
    pub fn mode(&self) -> StagingMode {
        self.mode
    }

    /// Backing file of this store, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Release the store's resources. Safe to call multiple times.
    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Err((_, e)) = conn.close() {
                warn!("Staging store did not close cleanly: {}", e);
            }
        }
    }
}

impl Drop for StagingStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Apply file-store pragmas; batched commits do the durability work
fn configure_file_store(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| Error::staging("failed to set journal_mode=WAL", e))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| Error::staging("failed to set synchronous=NORMAL", e))?;
    Ok(())
}

/// Whether an insert failed only because the row is already present
fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Map an insert outcome to insert-or-ignore semantics: `Ok(true)` when the
/// row landed, `Ok(false)` when a uniqueness constraint already held it
fn insert_or_ignore(result: rusqlite::Result<usize>, what: &str) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(Error::staging(format!("failed to insert {what}"), e)),
    }
}

/// Insert one article row; a duplicate pmid is a first-write-wins no-op
pub fn insert_article(conn: &Connection, row: &ArticleRow) -> Result<bool> {
    insert_or_ignore(
        conn.execute(
            "INSERT INTO articles (pmid, article_title, date_created, date_revised, issn,
               issn_type, cited_medium, volume, issue, pub_year, pub_month,
               journal_title, journal_abbreviation, journal_nlm_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.pmid,
                row.article_title,
                row.date_created,
                row.date_revised,
                row.issn,
                row.issn_type,
                row.cited_medium,
                row.volume,
                row.issue,
                row.pub_year,
                row.pub_month,
                row.journal_title,
                row.journal_abbreviation,
                row.journal_nlm_id,
            ],
        ),
        "article row",
    )
}

/// Insert one mesh-heading row; duplicate descriptor codes for the same
/// pmid are silently dropped, not overwritten
pub fn insert_mesh_heading(conn: &Connection, row: &MeshHeadingRow) -> Result<bool> {
    insert_or_ignore(
        conn.execute(
            "INSERT INTO mesh_headings (pmid, descriptor_code, major_topic)
             VALUES (?1, ?2, ?3)",
            params![row.pmid, row.descriptor_code, row.major_topic],
        ),
        "mesh-heading row",
    )
}

/// Insert one publication-type row keyed by its per-record ordinal
pub fn insert_publication_type(conn: &Connection, row: &PublicationTypeRow) -> Result<bool> {
    insert_or_ignore(
        conn.execute(
            "INSERT INTO publication_types (pmid, type_name, type_code, ordinal)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.pmid, row.type_name, row.type_code, row.ordinal],
        ),
        "publication-type row",
    )
}

/// Insert one author/affiliation row keyed by its ordinal pair
pub fn insert_author_affiliation(conn: &Connection, row: &AuthorAffiliationRow) -> Result<bool> {
    insert_or_ignore(
        conn.execute(
            "INSERT INTO author_affiliations (pmid, author_ordinal, initials, fore_name,
               last_name, affiliation_ordinal, affiliation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.pmid,
                row.author_ordinal,
                row.initials,
                row.fore_name,
                row.last_name,
                row.affiliation_ordinal,
                row.affiliation,
            ],
        ),
        "author-affiliation row",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_memory_store() -> StagingStore {
        let mut store =
            StagingStore::open(StagingMode::Memory, "test_batch", Path::new("unused")).unwrap();
        store.define_schema().unwrap();
        store
    }

    fn article(pmid: i64) -> ArticleRow {
        ArticleRow {
            pmid,
            article_title: Some("Sample title".to_string()),
            ..ArticleRow::default()
        }
    }

    fn count(store: &StagingStore, table: &str) -> i64 {
        store
            .connection()
            .unwrap()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_define_schema_twice_is_an_error() {
        let mut store = open_memory_store();
        assert!(matches!(store.define_schema(), Err(Error::SchemaExists)));
    }

    #[test]
    fn test_duplicate_article_is_first_write_wins() {
        let store = open_memory_store();
        let conn = store.connection().unwrap();

        let mut first = article(31452104);
        first.article_title = Some("First title".to_string());
        assert!(insert_article(conn, &first).unwrap());

        let mut second = article(31452104);
        second.article_title = Some("Second title".to_string());
        assert!(!insert_article(conn, &second).unwrap());

        assert_eq!(count(&store, "articles"), 1);
        let title: String = conn
            .query_row("SELECT article_title FROM articles WHERE pmid = 31452104", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(title, "First title");
    }

    #[test]
    fn test_duplicate_mesh_heading_pair_is_dropped() {
        let store = open_memory_store();
        let conn = store.connection().unwrap();

        let row = MeshHeadingRow {
            pmid: 1,
            descriptor_code: Some("D001234".to_string()),
            major_topic: true,
        };
        assert!(insert_mesh_heading(conn, &row).unwrap());
        assert!(!insert_mesh_heading(conn, &row).unwrap());

        // A different descriptor for the same pmid still lands
        let other = MeshHeadingRow {
            pmid: 1,
            descriptor_code: Some("D009999".to_string()),
            major_topic: false,
        };
        assert!(insert_mesh_heading(conn, &other).unwrap());
        assert_eq!(count(&store, "mesh_headings"), 2);
    }

    #[test]
    fn test_insert_before_schema_is_a_staging_error() {
        let store = StagingStore::open(StagingMode::Memory, "raw", Path::new("unused")).unwrap();
        let result = insert_article(store.connection().unwrap(), &article(1));
        assert!(matches!(result, Err(Error::Staging { .. })));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_reads() {
        let mut store = open_memory_store();
        store.close();
        store.close();
        assert!(matches!(store.connection(), Err(Error::StoreClosed)));
        assert!(matches!(store.transaction(), Err(Error::StoreClosed)));
    }

    #[test]
    fn test_file_store_is_uniquely_named_per_batch() {
        let scratch = TempDir::new().unwrap();
        let store_a = StagingStore::open(StagingMode::File, "batch_a", scratch.path()).unwrap();
        let store_b = StagingStore::open(StagingMode::File, "batch_b", scratch.path()).unwrap();

        assert_eq!(store_a.path().unwrap(), scratch.path().join("batch_a.db"));
        assert_eq!(store_b.path().unwrap(), scratch.path().join("batch_b.db"));
        assert!(store_a.path().unwrap().exists());
        assert!(store_b.path().unwrap().exists());
    }

    #[test]
    fn test_transaction_commit_persists_rows() {
        let mut store = open_memory_store();

        {
            let tx = store.transaction().unwrap();
            insert_article(&tx, &article(7)).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(count(&store, "articles"), 1);

        // An uncommitted transaction rolls back on drop
        {
            let tx = store.transaction().unwrap();
            insert_article(&tx, &article(8)).unwrap();
        }
        assert_eq!(count(&store, "articles"), 1);
    }
}
