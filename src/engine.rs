//! Ties a [`EngineConfig`] to the currently-open database and funnels
//! every statement to either database-lifecycle handling here or
//! [`crate::exec::execute`] for table-scoped work. The REPL and the
//! `EXECFILE` script driver both go through one `EngineSession`.

use crate::buffer::{BufferPool, ReplacerPolicy};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::disk::DiskManager;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::exec::{self, ExecOutput};
use crate::sql::ast::Statement;
use std::fs;

/// The catalog's metadata page is always page 0: a fresh [`DiskManager`]
/// hands out logical page ids starting at 0, and [`Catalog::create`]
/// allocates its meta page before anything else ever touches the pool.
const CATALOG_META_PAGE_ID: i32 = 0;

struct OpenDatabase {
    name: String,
    catalog: Catalog,
}

pub struct EngineSession {
    config: EngineConfig,
    open: Option<OpenDatabase>,
}

impl EngineSession {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, open: None }
    }

    fn db_path(&self, name: &str) -> std::path::PathBuf {
        self.config.data_dir.join(format!("{}.db", name))
    }

    fn list_databases(&self) -> DbResult<Vec<String>> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.config.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(DbError::from(e)),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("db") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn create_database(&mut self, name: &str) -> DbResult<ExecOutput> {
        fs::create_dir_all(&self.config.data_dir)?;
        let path = self.db_path(name);
        if path.exists() {
            return Err(DbError::new(ErrorKind::DatabaseAlreadyExists, name));
        }
        let disk = DiskManager::open(&path, self.config.page_size)?;
        let pool = BufferPool::new(disk, self.config.buffer_pool_size, ReplacerPolicy::Lru);
        Catalog::create(pool)?;
        Ok(ExecOutput::Message(format!("Database '{}' created", name)))
    }

    pub fn drop_database(&mut self, name: &str) -> DbResult<ExecOutput> {
        let path = self.db_path(name);
        if !path.exists() {
            return Err(DbError::new(ErrorKind::DatabaseNotExist, name));
        }
        if self.open.as_ref().map(|o| o.name.as_str()) == Some(name) {
            self.open = None;
        }
        fs::remove_file(&path)?;
        Ok(ExecOutput::Message(format!("Database '{}' dropped", name)))
    }

    pub fn show_databases(&self) -> DbResult<ExecOutput> {
        let names = self.list_databases()?;
        Ok(ExecOutput::Rows(exec::ResultSet {
            columns: vec!["database".to_string()],
            rows: names.into_iter().map(|n| vec![n]).collect(),
        }))
    }

    pub fn use_database(&mut self, name: &str) -> DbResult<ExecOutput> {
        let path = self.db_path(name);
        if !path.exists() {
            return Err(DbError::new(ErrorKind::DatabaseNotExist, name));
        }
        let disk = DiskManager::open(&path, self.config.page_size)?;
        let pool = BufferPool::new(disk, self.config.buffer_pool_size, ReplacerPolicy::Lru);
        let catalog = Catalog::open(pool, CATALOG_META_PAGE_ID)?;
        self.open = Some(OpenDatabase { name: name.to_string(), catalog });
        Ok(ExecOutput::Message(format!("Database changed to '{}'", name)))
    }

    pub fn current_database(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.name.as_str())
    }

    /// Dispatches one statement. Database-lifecycle statements are
    /// handled directly; everything else requires a database to be in
    /// use and is handed to [`exec::execute`].
    pub fn run(&mut self, statement: &Statement) -> DbResult<ExecOutput> {
        match statement {
            Statement::CreateDatabase(name) => self.create_database(name),
            Statement::DropDatabase(name) => self.drop_database(name),
            Statement::ShowDatabases => self.show_databases(),
            Statement::UseDatabase(name) => self.use_database(name),
            Statement::Quit | Statement::ExecFile(_) => {
                Err(DbError::failed("this statement must be handled by the REPL driver"))
            }
            other => {
                let db = self
                    .open
                    .as_mut()
                    .ok_or_else(|| DbError::failed("no database in use; run USE <name> first"))?;
                exec::execute(&mut db.catalog, other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::{ColumnDef, ColumnType, Literal, SelectColumns};
    use tempfile::TempDir;

    fn session() -> (TempDir, EngineSession) {
        let dir = TempDir::new().unwrap();
        let session = EngineSession::new(EngineConfig::new(dir.path()));
        (dir, session)
    }

    #[test]
    fn create_use_and_drop_database_round_trip() {
        let (_dir, mut session) = session();
        session.create_database("shop").unwrap();
        match session.show_databases().unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows, vec![vec!["shop".to_string()]]),
            _ => panic!("expected rows"),
        }
        session.use_database("shop").unwrap();
        assert_eq!(session.current_database(), Some("shop"));
        session.drop_database("shop").unwrap();
        assert_eq!(session.current_database(), None);
    }

    #[test]
    fn statements_require_a_database_in_use() {
        let (_dir, mut session) = session();
        let err = session.run(&Statement::ShowTables).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failed);
    }

    #[test]
    fn create_table_and_insert_through_the_session() {
        let (_dir, mut session) = session();
        session.create_database("shop").unwrap();
        session.use_database("shop").unwrap();
        session
            .run(&Statement::CreateTable {
                name: "users".to_string(),
                columns: vec![
                    ColumnDef { name: "id".to_string(), ty: ColumnType::Int, unique: false },
                    ColumnDef { name: "name".to_string(), ty: ColumnType::Char(16), unique: false },
                ],
                primary_key: vec!["id".to_string()],
            })
            .unwrap();
        session
            .run(&Statement::Insert { table: "users".to_string(), values: vec![Literal::Int(1), Literal::Str("alice".to_string())] })
            .unwrap();
        match session.run(&Statement::Select { table: "users".to_string(), columns: SelectColumns::All, filter: None }).unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 1),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn reopening_a_database_preserves_its_tables() {
        let (_dir, mut session) = session();
        session.create_database("shop").unwrap();
        session.use_database("shop").unwrap();
        session
            .run(&Statement::CreateTable {
                name: "users".to_string(),
                columns: vec![ColumnDef { name: "id".to_string(), ty: ColumnType::Int, unique: false }],
                primary_key: vec!["id".to_string()],
            })
            .unwrap();
        session.use_database("shop").unwrap();
        match session.run(&Statement::ShowTables).unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows, vec![vec!["users".to_string()]]),
            _ => panic!("expected rows"),
        }
    }
}
