//! Full-stack round trips through `EngineSession`: these exercise the
//! parser, catalog, heap, and B+-tree indexes together the way the REPL
//! does, rather than any one layer in isolation.

use tempfile::TempDir;
use tupledb::config::EngineConfig;
use tupledb::engine::EngineSession;
use tupledb::error::ErrorKind;
use tupledb::exec::ExecOutput;
use tupledb::sql::ast::{ColumnDef, ColumnType, Literal, SelectColumns, Statement};
use tupledb::sql::parse;

fn session() -> (TempDir, EngineSession) {
    let dir = TempDir::new().unwrap();
    let session = EngineSession::new(EngineConfig::new(dir.path()));
    (dir, session)
}

fn run(session: &mut EngineSession, sql: &str) -> ExecOutput {
    let statements = parse::parse_all(sql).unwrap();
    assert_eq!(statements.len(), 1, "expected exactly one statement in {:?}", sql);
    session.run(&statements[0]).unwrap()
}

#[test]
fn create_insert_and_reopen_preserves_data() {
    let (_dir, mut session) = session();
    run(&mut session, "CREATE DATABASE shop");
    run(&mut session, "USE shop");
    run(&mut session, "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16) UNIQUE)");
    run(&mut session, "INSERT INTO users VALUES (1, 'alice')");
    run(&mut session, "INSERT INTO users VALUES (2, 'bob')");

    // drop and reopen: the buffer pool and disk manager for the previous
    // session go out of scope here, forcing a fresh read from disk.
    drop(session);
    let dir_path = _dir.path().to_path_buf();
    let mut session = EngineSession::new(EngineConfig::new(dir_path));
    run(&mut session, "USE shop");
    match run(&mut session, "SELECT * FROM users") {
        ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 2),
        _ => panic!("expected rows"),
    }
}

#[test]
fn primary_key_and_unique_column_reject_duplicates() {
    let (_dir, mut session) = session();
    run(&mut session, "CREATE DATABASE shop");
    run(&mut session, "USE shop");
    run(&mut session, "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16) UNIQUE)");
    run(&mut session, "INSERT INTO users VALUES (1, 'alice')");

    let statements = parse::parse_all("INSERT INTO users VALUES (1, 'carol')").unwrap();
    let err = session.run(&statements[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PkDuplicate);

    let statements = parse::parse_all("INSERT INTO users VALUES (2, 'alice')").unwrap();
    let err = session.run(&statements[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UniKeyDuplicate);
}

#[test]
fn select_with_equality_predicate_returns_only_the_matching_row() {
    let (_dir, mut session) = session();
    run(&mut session, "CREATE DATABASE shop");
    run(&mut session, "USE shop");
    run(&mut session, "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16))");
    for i in 0..100 {
        let statements = parse::parse_all(&format!("INSERT INTO users VALUES ({}, 'u{}')", i, i)).unwrap();
        session.run(&statements[0]).unwrap();
    }
    match run(&mut session, "SELECT id FROM users WHERE id = 42") {
        ExecOutput::Rows(rs) => {
            assert_eq!(rs.rows.len(), 1);
            assert_eq!(rs.rows[0], vec!["42".to_string()]);
        }
        _ => panic!("expected rows"),
    }
}

#[test]
fn create_index_on_non_unique_column_requires_provable_uniqueness() {
    let (_dir, mut session) = session();
    run(&mut session, "CREATE DATABASE shop");
    run(&mut session, "USE shop");
    run(&mut session, "CREATE TABLE items (id INT PRIMARY KEY, tag INT)");
    run(&mut session, "INSERT INTO items VALUES (1, 100)");
    run(&mut session, "INSERT INTO items VALUES (2, 100)");

    let statements = parse::parse_all("CREATE INDEX tag_idx ON items (tag)").unwrap();
    let err = session.run(&statements[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ColumnNotUnique);

    run(&mut session, "DELETE FROM items WHERE id = 2");
    run(&mut session, "CREATE INDEX tag_idx ON items (tag)");
    match run(&mut session, "SHOW INDEX FROM items") {
        ExecOutput::Rows(rs) => assert!(rs.rows.iter().any(|r| r[0] == "tag_idx")),
        _ => panic!("expected rows"),
    }
}

#[test]
fn update_then_delete_reflect_in_subsequent_scans() {
    let (_dir, mut session) = session();
    run(&mut session, "CREATE DATABASE shop");
    run(&mut session, "USE shop");
    run(&mut session, "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16))");
    run(&mut session, "INSERT INTO users VALUES (1, 'alice')");
    run(&mut session, "UPDATE users SET name = 'alicia' WHERE id = 1");
    match run(&mut session, "SELECT name FROM users WHERE id = 1") {
        ExecOutput::Rows(rs) => assert_eq!(rs.rows[0], vec!["alicia".to_string()]),
        _ => panic!("expected rows"),
    }
    run(&mut session, "DELETE FROM users WHERE id = 1");
    match run(&mut session, "SELECT * FROM users") {
        ExecOutput::Rows(rs) => assert!(rs.rows.is_empty()),
        _ => panic!("expected rows"),
    }
}

#[test]
fn statements_without_a_database_in_use_are_rejected() {
    let (_dir, mut session) = session();
    let statements = parse::parse_all("SHOW TABLES").unwrap();
    let err = session.run(&statements[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failed);
}

#[test]
fn execfile_runs_one_statement_per_line_and_skips_comments() {
    let (dir, mut session) = session();
    let script_path = dir.path().join("setup.sql");
    std::fs::write(
        &script_path,
        "-- build the shop database, no semicolons anywhere\n\
         CREATE DATABASE shop\n\
         USE shop\n\
         \n\
         -- users table plus two rows\n\
         CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16))\n\
         INSERT INTO users VALUES (1, 'alice')\n\
         INSERT INTO users VALUES (2, 'bob')\n",
    )
    .unwrap();

    let statements = parse::parse_script(&std::fs::read_to_string(&script_path).unwrap()).unwrap();
    assert_eq!(statements.len(), 5, "comment and blank lines must not produce statements");
    for statement in &statements {
        session.run(statement).unwrap();
    }

    match run(&mut session, "SELECT * FROM users") {
        ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 2),
        _ => panic!("expected rows"),
    }
}

#[test]
fn direct_ast_statements_bypass_the_parser_for_programmatic_use() {
    let (_dir, mut session) = session();
    session.create_database("shop").unwrap();
    session.use_database("shop").unwrap();
    session
        .run(&Statement::CreateTable {
            name: "t".to_string(),
            columns: vec![ColumnDef { name: "id".to_string(), ty: ColumnType::Int, unique: false }],
            primary_key: vec!["id".to_string()],
        })
        .unwrap();
    session.run(&Statement::Insert { table: "t".to_string(), values: vec![Literal::Int(1)] }).unwrap();
    match session.run(&Statement::Select { table: "t".to_string(), columns: SelectColumns::All, filter: None }).unwrap() {
        ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 1),
        _ => panic!("expected rows"),
    }
}
