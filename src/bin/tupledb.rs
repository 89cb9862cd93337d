//! Interactive REPL and `EXECFILE` script driver. Reads one statement
//! per line (or a whole file with `EXECFILE <path>`), prints `Query OK`
//! for DML/DDL and a formatted table for rows, and keeps going after an
//! error instead of exiting.

use std::io::{self, Write};
use tupledb::config::EngineConfig;
use tupledb::engine::EngineSession;
use tupledb::exec::{format_result_set, ExecOutput};
use tupledb::sql::ast::Statement;
use tupledb::sql::parse;

fn main() {
    tupledb::logging::init();

    let data_dir = std::env::args().nth(1).unwrap_or_else(|| "./tupledb_data".to_string());
    let mut session = EngineSession::new(EngineConfig::new(data_dir));

    println!("tupledb — type SQL statements terminated by ';', or QUIT to exit.");
    let stdin = io::stdin();
    loop {
        print!("tupledb> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !run_line(&mut session, line) {
            break;
        }
    }
}

/// Returns `false` when the session should exit (`QUIT`/`EXIT` or EOF).
fn run_line(session: &mut EngineSession, line: &str) -> bool {
    let statements = match parse::parse_all(line) {
        Ok(statements) => statements,
        Err(e) => {
            println!("Error: {}", e);
            return true;
        }
    };
    for statement in statements {
        if !run_statement(session, &statement) {
            return false;
        }
    }
    true
}

fn run_statement(session: &mut EngineSession, statement: &Statement) -> bool {
    match statement {
        Statement::Quit => return false,
        Statement::ExecFile(path) => run_file(session, path),
        other => report(session.run(other)),
    }
    true
}

/// `EXECFILE` reads one statement per line rather than splitting on
/// `;` — a blank line or a line starting with `--` is skipped, every
/// other line is parsed and run on its own.
fn run_file(session: &mut EngineSession, path: &str) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            println!("Error: could not read '{}': {}", path, e);
            return;
        }
    };
    let statements = match parse::parse_script(&text) {
        Ok(statements) => statements,
        Err(e) => {
            log::warn!("execfile '{}': parse error: {}", path, e);
            println!("Error: {}", e);
            return;
        }
    };
    for statement in statements {
        if !run_statement(session, &statement) {
            break;
        }
    }
}

fn report(result: tupledb::error::DbResult<ExecOutput>) {
    match result {
        Ok(ExecOutput::Message(msg)) => println!("{}", msg),
        Ok(ExecOutput::Rows(rows)) => print!("{}", format_result_set(&rows)),
        Err(e) => {
            log::warn!("statement failed: {}", e);
            println!("Error: {}", e);
        }
    }
}
