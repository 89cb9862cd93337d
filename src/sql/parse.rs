//! Turns SQL text into [`Statement`]s. Standard DDL/DML goes through
//! `sqlparser`'s `GenericDialect`; the handful of extensions this
//! engine needs that aren't standard SQL (`CREATE DATABASE`, `USE`,
//! `SHOW TABLES`, `SHOW INDEX`, `EXECFILE`, `QUIT`) are recognized by
//! hand before falling through to the parser.

use super::ast::{ColumnDef, ColumnType, CompareOp, Expr, Literal, SelectColumns, Statement};
use crate::error::{DbError, DbResult};
use once_cell::sync::Lazy;
use sqlparser::ast::{self, Assignment, BinaryOperator, DataType, ObjectType, SetExpr, TableConstraint, TableFactor, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;

/// Words this engine's extension grammar claims for itself. Built once
/// and reused for every `CREATE TABLE`/`CREATE DATABASE` name and every
/// column name, since `sqlparser` happily accepts `EXECFILE` or `QUIT`
/// as an ordinary identifier and we don't want a table named that way
/// to become unreachable from the REPL.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["QUIT", "EXIT", "EXECFILE", "DATABASE", "DATABASES", "USE"]
        .iter()
        .copied()
        .collect()
});

fn check_not_reserved(name: &str) -> DbResult<()> {
    if RESERVED_WORDS.contains(name.to_ascii_uppercase().as_str()) {
        return Err(DbError::failed(format!("'{}' is a reserved word and cannot name a table, database, or column", name)));
    }
    Ok(())
}

/// Splits a script or REPL line on top-level `;` and parses each piece.
/// A `;` inside a quoted string literal is not distinguished from a
/// statement terminator — scripts should avoid embedding one.
pub fn parse_all(text: &str) -> DbResult<Vec<Statement>> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_one)
        .collect()
}

/// `EXECFILE`'s statement model: one statement per line, no `;`
/// terminator, blank lines and lines starting with `--` skipped. This
/// is a different split than [`parse_all`]'s top-level-`;` model, so a
/// script with one bare statement per line parses correctly here even
/// though it would concatenate into a single multi-statement blob under
/// `parse_all`.
pub fn parse_script(text: &str) -> DbResult<Vec<Statement>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .map(parse_one)
        .collect()
}

pub fn parse_one(text: &str) -> DbResult<Statement> {
    let trimmed = text.trim();
    if let Some(stmt) = try_parse_extension(trimmed) {
        return stmt;
    }
    parse_standard(trimmed)
}

fn try_parse_extension(text: &str) -> Option<DbResult<Statement>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let upper = |s: &str| s.to_ascii_uppercase();
    match words.as_slice() {
        [q] if upper(q) == "QUIT" || upper(q) == "EXIT" => Some(Ok(Statement::Quit)),
        [w, name] if upper(w) == "EXECFILE" => Some(Ok(Statement::ExecFile(name.to_string()))),
        [s1, s2] if upper(s1) == "SHOW" && upper(s2) == "DATABASES" => Some(Ok(Statement::ShowDatabases)),
        [s1, s2] if upper(s1) == "SHOW" && upper(s2) == "TABLES" => Some(Ok(Statement::ShowTables)),
        [s1, s2] if upper(s1) == "SHOW" && upper(s2) == "INDEX" => Some(Ok(Statement::ShowIndex { table: None })),
        [s1, s2, s3, s4] if upper(s1) == "SHOW" && upper(s2) == "INDEX" && upper(s3) == "FROM" => {
            Some(Ok(Statement::ShowIndex { table: Some(s4.to_string()) }))
        }
        [c1, c2, name] if upper(c1) == "CREATE" && upper(c2) == "DATABASE" => {
            Some(check_not_reserved(name).map(|_| Statement::CreateDatabase(name.to_string())))
        }
        [d1, d2, name] if upper(d1) == "DROP" && upper(d2) == "DATABASE" => {
            Some(Ok(Statement::DropDatabase(name.to_string())))
        }
        [u, name] if upper(u) == "USE" => Some(Ok(Statement::UseDatabase(name.to_string()))),
        [d1, d2, name] if upper(d1) == "DROP" && upper(d2) == "INDEX" => {
            Some(Ok(Statement::DropIndex { table: None, name: name.to_string() }))
        }
        [d1, d2, name, on, table] if upper(d1) == "DROP" && upper(d2) == "INDEX" && upper(on) == "ON" => {
            Some(Ok(Statement::DropIndex { table: Some(table.to_string()), name: name.to_string() }))
        }
        _ => None,
    }
}

fn parse_standard(text: &str) -> DbResult<Statement> {
    let statements = Parser::parse_sql(&GenericDialect {}, text)
        .map_err(|e| DbError::failed(format!("sql parse error: {}", e)))?;
    let statement = statements
        .into_iter()
        .next()
        .ok_or_else(|| DbError::failed("empty statement"))?;
    convert(statement)
}

fn convert(stmt: ast::Statement) -> DbResult<Statement> {
    match stmt {
        ast::Statement::CreateTable { name, columns, constraints, .. } => {
            check_not_reserved(&name.to_string())?;
            let mut primary_key = Vec::new();
            let mut cols = Vec::with_capacity(columns.len());
            for col in columns {
                check_not_reserved(&col.name.value)?;
                let ty = convert_type(&col.data_type)?;
                let mut unique = false;
                for opt in &col.options {
                    match &opt.option {
                        ast::ColumnOption::Unique { is_primary: true } => primary_key.push(col.name.value.clone()),
                        ast::ColumnOption::Unique { is_primary: false } => unique = true,
                        _ => {}
                    }
                }
                cols.push(ColumnDef { name: col.name.value.clone(), ty, unique });
            }
            for constraint in &constraints {
                if let TableConstraint::Unique { columns, is_primary: true, .. } = constraint {
                    primary_key.extend(columns.iter().map(|c| c.value.clone()));
                }
            }
            Ok(Statement::CreateTable { name: name.to_string(), columns: cols, primary_key })
        }
        ast::Statement::Drop { object_type: ObjectType::Table, names, .. } => {
            let name = names.into_iter().next().ok_or_else(|| DbError::failed("DROP TABLE needs a name"))?;
            Ok(Statement::DropTable(name.to_string()))
        }
        ast::Statement::Drop { object_type: ObjectType::Index, names, .. } => {
            let name = names.into_iter().next().ok_or_else(|| DbError::failed("DROP INDEX needs a name"))?;
            Ok(Statement::DropIndex { table: None, name: name.to_string() })
        }
        ast::Statement::CreateIndex { name, table_name, columns, .. } => {
            let columns = columns
                .into_iter()
                .map(|c| match c.expr {
                    ast::Expr::Identifier(ident) => Ok(ident.value),
                    other => Err(DbError::failed(format!("unsupported index key expression: {:?}", other))),
                })
                .collect::<DbResult<Vec<String>>>()?;
            Ok(Statement::CreateIndex { name: name.to_string(), table: table_name.to_string(), columns })
        }
        ast::Statement::Query(query) => match *query.body {
            SetExpr::Select(select) => {
                let table = table_name_of(&select.from)?;
                let columns = select_columns_of(&select.projection)?;
                let filter = select.selection.map(|e| convert_expr(&e)).transpose()?;
                Ok(Statement::Select { table, columns, filter })
            }
            other => Err(DbError::failed(format!("unsupported query shape: {:?}", other))),
        },
        ast::Statement::Insert { table_name, source, .. } => {
            let values = match *source.body {
                SetExpr::Values(values) => {
                    let row = values.rows.into_iter().next().ok_or_else(|| DbError::failed("INSERT needs one row of values"))?;
                    row.iter().map(convert_literal_expr).collect::<DbResult<Vec<Literal>>>()?
                }
                other => return Err(DbError::failed(format!("unsupported INSERT source: {:?}", other))),
            };
            Ok(Statement::Insert { table: table_name.to_string(), values })
        }
        ast::Statement::Delete { table_name, selection, .. } => {
            let table = table_factor_name(&table_name)?;
            let filter = selection.map(|e| convert_expr(&e)).transpose()?;
            Ok(Statement::Delete { table, filter })
        }
        ast::Statement::Update { table, assignments, selection, .. } => {
            let table = table_factor_name(&table.relation)?;
            let assignments = assignments
                .iter()
                .map(convert_assignment)
                .collect::<DbResult<Vec<(String, Literal)>>>()?;
            let filter = selection.map(|e| convert_expr(&e)).transpose()?;
            Ok(Statement::Update { table, assignments, filter })
        }
        other => Err(DbError::failed(format!("unsupported statement: {:?}", other))),
    }
}

fn convert_type(ty: &DataType) -> DbResult<ColumnType> {
    match ty {
        DataType::Int(_) | DataType::Integer(_) | DataType::BigInt(_) => Ok(ColumnType::Int),
        DataType::Float(_) | DataType::Real | DataType::Double | DataType::Decimal(_) => Ok(ColumnType::Float),
        DataType::Varchar(len) | DataType::Char(len) => {
            let width = len
                .as_ref()
                .map(|l| l.length as u16)
                .unwrap_or(255);
            Ok(ColumnType::Char(width))
        }
        other => Err(DbError::failed(format!("unsupported column type: {:?}", other))),
    }
}

fn table_name_of(from: &[ast::TableWithJoins]) -> DbResult<String> {
    let first = from.first().ok_or_else(|| DbError::failed("query needs a FROM clause"))?;
    table_factor_name(&first.relation)
}

fn table_factor_name(relation: &TableFactor) -> DbResult<String> {
    match relation {
        TableFactor::Table { name, .. } => Ok(name.to_string()),
        other => Err(DbError::failed(format!("unsupported FROM clause: {:?}", other))),
    }
}

fn select_columns_of(projection: &[ast::SelectItem]) -> DbResult<SelectColumns> {
    if projection.iter().any(|item| matches!(item, ast::SelectItem::Wildcard(_))) {
        return Ok(SelectColumns::All);
    }
    let names = projection
        .iter()
        .map(|item| match item {
            ast::SelectItem::UnnamedExpr(ast::Expr::Identifier(ident)) => Ok(ident.value.clone()),
            other => Err(DbError::failed(format!("unsupported select item: {:?}", other))),
        })
        .collect::<DbResult<Vec<String>>>()?;
    Ok(SelectColumns::Named(names))
}

fn convert_assignment(assignment: &Assignment) -> DbResult<(String, Literal)> {
    let column = assignment
        .id
        .last()
        .ok_or_else(|| DbError::failed("SET clause needs a column name"))?
        .value
        .clone();
    let value = convert_literal_expr(&assignment.value)?;
    Ok((column, value))
}

fn convert_literal_expr(expr: &ast::Expr) -> DbResult<Literal> {
    match expr {
        ast::Expr::Value(v) => convert_value(v),
        ast::Expr::UnaryOp { op: ast::UnaryOperator::Minus, expr } => match convert_literal_expr(expr)? {
            Literal::Int(n) => Ok(Literal::Int(-n)),
            Literal::Float(n) => Ok(Literal::Float(-n)),
            other => Err(DbError::failed(format!("cannot negate literal: {:?}", other))),
        },
        other => Err(DbError::failed(format!("unsupported literal expression: {:?}", other))),
    }
}

fn convert_value(value: &Value) -> DbResult<Literal> {
    match value {
        Value::Number(n, _) => {
            if n.contains('.') {
                n.parse::<f32>().map(Literal::Float).map_err(|_| DbError::failed("invalid float literal"))
            } else {
                n.parse::<i32>().map(Literal::Int).map_err(|_| DbError::failed("invalid integer literal"))
            }
        }
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Ok(Literal::Str(s.clone())),
        Value::Null => Ok(Literal::Null),
        other => Err(DbError::failed(format!("unsupported literal value: {:?}", other))),
    }
}

fn convert_expr(expr: &ast::Expr) -> DbResult<Expr> {
    match expr {
        ast::Expr::Nested(inner) => convert_expr(inner),
        ast::Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
            Ok(Expr::And(Box::new(convert_expr(left)?), Box::new(convert_expr(right)?)))
        }
        ast::Expr::BinaryOp { left, op: BinaryOperator::Or, right } => {
            Ok(Expr::Or(Box::new(convert_expr(left)?), Box::new(convert_expr(right)?)))
        }
        ast::Expr::BinaryOp { left, op, right } => {
            let column = identifier_name(left)?;
            let op = compare_op(op)?;
            let value = convert_literal_expr(right)?;
            Ok(Expr::Compare { column, op, value })
        }
        ast::Expr::IsNull(inner) => Ok(Expr::IsNull(identifier_name(inner)?)),
        ast::Expr::IsNotNull(inner) => Ok(Expr::IsNotNull(identifier_name(inner)?)),
        other => Err(DbError::failed(format!("unsupported WHERE expression: {:?}", other))),
    }
}

fn identifier_name(expr: &ast::Expr) -> DbResult<String> {
    match expr {
        ast::Expr::Identifier(ident) => Ok(ident.value.clone()),
        other => Err(DbError::failed(format!("expected a column name, found: {:?}", other))),
    }
}

fn compare_op(op: &BinaryOperator) -> DbResult<CompareOp> {
    match op {
        BinaryOperator::Eq => Ok(CompareOp::Eq),
        BinaryOperator::NotEq => Ok(CompareOp::Ne),
        BinaryOperator::Lt => Ok(CompareOp::Lt),
        BinaryOperator::LtEq => Ok(CompareOp::Le),
        BinaryOperator::Gt => Ok(CompareOp::Gt),
        BinaryOperator::GtEq => Ok(CompareOp::Ge),
        other => Err(DbError::failed(format!("unsupported comparison operator: {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_table_with_primary_key() {
        let stmt = parse_one("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(16) UNIQUE)").unwrap();
        match stmt {
            Statement::CreateTable { name, columns, primary_key } => {
                assert_eq!(name, "users");
                assert_eq!(columns.len(), 2);
                assert_eq!(primary_key, vec!["id".to_string()]);
                assert!(columns[1].unique);
            }
            other => panic!("expected CreateTable, got {:?}", other),
        }
    }

    #[test]
    fn parses_select_with_where_clause() {
        let stmt = parse_one("SELECT id, name FROM users WHERE id >= 5 AND name <> 'bob'").unwrap();
        match stmt {
            Statement::Select { table, columns, filter } => {
                assert_eq!(table, "users");
                assert_eq!(columns, SelectColumns::Named(vec!["id".to_string(), "name".to_string()]));
                assert!(matches!(filter, Some(Expr::And(_, _))));
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn parses_insert_values() {
        let stmt = parse_one("INSERT INTO users VALUES (1, 'alice')").unwrap();
        match stmt {
            Statement::Insert { table, values } => {
                assert_eq!(table, "users");
                assert_eq!(values, vec![Literal::Int(1), Literal::Str("alice".to_string())]);
            }
            other => panic!("expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn parses_engine_extension_statements() {
        assert_eq!(parse_one("USE shop").unwrap(), Statement::UseDatabase("shop".to_string()));
        assert_eq!(parse_one("SHOW TABLES").unwrap(), Statement::ShowTables);
        assert_eq!(parse_one("quit").unwrap(), Statement::Quit);
        assert_eq!(
            parse_one("DROP INDEX tag_idx ON items").unwrap(),
            Statement::DropIndex { table: Some("items".to_string()), name: "tag_idx".to_string() }
        );
    }

    #[test]
    fn parse_all_splits_on_semicolons() {
        let stmts = parse_all("SHOW TABLES; SHOW DATABASES;").unwrap();
        assert_eq!(stmts, vec![Statement::ShowTables, Statement::ShowDatabases]);
    }

    #[test]
    fn reserved_words_are_rejected_as_names() {
        assert!(parse_one("CREATE DATABASE quit").is_err());
        assert!(parse_one("CREATE TABLE t (execfile INT PRIMARY KEY)").is_err());
        assert!(parse_one("CREATE TABLE quit (id INT PRIMARY KEY)").is_err());
    }

    #[test]
    fn parse_script_skips_blank_and_comment_lines() {
        let text = "-- set up the shop database\nCREATE DATABASE shop\n\nUSE shop\n-- done\n";
        let stmts = parse_script(text).unwrap();
        assert_eq!(
            stmts,
            vec![Statement::CreateDatabase("shop".to_string()), Statement::UseDatabase("shop".to_string())]
        );
    }
}
