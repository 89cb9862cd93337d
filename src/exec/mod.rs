//! Dispatches a parsed [`Statement`] against a [`Catalog`]: index
//! acceleration for `SELECT`'s `WHERE` clause, three-valued residual
//! filtering, and the `Query OK, N rows affected (T sec)` bookkeeping
//! for DML. `CREATE`/`DROP DATABASE`, `USE`, and `EXECFILE` operate
//! above table scope and are handled by [`crate::engine`] instead.

pub mod predicate;

use crate::btree::key;
use crate::catalog::{Catalog, TableInfo};
use crate::error::{DbError, DbResult, ErrorKind};
use crate::record::{Column, Field, Row, RowId, Schema, TypeId};
use crate::sql::ast::{ColumnType, CompareOp, SelectColumns, Statement};
use predicate::{flatten_conjunction, literal_to_field, CompiledExpr};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

#[derive(Debug)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub enum ExecOutput {
    Rows(ResultSet),
    Message(String),
}

fn dml_ok(rows_affected: usize, elapsed: std::time::Duration) -> String {
    format!("Query OK, {} rows affected ({:.2} sec)", rows_affected, elapsed.as_secs_f64())
}

fn require_table<'a>(catalog: &'a Catalog, name: &str) -> DbResult<&'a TableInfo> {
    catalog.get_table(name).ok_or_else(|| DbError::new(ErrorKind::TableNotExist, name))
}

pub fn execute(catalog: &mut Catalog, statement: &Statement) -> DbResult<ExecOutput> {
    match statement {
        Statement::CreateTable { name, columns, primary_key } => create_table(catalog, name, columns, primary_key),
        Statement::DropTable(name) => {
            let start = Instant::now();
            catalog.drop_table(name)?;
            Ok(ExecOutput::Message(dml_ok(0, start.elapsed())))
        }
        Statement::CreateIndex { name, table, columns } => create_index(catalog, name, table, columns),
        Statement::DropIndex { table, name } => {
            let start = Instant::now();
            match table {
                Some(table) => catalog.drop_index(table, name)?,
                None => catalog.drop_index_by_name(name)?,
            }
            Ok(ExecOutput::Message(dml_ok(0, start.elapsed())))
        }
        Statement::ShowTables => show_tables(catalog),
        Statement::ShowIndex { table } => show_index(catalog, table.as_deref()),
        Statement::Select { table, columns, filter } => select(catalog, table, columns, filter.as_ref()),
        Statement::Insert { table, values } => insert(catalog, table, values),
        Statement::Delete { table, filter } => delete(catalog, table, filter.as_ref()),
        Statement::Update { table, assignments, filter } => update(catalog, table, assignments, filter.as_ref()),
        Statement::CreateDatabase(_)
        | Statement::DropDatabase(_)
        | Statement::ShowDatabases
        | Statement::UseDatabase(_)
        | Statement::ExecFile(_)
        | Statement::Quit => Err(DbError::failed("this statement must be handled by the engine session")),
    }
}

fn create_table(
    catalog: &mut Catalog,
    name: &str,
    columns: &[crate::sql::ast::ColumnDef],
    primary_key: &[String],
) -> DbResult<ExecOutput> {
    let start = Instant::now();
    let pk_set: HashSet<&str> = primary_key.iter().map(|s| s.as_str()).collect();
    let mut cols = Vec::with_capacity(columns.len());
    for (i, c) in columns.iter().enumerate() {
        let type_id = match c.ty {
            ColumnType::Int => TypeId::Int,
            ColumnType::Float => TypeId::Float,
            ColumnType::Char(n) => TypeId::Char(n),
        };
        let nullable = !pk_set.contains(c.name.as_str());
        cols.push(Column::new(&c.name, type_id, i, nullable, c.unique));
    }
    let schema = Schema::new(cols);
    let pk_indices = primary_key
        .iter()
        .map(|n| schema.index_of(n).ok_or_else(|| DbError::new(ErrorKind::ColumnNameNotExist, n.clone())))
        .collect::<DbResult<Vec<usize>>>()?;
    catalog.create_table(name, schema, pk_indices)?;
    Ok(ExecOutput::Message(dml_ok(0, start.elapsed())))
}

fn create_index(catalog: &mut Catalog, name: &str, table: &str, columns: &[String]) -> DbResult<ExecOutput> {
    let start = Instant::now();
    let indices = {
        let info = require_table(catalog, table)?;
        columns
            .iter()
            .map(|n| info.schema.index_of(n).ok_or_else(|| DbError::new(ErrorKind::ColumnNameNotExist, n.clone())))
            .collect::<DbResult<Vec<usize>>>()?
    };
    catalog.create_index(table, name, &indices)?;
    Ok(ExecOutput::Message(dml_ok(0, start.elapsed())))
}

fn show_tables(catalog: &Catalog) -> DbResult<ExecOutput> {
    let mut names: Vec<String> = catalog.get_tables().map(|t| t.name.clone()).collect();
    names.sort();
    Ok(ExecOutput::Rows(ResultSet {
        columns: vec!["name".to_string()],
        rows: names.into_iter().map(|n| vec![n]).collect(),
    }))
}

fn show_index(catalog: &Catalog, table: Option<&str>) -> DbResult<ExecOutput> {
    let mut rows = Vec::new();
    for idx in catalog.get_all_indexes() {
        let owner = catalog.get_tables().find(|t| t.id == idx.table_id);
        let owner_name = owner.map(|t| t.name.as_str()).unwrap_or("?");
        if let Some(wanted) = table {
            if owner_name != wanted {
                continue;
            }
        }
        let column_names = owner
            .map(|t| idx.key_map.iter().map(|&c| t.schema.column(c).name.clone()).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        rows.push(vec![idx.name.clone(), owner_name.to_string(), column_names]);
    }
    rows.sort();
    Ok(ExecOutput::Rows(ResultSet {
        columns: vec!["name".to_string(), "table".to_string(), "columns".to_string()],
        rows,
    }))
}

/// Looks for an index whose whole key-map is covered by equality legs,
/// then for single-column indexes covering any remaining leg, narrowing
/// the candidate row-id set at every step it can.
fn indexed_candidates(catalog: &Catalog, table: &TableInfo, legs: &[predicate::Conjunct]) -> Option<HashSet<RowId>> {
    let indexes = catalog.get_table_indexes(&table.name);
    let mut acc: Option<HashSet<RowId>> = None;
    let mut used = vec![false; legs.len()];

    for idx in &indexes {
        if idx.key_map.is_empty() {
            continue;
        }
        let matched: Option<Vec<usize>> = idx
            .key_map
            .iter()
            .map(|&col| legs.iter().position(|l| l.column == col && l.op == CompareOp::Eq))
            .collect();
        let matched = match matched {
            Some(m) => m,
            None => continue,
        };
        let fields: Vec<Field> = matched.iter().map(|&pos| legs[pos].value.clone()).collect();
        let packed = key::pack(&fields, idx.tree.key_width());
        let candidates: HashSet<RowId> = idx.tree.get_value(&packed).into_iter().collect();
        acc = Some(match acc {
            Some(a) => a.intersection(&candidates).copied().collect(),
            None => candidates,
        });
        for pos in matched {
            used[pos] = true;
        }
    }

    for (i, leg) in legs.iter().enumerate() {
        if used[i] || leg.op == CompareOp::Ne {
            continue;
        }
        let idx = match indexes.iter().find(|idx| idx.key_map == [leg.column]) {
            Some(idx) => idx,
            None => continue,
        };
        let key_types = [table.schema.column(leg.column).type_id];
        let packed = key::pack(std::slice::from_ref(&leg.value), idx.tree.key_width());
        let candidates: HashSet<RowId> = match leg.op {
            CompareOp::Eq => idx.tree.get_value(&packed).into_iter().collect(),
            CompareOp::Ge => idx.tree.range_from(&packed, true).map(|(_, rid)| rid).collect(),
            CompareOp::Gt => idx.tree.range_from(&packed, false).map(|(_, rid)| rid).collect(),
            CompareOp::Le => idx
                .tree
                .begin()
                .take_while(|(k, _)| key::compare(k, &packed, &key_types) != Ordering::Greater)
                .map(|(_, rid)| rid)
                .collect(),
            CompareOp::Lt => idx
                .tree
                .begin()
                .take_while(|(k, _)| key::compare(k, &packed, &key_types) == Ordering::Less)
                .map(|(_, rid)| rid)
                .collect(),
            CompareOp::Ne => unreachable!("Ne legs are skipped above"),
        };
        acc = Some(match acc {
            Some(a) => a.intersection(&candidates).copied().collect(),
            None => candidates,
        });
        used[i] = true;
    }

    acc
}

fn select(
    catalog: &Catalog,
    table: &str,
    columns: &SelectColumns,
    filter: Option<&crate::sql::ast::Expr>,
) -> DbResult<ExecOutput> {
    let info = require_table(catalog, table)?;
    let compiled = filter.map(|f| CompiledExpr::compile(f, &info.schema)).transpose()?;
    let legs = compiled.as_ref().and_then(flatten_conjunction);
    let candidates = legs.as_ref().and_then(|legs| indexed_candidates(catalog, info, legs));

    let mut rows: Vec<(RowId, Row)> = match candidates {
        Some(ids) => ids
            .into_iter()
            .filter_map(|rid| info.heap.get_tuple(rid, &info.schema).ok().flatten().map(|row| (rid, row)))
            .collect(),
        None => info.heap.iter(info.schema.clone()).collect(),
    };
    if let Some(c) = &compiled {
        rows.retain(|(_, row)| c.eval(row).is_true());
    }

    let projected: Vec<usize> = match columns {
        SelectColumns::All => (0..info.schema.len()).collect(),
        SelectColumns::Named(names) => names
            .iter()
            .map(|n| info.schema.index_of(n).ok_or_else(|| DbError::new(ErrorKind::ColumnNameNotExist, n.clone())))
            .collect::<DbResult<Vec<usize>>>()?,
    };
    let header: Vec<String> = projected.iter().map(|&i| info.schema.column(i).name.clone()).collect();
    let out_rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(_, row)| projected.iter().map(|&i| row.field(i).to_string()).collect())
        .collect();

    Ok(ExecOutput::Rows(ResultSet { columns: header, rows: out_rows }))
}

fn insert(catalog: &mut Catalog, table: &str, values: &[crate::sql::ast::Literal]) -> DbResult<ExecOutput> {
    let start = Instant::now();
    let fields: Vec<Field> = {
        let info = require_table(catalog, table)?;
        if values.len() != info.schema.len() {
            return Err(DbError::failed("value count does not match the table's column count"));
        }
        info.schema
            .columns()
            .iter()
            .zip(values)
            .map(|(col, lit)| literal_to_field(lit, col.type_id))
            .collect::<DbResult<Vec<Field>>>()?
    };
    catalog.insert(table, &Row::new(fields))?;
    Ok(ExecOutput::Message(dml_ok(1, start.elapsed())))
}

fn delete(catalog: &mut Catalog, table: &str, filter: Option<&crate::sql::ast::Expr>) -> DbResult<ExecOutput> {
    let start = Instant::now();
    let matches: Vec<RowId> = {
        let info = require_table(catalog, table)?;
        let compiled = filter.map(|f| CompiledExpr::compile(f, &info.schema)).transpose()?;
        info.heap
            .iter(info.schema.clone())
            .filter(|(_, row)| compiled.as_ref().map(|c| c.eval(row).is_true()).unwrap_or(true))
            .map(|(rid, _)| rid)
            .collect()
    };
    let count = matches.len();
    for rid in matches {
        catalog.delete(table, rid)?;
    }
    Ok(ExecOutput::Message(dml_ok(count, start.elapsed())))
}

fn update(
    catalog: &mut Catalog,
    table: &str,
    assignments: &[(String, crate::sql::ast::Literal)],
    filter: Option<&crate::sql::ast::Expr>,
) -> DbResult<ExecOutput> {
    let start = Instant::now();
    let (assigns, matches): (Vec<(usize, Field)>, Vec<(RowId, Row)>) = {
        let info = require_table(catalog, table)?;
        let assigns = assignments
            .iter()
            .map(|(name, lit)| {
                let idx = info.schema.index_of(name).ok_or_else(|| DbError::new(ErrorKind::ColumnNameNotExist, name.clone()))?;
                let field = literal_to_field(lit, info.schema.column(idx).type_id)?;
                Ok((idx, field))
            })
            .collect::<DbResult<Vec<(usize, Field)>>>()?;
        let compiled = filter.map(|f| CompiledExpr::compile(f, &info.schema)).transpose()?;
        let matches = info
            .heap
            .iter(info.schema.clone())
            .filter(|(_, row)| compiled.as_ref().map(|c| c.eval(row).is_true()).unwrap_or(true))
            .collect();
        (assigns, matches)
    };
    let count = matches.len();
    for (rid, mut row) in matches {
        for (idx, field) in &assigns {
            row.set_field(*idx, field.clone());
        }
        catalog.update(table, rid, &row)?;
    }
    Ok(ExecOutput::Message(dml_ok(count, start.elapsed())))
}

/// Fixed-width tabular rendering of a [`ResultSet`]: header sized to the
/// widest value in its column, rows numbered from 0, per spec §6.3.
pub fn format_result_set(result: &ResultSet) -> String {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &result.rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }
    let row_num_width = result.rows.len().saturating_sub(1).to_string().len().max(1);

    let mut out = String::new();
    out.push_str(&" ".repeat(row_num_width + 2));
    for (i, name) in result.columns.iter().enumerate() {
        out.push_str(&format!("{:<width$} ", name, width = widths[i]));
    }
    out.push('\n');

    for (row_index, row) in result.rows.iter().enumerate() {
        out.push_str(&format!("{:>width$}  ", row_index, width = row_num_width));
        for (i, cell) in row.iter().enumerate() {
            out.push_str(&format!("{:<width$} ", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferPool, ReplacerPolicy};
    use crate::disk::DiskManager;
    use crate::sql::ast::{ColumnDef, Expr, Literal};
    use tempfile::NamedTempFile;

    fn catalog() -> Catalog {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let disk = DiskManager::open(file.path(), 4096).unwrap();
        std::mem::forget(file);
        let pool = BufferPool::new(disk, 64, ReplacerPolicy::Lru);
        Catalog::create(pool).unwrap()
    }

    fn create_users(catalog: &mut Catalog) {
        let stmt = Statement::CreateTable {
            name: "users".to_string(),
            columns: vec![
                ColumnDef { name: "id".to_string(), ty: ColumnType::Int, unique: false },
                ColumnDef { name: "name".to_string(), ty: ColumnType::Char(16), unique: true },
            ],
            primary_key: vec!["id".to_string()],
        };
        execute(catalog, &stmt).unwrap();
    }

    fn insert_user(catalog: &mut Catalog, id: i32, name: &str) {
        let stmt = Statement::Insert {
            table: "users".to_string(),
            values: vec![Literal::Int(id), Literal::Str(name.to_string())],
        };
        execute(catalog, &stmt).unwrap();
    }

    #[test]
    fn select_with_equality_filter_uses_the_primary_key_index() {
        let mut catalog = catalog();
        create_users(&mut catalog);
        for i in 0..50 {
            insert_user(&mut catalog, i, "x");
        }
        let stmt = Statement::Select {
            table: "users".to_string(),
            columns: SelectColumns::All,
            filter: Some(Expr::Compare { column: "id".to_string(), op: CompareOp::Eq, value: Literal::Int(7) }),
        };
        match execute(&mut catalog, &stmt).unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 1),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn insert_then_delete_then_select_reflects_the_change() {
        let mut catalog = catalog();
        create_users(&mut catalog);
        insert_user(&mut catalog, 1, "alice");
        insert_user(&mut catalog, 2, "bob");
        execute(
            &mut catalog,
            &Statement::Delete {
                table: "users".to_string(),
                filter: Some(Expr::Compare { column: "id".to_string(), op: CompareOp::Eq, value: Literal::Int(1) }),
            },
        )
        .unwrap();
        match execute(&mut catalog, &Statement::Select { table: "users".to_string(), columns: SelectColumns::All, filter: None }).unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 1),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn update_changes_the_unique_column_and_its_index() {
        let mut catalog = catalog();
        create_users(&mut catalog);
        insert_user(&mut catalog, 1, "alice");
        execute(
            &mut catalog,
            &Statement::Update {
                table: "users".to_string(),
                assignments: vec![("name".to_string(), Literal::Str("alicia".to_string()))],
                filter: Some(Expr::Compare { column: "id".to_string(), op: CompareOp::Eq, value: Literal::Int(1) }),
            },
        )
        .unwrap();
        let err = execute(&mut catalog, &Statement::Insert { table: "users".to_string(), values: vec![Literal::Int(2), Literal::Str("alicia".to_string())] })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniKeyDuplicate);
    }

    #[test]
    fn range_filter_uses_the_index_for_inequalities() {
        let mut catalog = catalog();
        create_users(&mut catalog);
        for i in 0..20 {
            insert_user(&mut catalog, i, "x");
        }
        let stmt = Statement::Select {
            table: "users".to_string(),
            columns: SelectColumns::Named(vec!["id".to_string()]),
            filter: Some(Expr::Compare { column: "id".to_string(), op: CompareOp::Ge, value: Literal::Int(15) }),
        };
        match execute(&mut catalog, &stmt).unwrap() {
            ExecOutput::Rows(rs) => assert_eq!(rs.rows.len(), 5),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn format_result_set_pads_columns_to_widest_value() {
        let rs = ResultSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec!["1".to_string(), "alice".to_string()], vec!["2".to_string(), "bob".to_string()]],
        };
        let text = format_result_set(&rs);
        assert!(text.contains("alice"));
        assert!(text.lines().count() == 3);
    }
}
