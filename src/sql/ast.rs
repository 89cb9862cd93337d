//! The executor's contract boundary: a statement tree independent of
//! whatever parser produced it. [`crate::sql::parse`] is the only
//! producer in this crate; tests build these directly.

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Int,
    Float,
    Char(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Str(String),
    Null,
}

/// A `WHERE` expression tree: comparisons over `{=, <>, <=, >=, <, >}`
/// and `IS [NOT] NULL`, combined with `AND`/`OR`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare { column: String, op: CompareOp, value: Literal },
    IsNull(String),
    IsNotNull(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumns {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateDatabase(String),
    DropDatabase(String),
    ShowDatabases,
    UseDatabase(String),
    ShowTables,
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    },
    DropTable(String),
    ShowIndex {
        table: Option<String>,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
    },
    DropIndex {
        table: Option<String>,
        name: String,
    },
    Select {
        table: String,
        columns: SelectColumns,
        filter: Option<Expr>,
    },
    Insert {
        table: String,
        values: Vec<Literal>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Literal)>,
        filter: Option<Expr>,
    },
    ExecFile(String),
    Quit,
}
