use std::fmt;

/// The single error taxonomy shared by every storage component and
/// surfaced, unchanged, all the way up to the executor. Storage
/// primitives (disk manager, buffer pool, heap page) report booleans or
/// `Option`s; the catalog is the boundary that classifies those into one
/// of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Failed,
    DatabaseAlreadyExists,
    DatabaseNotExist,
    TableAlreadyExists,
    TableNotExist,
    IndexAlreadyExists,
    IndexNotFound,
    ColumnNameNotExist,
    ColumnNotUnique,
    KeyNotFound,
    PkDuplicate,
    UniKeyDuplicate,
    TupleTooLarge,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Failed => "FAILED",
            ErrorKind::DatabaseAlreadyExists => "DATABASE_ALREADY_EXIST",
            ErrorKind::DatabaseNotExist => "DATABASE_NOT_EXIST",
            ErrorKind::TableAlreadyExists => "TABLE_ALREADY_EXIST",
            ErrorKind::TableNotExist => "TABLE_NOT_EXIST",
            ErrorKind::IndexAlreadyExists => "INDEX_ALREADY_EXIST",
            ErrorKind::IndexNotFound => "INDEX_NOT_FOUND",
            ErrorKind::ColumnNameNotExist => "COLUMN_NAME_NOT_EXIST",
            ErrorKind::ColumnNotUnique => "COLUMN_NOT_UNIQUE",
            ErrorKind::KeyNotFound => "KEY_NOT_FOUND",
            ErrorKind::PkDuplicate => "PK_DUPLICATE",
            ErrorKind::UniKeyDuplicate => "UNI_KEY_DUPLICATE",
            ErrorKind::TupleTooLarge => "TUPLE_TOO_LARGE",
            ErrorKind::Io => "IO_ERROR",
        }
    }
}

/// A taxonomy-tagged error. Replaces the string-sentinel errors of the
/// draft this crate grew out of with a `kind` callers can match on,
/// while keeping a human message for the REPL's `Error:` line.
#[derive(Debug, Clone)]
pub struct DbError {
    kind: ErrorKind,
    message: String,
}

impl DbError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::io(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
