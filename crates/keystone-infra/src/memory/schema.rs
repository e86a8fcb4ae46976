//! Table layout and row representation for the in-memory engine.
//!
//! The layout mirrors the PostgreSQL schema created by the migration crate,
//! including constraint names, so both backends report the same failures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// `varchar(n)`
    Text { max_len: usize },
    Bool,
    Uuid,
}

impl ColumnType {
    pub fn sql_name(&self) -> String {
        match self {
            Self::Text { max_len } => format!("character varying({max_len})"),
            Self::Bool => "boolean".to_owned(),
            Self::Uuid => "uuid".to_owned(),
        }
    }
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

#[derive(Debug)]
pub struct UniqueConstraint {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// References `table.id`; deleting the referenced row cascades.
#[derive(Debug)]
pub struct ForeignKey {
    pub name: &'static str,
    pub column: &'static str,
    pub table: &'static str,
}

/// Text column that must not be blank.
#[derive(Debug)]
pub struct CheckConstraint {
    pub name: &'static str,
    pub column: &'static str,
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub unique: &'static [UniqueConstraint],
    pub foreign_keys: &'static [ForeignKey],
    pub checks: &'static [CheckConstraint],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}

const fn text(name: &'static str, max_len: usize, nullable: bool) -> Column {
    Column {
        name,
        ty: ColumnType::Text { max_len },
        nullable,
    }
}

pub static USERS: TableSchema = TableSchema {
    name: "users",
    columns: &[
        text("email", 255, false),
        text("password_hash", 255, false),
        text("full_name", 255, false),
        Column {
            name: "is_active",
            ty: ColumnType::Bool,
            nullable: false,
        },
    ],
    unique: &[UniqueConstraint {
        name: "users_email_key",
        columns: &["email"],
    }],
    foreign_keys: &[],
    checks: &[],
};

pub static ROLES: TableSchema = TableSchema {
    name: "roles",
    columns: &[text("name", 255, false), text("description", 255, true)],
    unique: &[UniqueConstraint {
        name: "roles_name_key",
        columns: &["name"],
    }],
    foreign_keys: &[],
    checks: &[CheckConstraint {
        name: "roles_name_check",
        column: "name",
    }],
};

pub static CONTACTS: TableSchema = TableSchema {
    name: "contacts",
    columns: &[
        Column {
            name: "user_id",
            ty: ColumnType::Uuid,
            nullable: false,
        },
        text("phone", 32, false),
        text("address", 255, true),
        text("city", 255, true),
        text("country", 255, true),
        text("zip_code", 255, true),
    ],
    unique: &[UniqueConstraint {
        name: "contacts_user_id_key",
        columns: &["user_id"],
    }],
    foreign_keys: &[ForeignKey {
        name: "contacts_user_id_fkey",
        column: "user_id",
        table: "users",
    }],
    checks: &[],
};

/// The composite primary key of the link table is modelled as a unique
/// constraint; rows still carry a surrogate id internally.
pub static USER_ROLES: TableSchema = TableSchema {
    name: "user_roles",
    columns: &[
        Column {
            name: "user_id",
            ty: ColumnType::Uuid,
            nullable: false,
        },
        Column {
            name: "role_id",
            ty: ColumnType::Uuid,
            nullable: false,
        },
    ],
    unique: &[UniqueConstraint {
        name: "user_roles_pkey",
        columns: &["user_id", "role_id"],
    }],
    foreign_keys: &[
        ForeignKey {
            name: "user_roles_user_id_fkey",
            column: "user_id",
            table: "users",
        },
        ForeignKey {
            name: "user_roles_role_id_fkey",
            column: "role_id",
            table: "roles",
        },
    ],
    checks: &[],
};

pub static TABLES: [&TableSchema; 4] = [&USERS, &ROLES, &CONTACTS, &USER_ROLES];

pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().copied().find(|schema| schema.name == name)
}

/// A stored column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Null,
    Bool(bool),
    Text(String),
    Uuid(Uuid),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Renders like PostgreSQL does inside `DETAIL:` lines.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(true) => f.write_str("t"),
            Self::Bool(false) => f.write_str("f"),
            Self::Text(text) => f.write_str(text),
            Self::Uuid(id) => write!(f, "{id}"),
        }
    }
}

static NULL: Value = Value::Null;

pub type Values = BTreeMap<&'static str, Value>;

/// One stored record. `id` and the timestamps are managed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub values: Values,
}

impl Row {
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn matches(&self, column: &str, expected: &Value) -> bool {
        if column == "id" {
            return matches!(expected, Value::Uuid(id) if *id == self.id);
        }
        self.get(column) == expected
    }

    pub fn text(&self, column: &'static str) -> Result<String, RowError> {
        match self.get(column) {
            Value::Text(text) => Ok(text.clone()),
            other => Err(RowError::mismatch(column, "text", other)),
        }
    }

    pub fn optional_text(&self, column: &'static str) -> Result<Option<String>, RowError> {
        match self.get(column) {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text.clone())),
            other => Err(RowError::mismatch(column, "text", other)),
        }
    }

    pub fn flag(&self, column: &'static str) -> Result<bool, RowError> {
        match self.get(column) {
            Value::Bool(flag) => Ok(*flag),
            other => Err(RowError::mismatch(column, "boolean", other)),
        }
    }

    pub fn uuid(&self, column: &'static str) -> Result<Uuid, RowError> {
        match self.get(column) {
            Value::Uuid(id) => Ok(*id),
            other => Err(RowError::mismatch(column, "uuid", other)),
        }
    }
}

/// A stored row that cannot be turned back into an entity.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("column '{column}' holds {found}, expected {expected}")]
    Mismatch {
        column: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("column '{column}' is invalid: {reason}")]
    Invalid { column: &'static str, reason: String },
}

impl RowError {
    fn mismatch(column: &'static str, expected: &'static str, found: &Value) -> Self {
        Self::Mismatch {
            column,
            expected,
            found: format!("{found:?}"),
        }
    }
}
