//! Schema snapshot model
//!
//! Typed in-memory representation of a database schema at a point in time.
//! Snapshots are captured by an introspection collaborator and handed to the
//! engine as read-only input; every simulation clones the snapshot before
//! mutating anything.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable (schema, table) identity used across diffs, graphs and reports
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Complete schema snapshot at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub schemas: Vec<SchemaDef>,
    /// Content checksum, recomputed when the payload is parsed
    #[serde(default)]
    pub checksum: String,
}

/// One named schema and everything it owns
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub routines: Vec<Routine>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// Table representation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Planner row estimate, if the introspector captured one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    /// Total relation size in bytes, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> i64 {
        self.row_count.unwrap_or(0).max(0)
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Constraint kinds the engine models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey,
}

impl ConstraintKind {
    /// Parse the type tag used in snapshot payloads ("PRIMARY KEY", "CHECK", ...)
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_uppercase().replace('_', " ").as_str() {
            "PRIMARY KEY" | "P" => Some(ConstraintKind::PrimaryKey),
            "UNIQUE" | "U" => Some(ConstraintKind::Unique),
            "CHECK" | "C" => Some(ConstraintKind::Check),
            "FOREIGN KEY" | "F" => Some(ConstraintKind::ForeignKey),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::PrimaryKey => write!(f, "PRIMARY KEY"),
            ConstraintKind::Unique => write!(f, "UNIQUE"),
            ConstraintKind::Check => write!(f, "CHECK"),
            ConstraintKind::ForeignKey => write!(f, "FOREIGN KEY"),
        }
    }
}

/// Table constraint (primary key, unique, check or foreign key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Raw definition text, when the introspector captured it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// Foreign key relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    #[serde(default)]
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
}

/// Index representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary: bool,
    /// Access method (btree, gin, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Partial-index predicate text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

/// View representation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub name: String,
    #[serde(default)]
    pub definition: String,
}

/// Routine kinds (functions and procedures are unified)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    #[default]
    Function,
    Procedure,
}

/// Stored routine (function or procedure)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub name: String,
    #[serde(default)]
    pub kind: RoutineKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub definition: String,
}

/// Trigger attached to a table
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    /// Table the trigger fires on (unqualified, within the owning schema)
    pub table: String,
    /// UPDATE OF column list, when declared
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub definition: String,
}

impl SchemaSnapshot {
    pub fn schema(&self, name: &str) -> Option<&SchemaDef> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn schema_mut(&mut self, name: &str) -> Option<&mut SchemaDef> {
        self.schemas.iter_mut().find(|s| s.name == name)
    }

    /// Look up a table by (schema, table) identity
    pub fn table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.schema(schema)
            .and_then(|s| s.tables.iter().find(|t| t.name == table))
    }

    pub fn table_mut(&mut self, schema: &str, table: &str) -> Option<&mut Table> {
        self.schema_mut(schema)
            .and_then(|s| s.tables.iter_mut().find(|t| t.name == table))
    }

    /// Get an existing schema or insert an empty one
    pub fn schema_or_insert(&mut self, name: &str) -> &mut SchemaDef {
        if let Some(pos) = self.schemas.iter().position(|s| s.name == name) {
            &mut self.schemas[pos]
        } else {
            self.schemas.push(SchemaDef {
                name: name.to_string(),
                ..Default::default()
            });
            self.schemas.last_mut().unwrap()
        }
    }

    /// Iterate all tables as (schema name, table)
    pub fn all_tables(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.schemas
            .iter()
            .flat_map(|s| s.tables.iter().map(move |t| (s.name.as_str(), t)))
    }

    /// Compute a content checksum over structural identity
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();

        let mut table_keys: Vec<String> = self
            .all_tables()
            .map(|(schema, t)| format!("{}.{}", schema, t.name))
            .collect();
        table_keys.sort();
        for key in &table_keys {
            hasher.update(key.as_bytes());
        }

        for (schema, table) in self.all_tables() {
            for col in &table.columns {
                hasher.update(
                    format!("{}.{}.{}:{}", schema, table.name, col.name, col.data_type).as_bytes(),
                );
            }
            for fk in &table.foreign_keys {
                hasher.update(
                    format!("FK:{}->{}.{}", fk.name, fk.referenced_schema, fk.referenced_table)
                        .as_bytes(),
                );
            }
            for idx in &table.indexes {
                hasher.update(format!("IDX:{}:{}", idx.name, idx.columns.join(",")).as_bytes());
            }
        }

        format!("{:x}", hasher.finalize())
    }
}
