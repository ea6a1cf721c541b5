//! Snapshot payload parser
//!
//! Validates and normalizes the JSON-shaped snapshot payload produced by the
//! introspection collaborator. The payload format is forgiving: routines may
//! arrive as a unified `routines` array or as separate `functions` and
//! `procedures` arrays, and optional sections may be missing entirely.

use crate::error::{snapshot_error, EngineResult};
use crate::snapshot::model::{
    Column, Constraint, ConstraintKind, ForeignKey, Index, Routine, RoutineKind, SchemaDef,
    SchemaSnapshot, Table, Trigger, View,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    schemas: Vec<RawSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    views: Vec<View>,
    #[serde(default)]
    routines: Vec<RawRoutine>,
    #[serde(default)]
    functions: Vec<RawRoutine>,
    #[serde(default)]
    procedures: Vec<RawRoutine>,
    #[serde(default)]
    triggers: Vec<Trigger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTable {
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    constraints: Vec<RawConstraint>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    indexes: Vec<Index>,
    #[serde(default)]
    row_count: Option<i64>,
    #[serde(default)]
    size_bytes: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConstraint {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    definition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRoutine {
    name: String,
    #[serde(default)]
    kind: Option<RoutineKind>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    return_type: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    definition: String,
}

/// Parse and normalize an external snapshot payload
pub fn parse_snapshot(payload: Value) -> EngineResult<SchemaSnapshot> {
    if !payload.is_object() {
        return Err(snapshot_error("payload must be a JSON object"));
    }

    let raw: RawSnapshot = serde_json::from_value(payload)
        .map_err(|e| snapshot_error(format!("malformed snapshot: {}", e)))?;

    if raw.schemas.is_empty() {
        return Err(snapshot_error("payload contains no schemas"));
    }

    let mut schemas = Vec::with_capacity(raw.schemas.len());
    for raw_schema in raw.schemas {
        schemas.push(normalize_schema(raw_schema)?);
    }

    let mut snapshot = SchemaSnapshot {
        schemas,
        checksum: String::new(),
    };
    snapshot.checksum = snapshot.compute_checksum();
    Ok(snapshot)
}

fn normalize_schema(raw: RawSchema) -> EngineResult<SchemaDef> {
    let name = if raw.name.trim().is_empty() {
        "public".to_string()
    } else {
        raw.name
    };

    let mut tables = Vec::with_capacity(raw.tables.len());
    for table in raw.tables {
        tables.push(normalize_table(&name, table)?);
    }

    // Unify the three routine shapes; an explicit kind tag wins over the
    // array the entry arrived in.
    let mut routines = Vec::new();
    for r in raw.routines {
        routines.push(normalize_routine(r, RoutineKind::Function));
    }
    for r in raw.functions {
        routines.push(normalize_routine(r, RoutineKind::Function));
    }
    for r in raw.procedures {
        routines.push(normalize_routine(r, RoutineKind::Procedure));
    }

    Ok(SchemaDef {
        name,
        tables,
        views: raw.views,
        routines,
        triggers: raw.triggers,
    })
}

fn normalize_table(schema: &str, raw: RawTable) -> EngineResult<Table> {
    if raw.name.trim().is_empty() {
        return Err(snapshot_error(format!(
            "schema {} contains a table with no name",
            schema
        )));
    }

    let mut constraints = Vec::with_capacity(raw.constraints.len());
    for c in raw.constraints {
        let kind = ConstraintKind::parse(&c.kind).ok_or_else(|| {
            snapshot_error(format!(
                "constraint {} on {}.{} has unknown type '{}'",
                c.name, schema, raw.name, c.kind
            ))
        })?;
        constraints.push(Constraint {
            name: c.name,
            kind,
            columns: c.columns,
            definition: c.definition,
        });
    }

    Ok(Table {
        name: raw.name,
        columns: raw.columns,
        constraints,
        foreign_keys: raw.foreign_keys,
        indexes: raw.indexes,
        row_count: raw.row_count,
        size_bytes: raw.size_bytes,
    })
}

fn normalize_routine(raw: RawRoutine, fallback: RoutineKind) -> Routine {
    Routine {
        name: raw.name,
        kind: raw.kind.unwrap_or(fallback),
        signature: raw.signature,
        return_type: raw.return_type,
        language: raw.language,
        definition: raw.definition,
    }
}
