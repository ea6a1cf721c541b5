//! In-memory DDL interpreter
//!
//! Applies one parsed statement to a snapshot and returns the resulting
//! snapshot. The input snapshot is never mutated; a failed application leaves
//! the caller holding the unchanged original, which is what lets the pipeline
//! apply scripts best-effort.
//!
//! Object naming follows Postgres conventions: `{table}_pkey`,
//! `{table}_{cols}_key`, `{table}_{cols}_fkey`, `{table}_{cols}_check` and
//! `{table}_{cols}_idx` for unnamed objects.

use crate::error::{apply_error, EngineResult};
use crate::parser::{
    AlterAction, AlterTable, ColumnAlter, ColumnDef, CreateIndex, CreateTable, DropIndex,
    DropTable, FkReference, Statement, TableConstraintDef,
};
use crate::snapshot::model::{
    Column, Constraint, ConstraintKind, ForeignKey, Index, SchemaSnapshot, Table,
};

/// Apply a single statement, returning the next snapshot state
pub fn apply_statement(
    snapshot: &SchemaSnapshot,
    statement: &Statement,
    default_schema: &str,
) -> EngineResult<SchemaSnapshot> {
    let mut next = snapshot.clone();
    match statement {
        Statement::CreateTable(ct) => apply_create_table(&mut next, ct, default_schema)?,
        Statement::AlterTable(at) => apply_alter_table(&mut next, at, default_schema)?,
        Statement::DropTable(dt) => apply_drop_table(&mut next, dt, default_schema)?,
        Statement::CreateIndex(ci) => apply_create_index(&mut next, ci, default_schema)?,
        Statement::DropIndex(di) => apply_drop_index(&mut next, di, default_schema)?,
        Statement::Unrecognized => {
            return Err(apply_error("cannot apply an unrecognized statement"))
        }
    }
    Ok(next)
}

fn apply_create_table(
    snapshot: &mut SchemaSnapshot,
    ct: &CreateTable,
    default_schema: &str,
) -> EngineResult<()> {
    let (schema, name) = ct.name.qualify(default_schema);
    if snapshot.table(&schema, &name).is_some() {
        if ct.if_not_exists {
            return Ok(());
        }
        return Err(apply_error(format!("table {}.{} already exists", schema, name)));
    }

    let mut table = Table {
        name: name.clone(),
        ..Default::default()
    };

    for def in &ct.columns {
        add_column_objects(&mut table, def, default_schema);
    }
    for constraint in &ct.constraints {
        add_table_constraint(&mut table, constraint, default_schema)?;
    }

    snapshot.schema_or_insert(&schema).tables.push(table);
    Ok(())
}

/// Add the column itself plus any objects its inline clauses imply
fn add_column_objects(table: &mut Table, def: &ColumnDef, default_schema: &str) {
    table.columns.push(Column {
        name: def.name.clone(),
        data_type: def.data_type.clone(),
        nullable: def.nullable && !def.inline_primary_key,
        default: def.default.clone(),
    });

    if def.inline_primary_key {
        table.constraints.push(Constraint {
            name: format!("{}_pkey", table.name),
            kind: ConstraintKind::PrimaryKey,
            columns: vec![def.name.clone()],
            definition: None,
        });
    }
    if def.inline_unique {
        table.constraints.push(Constraint {
            name: format!("{}_{}_key", table.name, def.name),
            kind: ConstraintKind::Unique,
            columns: vec![def.name.clone()],
            definition: None,
        });
    }
    if let Some(check) = &def.check {
        table.constraints.push(Constraint {
            name: format!("{}_{}_check", table.name, def.name),
            kind: ConstraintKind::Check,
            columns: vec![def.name.clone()],
            definition: Some(check.clone()),
        });
    }
    if let Some(reference) = &def.references {
        let fk = build_foreign_key(
            format!("{}_{}_fkey", table.name, def.name),
            vec![def.name.clone()],
            reference,
            default_schema,
        );
        table.foreign_keys.push(fk);
    }
}

fn add_table_constraint(
    table: &mut Table,
    def: &TableConstraintDef,
    default_schema: &str,
) -> EngineResult<()> {
    let name = def
        .name
        .clone()
        .unwrap_or_else(|| synthesize_constraint_name(&table.name, def));

    if table.constraint(&name).is_some() || table.foreign_keys.iter().any(|fk| fk.name == name) {
        return Err(apply_error(format!(
            "constraint {} already exists on {}",
            name, table.name
        )));
    }

    if def.kind == ConstraintKind::ForeignKey {
        let reference = def
            .reference
            .as_ref()
            .ok_or_else(|| apply_error(format!("foreign key {} has no REFERENCES target", name)))?;
        let fk = build_foreign_key(name, def.columns.clone(), reference, default_schema);
        table.foreign_keys.push(fk);
    } else {
        table.constraints.push(Constraint {
            name,
            kind: def.kind,
            columns: def.columns.clone(),
            definition: def.expression.clone(),
        });
    }
    Ok(())
}

fn synthesize_constraint_name(table: &str, def: &TableConstraintDef) -> String {
    let cols = def.columns.join("_");
    match def.kind {
        ConstraintKind::PrimaryKey => format!("{}_pkey", table),
        ConstraintKind::Unique => format!("{}_{}_key", table, cols),
        ConstraintKind::ForeignKey => format!("{}_{}_fkey", table, cols),
        ConstraintKind::Check => {
            if cols.is_empty() {
                format!("{}_check", table)
            } else {
                format!("{}_{}_check", table, cols)
            }
        }
    }
}

fn build_foreign_key(
    name: String,
    columns: Vec<String>,
    reference: &FkReference,
    default_schema: &str,
) -> ForeignKey {
    let (referenced_schema, referenced_table) = reference.table.qualify(default_schema);
    ForeignKey {
        name,
        columns,
        referenced_schema,
        referenced_table,
        referenced_columns: reference.columns.clone(),
        on_update: reference.on_update.clone(),
        on_delete: reference.on_delete.clone(),
    }
}

fn apply_alter_table(
    snapshot: &mut SchemaSnapshot,
    at: &AlterTable,
    default_schema: &str,
) -> EngineResult<()> {
    let (schema, name) = at.table.qualify(default_schema);
    if snapshot.table(&schema, &name).is_none() {
        return Err(apply_error(format!("table {}.{} does not exist", schema, name)));
    }

    for action in &at.actions {
        match action {
            AlterAction::AddColumn { if_not_exists, def } => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                if table.column(&def.name).is_some() {
                    if *if_not_exists {
                        continue;
                    }
                    return Err(apply_error(format!(
                        "column {} already exists on {}.{}",
                        def.name, schema, name
                    )));
                }
                add_column_objects(table, def, default_schema);
            }
            AlterAction::DropColumn {
                name: column,
                if_exists,
                ..
            } => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                if table.column(column).is_none() {
                    if *if_exists {
                        continue;
                    }
                    return Err(apply_error(format!(
                        "column {} does not exist on {}.{}",
                        column, schema, name
                    )));
                }
                drop_column(table, column);
            }
            AlterAction::AlterColumn { name: column, change } => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                let col = table.column_mut(column).ok_or_else(|| {
                    apply_error(format!(
                        "column {} does not exist on {}.{}",
                        column, schema, name
                    ))
                })?;
                match change {
                    ColumnAlter::SetType { data_type } => col.data_type = data_type.clone(),
                    ColumnAlter::SetDefault { expr } => col.default = Some(expr.clone()),
                    ColumnAlter::DropDefault => col.default = None,
                    ColumnAlter::SetNotNull => col.nullable = false,
                    ColumnAlter::DropNotNull => col.nullable = true,
                }
            }
            AlterAction::RenameColumn { from, to } => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                if table.column(from).is_none() {
                    return Err(apply_error(format!(
                        "column {} does not exist on {}.{}",
                        from, schema, name
                    )));
                }
                if table.column(to).is_some() {
                    return Err(apply_error(format!(
                        "column {} already exists on {}.{}",
                        to, schema, name
                    )));
                }
                rename_column(table, from, to);
            }
            AlterAction::AddConstraint(def) => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                add_table_constraint(table, def, default_schema)?;
            }
            AlterAction::DropConstraint {
                name: constraint,
                if_exists,
                ..
            } => {
                let table = snapshot.table_mut(&schema, &name).unwrap();
                let in_constraints = table.constraints.iter().any(|c| &c.name == constraint);
                let in_fks = table.foreign_keys.iter().any(|fk| &fk.name == constraint);
                if !in_constraints && !in_fks {
                    if *if_exists {
                        continue;
                    }
                    return Err(apply_error(format!(
                        "constraint {} does not exist on {}.{}",
                        constraint, schema, name
                    )));
                }
                table.constraints.retain(|c| &c.name != constraint);
                table.foreign_keys.retain(|fk| &fk.name != constraint);
            }
            AlterAction::RenameTo { name: new_name } => {
                if snapshot.table(&schema, new_name).is_some() {
                    return Err(apply_error(format!(
                        "table {}.{} already exists",
                        schema, new_name
                    )));
                }
                rename_table(snapshot, &schema, &name, new_name);
                // Later actions in the same statement would target the old
                // name; the parser only produces RENAME TO alone, so none
                // follow.
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Remove a column and everything that depends on it: indexes covering it,
/// constraints listing it, and foreign keys declared on it.
fn drop_column(table: &mut Table, column: &str) {
    table.columns.retain(|c| c.name != column);
    table
        .indexes
        .retain(|idx| !idx.columns.iter().any(|c| c.as_str() == column));
    table
        .constraints
        .retain(|constraint| !constraint.columns.iter().any(|c| c.as_str() == column));
    table
        .foreign_keys
        .retain(|fk| !fk.columns.iter().any(|c| c.as_str() == column));
}

/// Rename a column everywhere it is referenced within its own table
fn rename_column(table: &mut Table, from: &str, to: &str) {
    if let Some(col) = table.column_mut(from) {
        col.name = to.to_string();
    }
    for idx in &mut table.indexes {
        for c in &mut idx.columns {
            if c.as_str() == from {
                *c = to.to_string();
            }
        }
    }
    for constraint in &mut table.constraints {
        for c in &mut constraint.columns {
            if c.as_str() == from {
                *c = to.to_string();
            }
        }
    }
    for fk in &mut table.foreign_keys {
        for c in &mut fk.columns {
            if c.as_str() == from {
                *c = to.to_string();
            }
        }
    }
}

/// Rename a table and repoint foreign keys across the snapshot
fn rename_table(snapshot: &mut SchemaSnapshot, schema: &str, from: &str, to: &str) {
    if let Some(table) = snapshot.table_mut(schema, from) {
        table.name = to.to_string();
    }
    for s in &mut snapshot.schemas {
        for table in &mut s.tables {
            for fk in &mut table.foreign_keys {
                if fk.referenced_schema == schema && fk.referenced_table == from {
                    fk.referenced_table = to.to_string();
                }
            }
        }
    }
}

fn apply_drop_table(
    snapshot: &mut SchemaSnapshot,
    dt: &DropTable,
    default_schema: &str,
) -> EngineResult<()> {
    for target in &dt.tables {
        let (schema, name) = target.qualify(default_schema);
        if snapshot.table(&schema, &name).is_none() {
            if dt.if_exists {
                continue;
            }
            return Err(apply_error(format!("table {}.{} does not exist", schema, name)));
        }

        // Inbound foreign keys block a plain drop
        let referencing: Vec<String> = snapshot
            .all_tables()
            .filter(|(s, t)| !(*s == schema && t.name == name))
            .filter(|(_, t)| {
                t.foreign_keys
                    .iter()
                    .any(|fk| fk.referenced_schema == schema && fk.referenced_table == name)
            })
            .map(|(s, t)| format!("{}.{}", s, t.name))
            .collect();
        if !referencing.is_empty() && !dt.cascade {
            return Err(apply_error(format!(
                "cannot drop {}.{}: referenced by foreign keys from {}",
                schema,
                name,
                referencing.join(", ")
            )));
        }

        if dt.cascade {
            for s in &mut snapshot.schemas {
                for table in &mut s.tables {
                    table
                        .foreign_keys
                        .retain(|fk| !(fk.referenced_schema == schema && fk.referenced_table == name));
                }
            }
        }
        if let Some(s) = snapshot.schema_mut(&schema) {
            s.tables.retain(|t| t.name != name);
        }
    }
    Ok(())
}

fn apply_create_index(
    snapshot: &mut SchemaSnapshot,
    ci: &CreateIndex,
    default_schema: &str,
) -> EngineResult<()> {
    let (schema, name) = ci.table.qualify(default_schema);
    let table = snapshot.table_mut(&schema, &name).ok_or_else(|| {
        apply_error(format!("table {}.{} does not exist", schema, name))
    })?;

    let index_name = ci
        .name
        .clone()
        .unwrap_or_else(|| synthesize_index_name(&table.name, &ci.columns));

    if table.indexes.iter().any(|idx| idx.name == index_name) {
        if ci.if_not_exists {
            return Ok(());
        }
        return Err(apply_error(format!(
            "index {} already exists on {}.{}",
            index_name, schema, name
        )));
    }

    table.indexes.push(Index {
        name: index_name,
        columns: ci.columns.clone(),
        unique: ci.unique,
        primary: false,
        method: ci.method.clone(),
        predicate: ci.predicate.clone(),
    });
    Ok(())
}

/// Build `{table}_{cols}_idx` from the column list, keeping only identifier
/// characters from expression columns.
fn synthesize_index_name(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            c.chars()
                .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                .collect::<String>()
        })
        .filter(|c| !c.is_empty())
        .collect();
    if cols.is_empty() {
        format!("{}_idx", table)
    } else {
        format!("{}_{}_idx", table, cols.join("_"))
    }
}

fn apply_drop_index(
    snapshot: &mut SchemaSnapshot,
    di: &DropIndex,
    default_schema: &str,
) -> EngineResult<()> {
    for target in &di.indexes {
        let (schema, index_name) = target.qualify(default_schema);

        let mut found = false;
        if let Some(s) = snapshot.schema_mut(&schema) {
            for table in &mut s.tables {
                let before = table.indexes.len();
                table.indexes.retain(|idx| idx.name != index_name);
                if table.indexes.len() != before {
                    found = true;
                    break;
                }
            }
        }

        if !found && !di.if_exists {
            return Err(apply_error(format!(
                "index {}.{} does not exist",
                schema, index_name
            )));
        }
    }
    Ok(())
}
