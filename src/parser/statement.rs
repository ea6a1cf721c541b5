//! DDL statement parser
//!
//! A best-effort recursive-descent scanner over one already-split statement.
//! The engine deliberately does not implement a full SQL grammar: it
//! recognizes the DDL subset it can simulate and maps everything else to
//! `Statement::Unrecognized`, which downstream stages skip silently while
//! still counting it toward confidence.

use crate::parser::tokens::{split_top_level, Cursor, QualifiedName};
use crate::snapshot::model::ConstraintKind;

/// A recognized (or explicitly unrecognized) DDL statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    DropTable(DropTable),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub if_not_exists: bool,
    pub name: QualifiedName,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraintDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTable {
    pub table: QualifiedName,
    pub actions: Vec<AlterAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    AddColumn {
        if_not_exists: bool,
        def: ColumnDef,
    },
    DropColumn {
        name: String,
        if_exists: bool,
        cascade: bool,
    },
    AlterColumn {
        name: String,
        change: ColumnAlter,
    },
    RenameColumn {
        from: String,
        to: String,
    },
    AddConstraint(TableConstraintDef),
    DropConstraint {
        name: String,
        if_exists: bool,
        cascade: bool,
    },
    RenameTo {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAlter {
    SetType { data_type: String },
    SetDefault { expr: String },
    DropDefault,
    SetNotNull,
    DropNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    pub if_exists: bool,
    pub tables: Vec<QualifiedName>,
    pub cascade: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndex {
    pub unique: bool,
    pub concurrently: bool,
    pub if_not_exists: bool,
    pub name: Option<String>,
    pub table: QualifiedName,
    pub method: Option<String>,
    pub columns: Vec<String>,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndex {
    pub concurrently: bool,
    pub if_exists: bool,
    pub indexes: Vec<QualifiedName>,
    pub cascade: bool,
}

/// Parsed column definition from CREATE TABLE or ADD COLUMN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub inline_primary_key: bool,
    pub inline_unique: bool,
    pub references: Option<FkReference>,
    pub check: Option<String>,
}

/// Parsed table-level constraint definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConstraintDef {
    pub name: Option<String>,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    /// CHECK expression text, when applicable
    pub expression: Option<String>,
    pub reference: Option<FkReference>,
}

/// REFERENCES target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkReference {
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

/// Keywords that terminate a data type or default expression in a column def
const COLUMN_STOPS: &[&str] = &[
    "NOT",
    "NULL",
    "DEFAULT",
    "PRIMARY",
    "UNIQUE",
    "REFERENCES",
    "CHECK",
    "CONSTRAINT",
    "GENERATED",
    "COLLATE",
];

impl Statement {
    /// Parse one statement, mapping anything the scanner cannot handle to
    /// `Unrecognized`.
    pub fn parse(sql: &str) -> Statement {
        try_parse(sql).unwrap_or(Statement::Unrecognized)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Statement::Unrecognized)
    }
}

fn try_parse(sql: &str) -> Option<Statement> {
    let mut cursor = Cursor::new(sql);

    if cursor.eat_keyword("CREATE") {
        let unique = cursor.eat_keyword("UNIQUE");
        if cursor.eat_keyword("TABLE") {
            if unique {
                return None;
            }
            return parse_create_table(&mut cursor);
        }
        if cursor.eat_keyword("INDEX") {
            return parse_create_index(&mut cursor, unique);
        }
        return None;
    }

    if cursor.eat_keywords(&["ALTER", "TABLE"]) {
        return parse_alter_table(&mut cursor);
    }

    if cursor.eat_keywords(&["DROP", "TABLE"]) {
        return parse_drop_table(&mut cursor);
    }

    if cursor.eat_keywords(&["DROP", "INDEX"]) {
        return parse_drop_index(&mut cursor);
    }

    None
}

fn parse_create_table(cursor: &mut Cursor) -> Option<Statement> {
    let if_not_exists = cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);
    let name = cursor.read_qualified_name()?;
    let body = cursor.read_paren_block()?;

    let mut columns = Vec::new();
    let mut constraints = Vec::new();
    for item in split_top_level(&body, ',') {
        let mut item_cursor = Cursor::new(&item);
        if item_cursor.peek_keyword("CONSTRAINT")
            || item_cursor.peek_keyword("PRIMARY")
            || item_cursor.peek_keyword("UNIQUE")
            || item_cursor.peek_keyword("CHECK")
            || item_cursor.peek_keyword("FOREIGN")
        {
            constraints.push(parse_table_constraint(&mut item_cursor)?);
        } else {
            columns.push(parse_column_def(&mut item_cursor)?);
        }
    }

    Some(Statement::CreateTable(CreateTable {
        if_not_exists,
        name,
        columns,
        constraints,
    }))
}

fn parse_alter_table(cursor: &mut Cursor) -> Option<Statement> {
    cursor.eat_keyword("ONLY");
    let table = cursor.read_qualified_name()?;

    // RENAME forms cannot be combined with other actions
    if cursor.eat_keyword("RENAME") {
        if cursor.eat_keyword("TO") {
            let name = cursor.read_identifier()?;
            return Some(Statement::AlterTable(AlterTable {
                table,
                actions: vec![AlterAction::RenameTo { name }],
            }));
        }
        cursor.eat_keyword("COLUMN");
        let from = cursor.read_identifier()?;
        if !cursor.eat_keyword("TO") {
            return None;
        }
        let to = cursor.read_identifier()?;
        return Some(Statement::AlterTable(AlterTable {
            table,
            actions: vec![AlterAction::RenameColumn { from, to }],
        }));
    }

    let mut actions = Vec::new();
    loop {
        actions.push(parse_alter_action(cursor)?);
        if !cursor.eat_char(',') {
            break;
        }
    }
    if actions.is_empty() || !cursor.eof() {
        return None;
    }

    Some(Statement::AlterTable(AlterTable { table, actions }))
}

fn parse_alter_action(cursor: &mut Cursor) -> Option<AlterAction> {
    if cursor.eat_keyword("ADD") {
        if cursor.eat_keyword("CONSTRAINT") {
            let name = cursor.read_identifier()?;
            let mut def = parse_constraint_body(cursor)?;
            def.name = Some(name);
            return Some(AlterAction::AddConstraint(def));
        }
        if cursor.peek_keyword("PRIMARY")
            || cursor.peek_keyword("UNIQUE")
            || cursor.peek_keyword("CHECK")
            || cursor.peek_keyword("FOREIGN")
        {
            return Some(AlterAction::AddConstraint(parse_constraint_body(cursor)?));
        }
        cursor.eat_keyword("COLUMN");
        let if_not_exists = cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let def = parse_column_def(cursor)?;
        return Some(AlterAction::AddColumn { if_not_exists, def });
    }

    if cursor.eat_keyword("DROP") {
        if cursor.eat_keyword("CONSTRAINT") {
            let if_exists = cursor.eat_keywords(&["IF", "EXISTS"]);
            let name = cursor.read_identifier()?;
            let cascade = cursor.eat_keyword("CASCADE");
            cursor.eat_keyword("RESTRICT");
            return Some(AlterAction::DropConstraint {
                name,
                if_exists,
                cascade,
            });
        }
        cursor.eat_keyword("COLUMN");
        let if_exists = cursor.eat_keywords(&["IF", "EXISTS"]);
        let name = cursor.read_identifier()?;
        let cascade = cursor.eat_keyword("CASCADE");
        cursor.eat_keyword("RESTRICT");
        return Some(AlterAction::DropColumn {
            name,
            if_exists,
            cascade,
        });
    }

    if cursor.eat_keyword("ALTER") {
        cursor.eat_keyword("COLUMN");
        let name = cursor.read_identifier()?;
        let change = parse_column_alter(cursor)?;
        return Some(AlterAction::AlterColumn { name, change });
    }

    None
}

fn parse_column_alter(cursor: &mut Cursor) -> Option<ColumnAlter> {
    if cursor.eat_keywords(&["SET", "NOT", "NULL"]) {
        return Some(ColumnAlter::SetNotNull);
    }
    if cursor.eat_keywords(&["DROP", "NOT", "NULL"]) {
        return Some(ColumnAlter::DropNotNull);
    }
    if cursor.eat_keywords(&["SET", "DEFAULT"]) {
        let expr = cursor.read_until_keywords(&[]);
        if expr.is_empty() {
            return None;
        }
        return Some(ColumnAlter::SetDefault { expr });
    }
    if cursor.eat_keywords(&["DROP", "DEFAULT"]) {
        return Some(ColumnAlter::DropDefault);
    }
    // [SET DATA] TYPE new_type [USING expr]
    cursor.eat_keywords(&["SET", "DATA"]);
    if cursor.eat_keyword("TYPE") {
        let data_type = read_data_type(cursor, &["USING"]);
        if data_type.is_empty() {
            return None;
        }
        if cursor.eat_keyword("USING") {
            let _ = cursor.rest(); // cast expression is irrelevant to simulation
        }
        return Some(ColumnAlter::SetType { data_type });
    }
    None
}

fn parse_drop_table(cursor: &mut Cursor) -> Option<Statement> {
    let if_exists = cursor.eat_keywords(&["IF", "EXISTS"]);
    let mut tables = Vec::new();
    loop {
        tables.push(cursor.read_qualified_name()?);
        if !cursor.eat_char(',') {
            break;
        }
    }
    let cascade = cursor.eat_keyword("CASCADE");
    cursor.eat_keyword("RESTRICT");
    Some(Statement::DropTable(DropTable {
        if_exists,
        tables,
        cascade,
    }))
}

fn parse_create_index(cursor: &mut Cursor, unique: bool) -> Option<Statement> {
    let concurrently = cursor.eat_keyword("CONCURRENTLY");
    let if_not_exists = cursor.eat_keywords(&["IF", "NOT", "EXISTS"]);

    // The name is optional; ON introduces the table either way
    let name = if cursor.peek_keyword("ON") {
        None
    } else {
        Some(cursor.read_identifier()?)
    };
    if !cursor.eat_keyword("ON") {
        return None;
    }
    cursor.eat_keyword("ONLY");
    let table = cursor.read_qualified_name()?;

    let method = if cursor.eat_keyword("USING") {
        Some(cursor.read_identifier()?)
    } else {
        None
    };

    let body = cursor.read_paren_block()?;
    let columns = split_top_level(&body, ',');
    if columns.is_empty() {
        return None;
    }

    let predicate = if cursor.eat_keyword("WHERE") {
        let pred = cursor.rest();
        if pred.is_empty() {
            return None;
        }
        Some(pred)
    } else {
        None
    };

    Some(Statement::CreateIndex(CreateIndex {
        unique,
        concurrently,
        if_not_exists,
        name,
        table,
        method,
        columns,
        predicate,
    }))
}

fn parse_drop_index(cursor: &mut Cursor) -> Option<Statement> {
    let concurrently = cursor.eat_keyword("CONCURRENTLY");
    let if_exists = cursor.eat_keywords(&["IF", "EXISTS"]);
    let mut indexes = Vec::new();
    loop {
        indexes.push(cursor.read_qualified_name()?);
        if !cursor.eat_char(',') {
            break;
        }
    }
    let cascade = cursor.eat_keyword("CASCADE");
    cursor.eat_keyword("RESTRICT");
    Some(Statement::DropIndex(DropIndex {
        concurrently,
        if_exists,
        indexes,
        cascade,
    }))
}

/// Parse `name type [constraints...]` from a single column definition
fn parse_column_def(cursor: &mut Cursor) -> Option<ColumnDef> {
    let name = cursor.read_identifier()?;
    let data_type = read_data_type(cursor, COLUMN_STOPS);
    if data_type.is_empty() {
        return None;
    }

    let mut def = ColumnDef {
        name,
        data_type,
        nullable: true,
        default: None,
        inline_primary_key: false,
        inline_unique: false,
        references: None,
        check: None,
    };

    loop {
        if cursor.eat_keywords(&["NOT", "NULL"]) {
            def.nullable = false;
        } else if cursor.eat_keyword("NULL") {
            def.nullable = true;
        } else if cursor.eat_keyword("DEFAULT") {
            if cursor.eat_keyword("NULL") {
                def.default = Some("NULL".to_string());
                continue;
            }
            let expr = cursor.read_until_keywords(COLUMN_STOPS);
            if expr.is_empty() {
                return None;
            }
            def.default = Some(expr);
        } else if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
            def.inline_primary_key = true;
            def.nullable = false;
        } else if cursor.eat_keyword("UNIQUE") {
            def.inline_unique = true;
        } else if cursor.eat_keyword("REFERENCES") {
            def.references = Some(parse_fk_reference(cursor)?);
        } else if cursor.eat_keyword("CHECK") {
            def.check = Some(cursor.read_paren_block()?);
        } else if cursor.eat_keyword("COLLATE") {
            let _ = cursor.read_identifier()?;
        } else if cursor.eof() {
            break;
        } else {
            // Unsupported trailing clause (GENERATED, named inline
            // constraint, ...) makes the whole definition unrecognized
            return None;
        }
    }

    Some(def)
}

/// Parse `[CONSTRAINT name] <body>` as a table-level constraint
fn parse_table_constraint(cursor: &mut Cursor) -> Option<TableConstraintDef> {
    let name = if cursor.eat_keyword("CONSTRAINT") {
        Some(cursor.read_identifier()?)
    } else {
        None
    };
    let mut def = parse_constraint_body(cursor)?;
    def.name = name;
    Some(def)
}

fn parse_constraint_body(cursor: &mut Cursor) -> Option<TableConstraintDef> {
    if cursor.eat_keywords(&["PRIMARY", "KEY"]) {
        let body = cursor.read_paren_block()?;
        return Some(TableConstraintDef {
            name: None,
            kind: ConstraintKind::PrimaryKey,
            columns: split_top_level(&body, ','),
            expression: None,
            reference: None,
        });
    }
    if cursor.eat_keyword("UNIQUE") {
        let body = cursor.read_paren_block()?;
        return Some(TableConstraintDef {
            name: None,
            kind: ConstraintKind::Unique,
            columns: split_top_level(&body, ','),
            expression: None,
            reference: None,
        });
    }
    if cursor.eat_keyword("CHECK") {
        let body = cursor.read_paren_block()?;
        return Some(TableConstraintDef {
            name: None,
            kind: ConstraintKind::Check,
            columns: Vec::new(),
            expression: Some(body),
            reference: None,
        });
    }
    if cursor.eat_keywords(&["FOREIGN", "KEY"]) {
        let body = cursor.read_paren_block()?;
        let columns = split_top_level(&body, ',');
        if !cursor.eat_keyword("REFERENCES") {
            return None;
        }
        let reference = parse_fk_reference(cursor)?;
        return Some(TableConstraintDef {
            name: None,
            kind: ConstraintKind::ForeignKey,
            columns,
            expression: None,
            reference: Some(reference),
        });
    }
    None
}

/// Parse the target of REFERENCES: `table [(cols)] [ON DELETE ...] [ON UPDATE ...]`
fn parse_fk_reference(cursor: &mut Cursor) -> Option<FkReference> {
    let table = cursor.read_qualified_name()?;
    let columns = if cursor.peek() == Some('(') {
        split_top_level(&cursor.read_paren_block()?, ',')
    } else {
        Vec::new()
    };

    let mut on_update = None;
    let mut on_delete = None;
    while cursor.eat_keyword("ON") {
        let is_delete = if cursor.eat_keyword("DELETE") {
            true
        } else if cursor.eat_keyword("UPDATE") {
            false
        } else {
            return None;
        };
        let action = parse_referential_action(cursor)?;
        if is_delete {
            on_delete = Some(action);
        } else {
            on_update = Some(action);
        }
    }

    // NOT VALID / DEFERRABLE tails are accepted and ignored
    cursor.eat_keywords(&["NOT", "VALID"]);
    cursor.eat_keywords(&["NOT", "DEFERRABLE"]);
    cursor.eat_keyword("DEFERRABLE");

    Some(FkReference {
        table,
        columns,
        on_update,
        on_delete,
    })
}

fn parse_referential_action(cursor: &mut Cursor) -> Option<String> {
    if cursor.eat_keyword("CASCADE") {
        return Some("CASCADE".to_string());
    }
    if cursor.eat_keyword("RESTRICT") {
        return Some("RESTRICT".to_string());
    }
    if cursor.eat_keywords(&["NO", "ACTION"]) {
        return Some("NO ACTION".to_string());
    }
    if cursor.eat_keywords(&["SET", "NULL"]) {
        return Some("SET NULL".to_string());
    }
    if cursor.eat_keywords(&["SET", "DEFAULT"]) {
        return Some("SET DEFAULT".to_string());
    }
    None
}

/// Read a data type: leading word(s), optional paren arguments, and the
/// multi-word suffixes Postgres types use.
fn read_data_type(cursor: &mut Cursor, stops: &[&str]) -> String {
    let mut parts: Vec<String> = Vec::new();
    loop {
        if cursor.peek() == Some('(') {
            if let Some(args) = cursor.read_paren_block() {
                if let Some(last) = parts.last_mut() {
                    last.push_str(&format!("({})", args));
                }
                continue;
            }
            break;
        }
        // Array suffix
        if cursor.eat_char('[') {
            if cursor.eat_char(']') {
                if let Some(last) = parts.last_mut() {
                    last.push_str("[]");
                }
                continue;
            }
            break;
        }
        if !parts.is_empty() {
            // After the first word, only known type suffixes continue the type
            if !(cursor.peek_keyword("VARYING")
                || cursor.peek_keyword("PRECISION")
                || cursor.peek_keyword("WITH")
                || cursor.peek_keyword("WITHOUT")
                || cursor.peek_keyword("TIME")
                || cursor.peek_keyword("ZONE"))
            {
                break;
            }
        } else {
            let mut halt = false;
            for s in stops {
                if cursor.peek_keyword(s) {
                    halt = true;
                    break;
                }
            }
            if halt {
                break;
            }
        }
        match cursor.read_identifier() {
            Some(word) => parts.push(word),
            None => break,
        }
    }
    parts.join(" ")
}
