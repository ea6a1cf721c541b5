//! DDL script parsing: splitting, lexing and statement recognition

pub mod splitter;
pub mod statement;
pub mod tokens;

pub use splitter::split_statements;
pub use statement::{
    AlterAction, AlterTable, ColumnAlter, ColumnDef, CreateIndex, CreateTable, DropIndex,
    DropTable, FkReference, Statement, TableConstraintDef,
};
pub use tokens::QualifiedName;
