//! Declarative request validation.
//!
//! Each request DTO carries a [`Schema`] compiled once into a [`Validator`].
//! The [`ValidJson`], [`ValidQuery`] and [`ValidPath`] extractors run it
//! before the handler body, so a rejected request never reaches handler code.

mod extract;
mod schema;
pub mod schemas;

pub use extract::{Validate, ValidJson, ValidPath, ValidQuery};
pub use schema::{Constraint, FieldKind, FieldRule, Schema, Source, ValidationError, Validator};
