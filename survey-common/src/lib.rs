//! # Survey Common Library
//!
//! Shared code for the survey server and the import job:
//! - Versioned survey schemas and the response record model
//! - Relational store (SQLite) initialization and queries
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod record;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
pub use record::{AnswerValue, Answers, ResponseRecord, ValidationError};
pub use schema::{FieldKind, FieldSpec, SchemaVersion, SurveySchema};
