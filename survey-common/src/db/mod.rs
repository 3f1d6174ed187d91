//! Relational store: initialization, schema maintenance and queries

pub mod init;
pub mod migrations;
pub mod responses;
pub mod schema_sync;
pub mod table_schemas;

pub use init::*;
pub use responses::*;
