//! Storage nodes
//!
//! Row-level access to user database tables.

mod database;

pub use database::{
    schema_request as database_schema_request, DatabaseDeleteNode, DatabaseInsertNode,
    DatabaseQueryNode, DatabaseUpdateNode, OUTPUT_LIST, ROW_NUM,
};
