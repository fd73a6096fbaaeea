//! Shared SQLite schema machinery.
//!
//! Stores declare their tables as const [`Table`] values grouped into
//! [`VersionedSchema`]s. On open, a store either creates the latest schema or
//! validates the on-disk one and runs pending migrations, tracked through
//! `PRAGMA user_version`.

mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
