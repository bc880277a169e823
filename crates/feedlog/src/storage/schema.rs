//! `SQLite` schema definitions for feedlog.
//!
//! Two databases share this module: the local preference store and the
//! household cloud store. Each gets its own [`Schema`].

/// A named set of schema statements for one database.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Human-readable name, used in log and error messages.
    pub name: &'static str,
    /// Creation statements, executed in order.
    pub statements: &'static [&'static str],
}

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the preferences table.
pub const CREATE_PREFERENCES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the zones table.
pub const CREATE_ZONES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS zones (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the shares table. One share per zone.
pub const CREATE_SHARES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS shares (
    zone TEXT PRIMARY KEY REFERENCES zones(name),
    share_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    permission TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the records table.
///
/// `fields` holds the JSON-encoded field map; `sort_key` mirrors the
/// record's `timestamp` field in microseconds so queries can order on it.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    record_name TEXT PRIMARY KEY,
    zone TEXT NOT NULL REFERENCES zones(name),
    record_type TEXT NOT NULL,
    fields TEXT NOT NULL,
    sort_key INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index for newest-first queries within a zone.
pub const CREATE_RECORDS_SORT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_zone_type_sort
ON records(zone, record_type, sort_key DESC)
";

/// Schema of the local preference database.
pub const PREFERENCES_SCHEMA: Schema = Schema {
    name: "preferences",
    statements: &[CREATE_PREFERENCES_TABLE, CREATE_METADATA_TABLE],
};

/// Schema of the household cloud database.
pub const CLOUD_SCHEMA: Schema = Schema {
    name: "cloud",
    statements: &[
        CREATE_ZONES_TABLE,
        CREATE_SHARES_TABLE,
        CREATE_RECORDS_TABLE,
        CREATE_RECORDS_SORT_INDEX,
        CREATE_METADATA_TABLE,
    ],
};
