//! Database migrations

/// SQL for creating the database schema
pub const INIT_SCHEMA: &str = r#"
-- One row per indexed filesystem entry; the inode is the stable key
CREATE TABLE IF NOT EXISTS entries (
    inode INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    parent_directory TEXT,
    name TEXT NOT NULL,
    is_dir INTEGER NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    modification_time INTEGER NOT NULL,
    access_time INTEGER NOT NULL,
    metadata_change_time INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    group_id INTEGER NOT NULL,
    extension TEXT,
    filetype TEXT NOT NULL,
    content_snippet TEXT,
    full_text TEXT,
    line_count_total INTEGER,
    line_count_w_content INTEGER
);

-- Paths that could not be read or persisted
CREATE TABLE IF NOT EXISTS ignored_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    error TEXT NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One summary row per run
CREATE TABLE IF NOT EXISTS full_scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_kind TEXT NOT NULL CHECK(scan_kind IN ('full', 'sync')),
    scan_start TEXT NOT NULL,
    scan_end TEXT NOT NULL,
    scan_duration_ms INTEGER NOT NULL,
    directory_count INTEGER NOT NULL DEFAULT 0,
    file_count INTEGER NOT NULL DEFAULT 0,
    file_w_content_count INTEGER NOT NULL DEFAULT 0,
    ignored_entries_count INTEGER NOT NULL DEFAULT 0,
    deleted_count INTEGER NOT NULL DEFAULT 0,
    indexing_completed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(parent_directory);
CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(name);
CREATE INDEX IF NOT EXISTS idx_entries_extension ON entries(extension);
CREATE INDEX IF NOT EXISTS idx_ignored_path ON ignored_entries(path);
CREATE INDEX IF NOT EXISTS idx_scans_end ON full_scans(scan_end DESC);
"#;
