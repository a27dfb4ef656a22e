pub const SCHEMA: &str = r#"
-- Accounts
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- Many-to-many user <-> group
CREATE TABLE IF NOT EXISTS user_groups (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_id)
);

-- Pages are the unit of access control
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner_id TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL
);

-- Grants a user or group holds on a page. The owner is never listed here.
CREATE TABLE IF NOT EXISTS page_permissions (
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    subject_type TEXT NOT NULL CHECK (subject_type IN ('user', 'group')),
    subject_id TEXT NOT NULL,
    can_view INTEGER NOT NULL DEFAULT 1,
    can_edit INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (page_id, subject_type, subject_id)
);

-- Alarms inherit their page's permissions
CREATE TABLE IF NOT EXISTS alarms (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    option TEXT NOT NULL,
    condition TEXT NOT NULL,
    strategy_id TEXT,
    strategy_name TEXT,
    created_by TEXT NOT NULL REFERENCES users(id),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_triggered TEXT
);

-- Append-only trigger history
CREATE TABLE IF NOT EXISTS alarm_events (
    id TEXT PRIMARY KEY,
    alarm_id TEXT NOT NULL REFERENCES alarms(id) ON DELETE CASCADE,
    triggered_by TEXT NOT NULL REFERENCES users(id),
    price REAL,
    triggered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alarms_page ON alarms(page_id);
CREATE INDEX IF NOT EXISTS idx_permissions_subject ON page_permissions(subject_type, subject_id);
CREATE INDEX IF NOT EXISTS idx_user_groups_user ON user_groups(user_id);
CREATE INDEX IF NOT EXISTS idx_alarm_events_alarm ON alarm_events(alarm_id);
"#;
