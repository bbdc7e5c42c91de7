//! SQL schema for the follow-up SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

-- One row per tracked person. Every column group is owned by exactly one
-- event category and is updated by its own statement.
CREATE TABLE IF NOT EXISTS person_status (
    id                                    INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid                                  TEXT NOT NULL UNIQUE,
    person_ident                          TEXT NOT NULL UNIQUE,
    display_name                          TEXT,
    display_name_search                   TEXT,    -- display_name, case-folded
    birth_date                            TEXT,    -- YYYY-MM-DD
    assigned_caseworker                   TEXT,
    assigned_org_unit                     TEXT,
    assigned_org_unit_updated_at          TEXT,

    -- latched task markers: NULL = never seen, 1 = pending, 0 = handled
    meeting_need_pending                  INTEGER,
    meeting_need_updated_at               TEXT,
    dialog_meeting_answer_pending         INTEGER,
    dialog_meeting_answer_updated_at      TEXT,
    employer_assistance_pending           INTEGER,
    employer_assistance_updated_at        TEXT,
    practitioner_reply_pending            INTEGER,
    practitioner_reply_updated_at         TEXT,

    activity_requirement_active           INTEGER,
    activity_requirement_status           TEXT,
    activity_requirement_deadline         TEXT,
    activity_requirement_updated_at       TEXT,
    lack_of_cooperation_active            INTEGER,
    lack_of_cooperation_updated_at        TEXT,
    late_follow_up_active                 INTEGER,
    late_follow_up_updated_at             TEXT,
    reminder_active                       INTEGER,
    reminder_deadline                     TEXT,
    reminder_updated_at                   TEXT,
    dialog_meeting_candidate              INTEGER,
    dialog_meeting_candidate_generated_at TEXT,
    dialog_meeting_status                 TEXT,
    dialog_meeting_status_generated_at    TEXT,

    -- latest timeline; all NULL until the first timeline event
    timeline_start                        TEXT,
    timeline_end                          TEXT,
    timeline_generated_at                 TEXT,
    reference_bit_uuid                    TEXT,
    reference_bit_occurred_at             TEXT,
    sick_days                             INTEGER,

    -- last enrichment lookups, successful or not
    person_info_attempted_at              TEXT,
    org_unit_attempted_at                 TEXT,

    created_at                            TEXT NOT NULL,
    updated_at                            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS person_organization (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    person_status_id    INTEGER NOT NULL REFERENCES person_status(id) ON DELETE CASCADE,
    organization_number TEXT NOT NULL,
    name                TEXT,
    name_attempted_at   TEXT,
    uuid                TEXT NOT NULL UNIQUE,
    created_at          TEXT NOT NULL,
    UNIQUE (person_status_id, organization_number)
);

-- Append-only topic log standing in for the upstream streams.
CREATE TABLE IF NOT EXISTS event_log (
    topic         TEXT NOT NULL,
    record_offset INTEGER NOT NULL,
    record_key    TEXT NOT NULL,
    value         TEXT,            -- NULL is a tombstone
    published_at  TEXT NOT NULL,
    PRIMARY KEY (topic, record_offset)
);

CREATE TABLE IF NOT EXISTS consumer_offset (
    consumer_group   TEXT NOT NULL,
    topic            TEXT NOT NULL,
    committed_offset INTEGER NOT NULL,
    PRIMARY KEY (consumer_group, topic)
);

CREATE INDEX IF NOT EXISTS person_status_caseworker_idx ON person_status(assigned_caseworker);
CREATE INDEX IF NOT EXISTS person_status_org_unit_idx   ON person_status(assigned_org_unit);
CREATE INDEX IF NOT EXISTS person_status_birth_date_idx ON person_status(birth_date);
CREATE INDEX IF NOT EXISTS person_organization_number_idx
    ON person_organization(organization_number);

PRAGMA user_version = 1;
";
