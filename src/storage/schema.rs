//! SQL schema, applied on every open

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    first_name    TEXT NOT NULL DEFAULT '',
    last_name     TEXT NOT NULL DEFAULT '',
    blood_group   TEXT NOT NULL,
    allergies     TEXT,
    age           INTEGER NOT NULL,
    gender        TEXT NOT NULL,
    address       TEXT NOT NULL DEFAULT '',
    phone_number  TEXT NOT NULL DEFAULT '',
    is_donor      INTEGER NOT NULL DEFAULT 1,
    is_recipient  INTEGER NOT NULL DEFAULT 1,
    is_staff      INTEGER NOT NULL DEFAULT 0,
    is_active     INTEGER NOT NULL DEFAULT 1,
    location_lat  REAL,
    location_long REAL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hospitals (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    address       TEXT NOT NULL,
    phone_number  TEXT NOT NULL,
    email         TEXT,
    location_lat  REAL NOT NULL,
    location_long REAL NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hospital_users (
    id            TEXT PRIMARY KEY,
    hospital_id   TEXT NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    last_login    TEXT
);

CREATE TABLE IF NOT EXISTS blood_requests (
    id             TEXT PRIMARY KEY,
    patient_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    blood_group    TEXT NOT NULL,
    units_required INTEGER NOT NULL,
    urgency        TEXT NOT NULL,
    reason         TEXT,
    location_lat   REAL NOT NULL,
    location_long  REAL NOT NULL,
    status         TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS donations (
    id                      TEXT PRIMARY KEY,
    donor_id                TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    blood_request_id        TEXT NOT NULL REFERENCES blood_requests(id) ON DELETE CASCADE,
    hospital_id             TEXT REFERENCES hospitals(id) ON DELETE SET NULL,
    status                  TEXT NOT NULL,
    ai_recommended_hospital INTEGER NOT NULL DEFAULT 0,
    donation_date           TEXT,
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assignments (
    id             TEXT PRIMARY KEY,
    donor_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    hospital_id    TEXT NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
    donation_id    TEXT NOT NULL UNIQUE REFERENCES donations(id) ON DELETE CASCADE,
    status         TEXT NOT NULL,
    ai_recommended INTEGER NOT NULL DEFAULT 0,
    assigned_at    TEXT NOT NULL,
    completed_at   TEXT
);

CREATE TABLE IF NOT EXISTS blood_tests (
    id                     TEXT PRIMARY KEY,
    donation_id            TEXT NOT NULL UNIQUE REFERENCES donations(id) ON DELETE CASCADE,
    sugar_level            REAL NOT NULL,
    uric_acid_level        REAL NOT NULL,
    wbc_count              REAL NOT NULL,
    rbc_count              REAL NOT NULL,
    hemoglobin             REAL NOT NULL,
    platelet_count         REAL NOT NULL,
    tested_by              TEXT NOT NULL REFERENCES hospitals(id) ON DELETE CASCADE,
    health_risk_prediction TEXT,
    disease_prediction     TEXT,
    prediction_confidence  INTEGER,
    life_saved             INTEGER NOT NULL DEFAULT 0,
    created_at             TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_rooms (
    id          TEXT PRIMARY KEY,
    donor_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    patient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    donation_id TEXT NOT NULL UNIQUE REFERENCES donations(id) ON DELETE CASCADE,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY,
    chat_room_id TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
    sender_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    content      TEXT NOT NULL,
    timestamp    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    notification_type TEXT NOT NULL,
    title             TEXT NOT NULL,
    message           TEXT NOT NULL,
    is_read           INTEGER NOT NULL DEFAULT 0,
    related_id        TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_patient ON blood_requests(patient_id);
CREATE INDEX IF NOT EXISTS idx_requests_status ON blood_requests(status);
CREATE INDEX IF NOT EXISTS idx_donations_donor ON donations(donor_id);
CREATE INDEX IF NOT EXISTS idx_donations_request ON donations(blood_request_id);
CREATE INDEX IF NOT EXISTS idx_assignments_hospital ON assignments(hospital_id);
CREATE INDEX IF NOT EXISTS idx_assignments_donor ON assignments(donor_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_donation ON assignments(donation_id);
CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(chat_room_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
"#;
