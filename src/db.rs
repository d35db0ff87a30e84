use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "recordbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            class_code TEXT NOT NULL,
            coordinator TEXT,
            UNIQUE(year, class_code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            batch_code TEXT NOT NULL UNIQUE,
            mentor TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_class ON batches(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_roll_nos(
            batch_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            roll_no TEXT NOT NULL,
            PRIMARY KEY(batch_id, idx),
            FOREIGN KEY(batch_id) REFERENCES batches(id)
        )",
        [],
    )?;

    // Subject rows keep curriculum order via idx; elective_group NULL means a
    // regular (non-elective) subject.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS theory_subjects(
            batch_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            title TEXT NOT NULL,
            elective_group TEXT,
            teacher TEXT NOT NULL,
            PRIMARY KEY(batch_id, idx),
            FOREIGN KEY(batch_id) REFERENCES batches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS practical_subjects(
            batch_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            title TEXT NOT NULL,
            assignment_count INTEGER NOT NULL,
            teacher TEXT NOT NULL,
            PRIMARY KEY(batch_id, idx),
            FOREIGN KEY(batch_id) REFERENCES batches(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll_no TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_records(
            roll_no TEXT PRIMARY KEY,
            attendance REAL,
            below_threshold INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS unit_test_marks(
            roll_no TEXT NOT NULL,
            subject TEXT NOT NULL,
            ut1 REAL,
            ut2 REAL,
            ut1_absent INTEGER NOT NULL DEFAULT 0,
            ut2_absent INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(roll_no, subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_unit_test_marks_roll ON unit_test_marks(roll_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_records(
            roll_no TEXT NOT NULL,
            subject TEXT NOT NULL,
            marks TEXT NOT NULL,
            all_completed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(roll_no, subject)
        )",
        [],
    )?;

    // Singleton configuration row, id fixed at 1.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ticket_data(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            academic_year TEXT,
            semester INTEGER,
            institution TEXT,
            department TEXT,
            min_attendance_required REAL NOT NULL DEFAULT 75,
            min_ut_marks_required REAL NOT NULL DEFAULT 12
        )",
        [],
    )?;

    Ok(conn)
}

pub const DEFAULT_MIN_ATTENDANCE: f64 = 75.0;
pub const DEFAULT_MIN_UT_MARKS: f64 = 12.0;
pub const DEFAULT_INSTITUTION: &str = "PUNE INSTITUTE OF COMPUTER TECHNOLOGY, PUNE - 411043";
pub const DEFAULT_DEPARTMENT: &str = "Department of Information Technology";

/// Snapshot of the ticket configuration, loaded once per job and passed
/// through explicitly. Missing row falls back to defaults.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub academic_year: Option<String>,
    pub semester: Option<i64>,
    pub institution: String,
    pub department: String,
    pub min_attendance_required: f64,
    pub min_ut_marks_required: f64,
}

impl Default for Ticket {
    fn default() -> Self {
        Ticket {
            academic_year: None,
            semester: None,
            institution: DEFAULT_INSTITUTION.to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
            min_attendance_required: DEFAULT_MIN_ATTENDANCE,
            min_ut_marks_required: DEFAULT_MIN_UT_MARKS,
        }
    }
}

pub fn load_ticket(conn: &Connection) -> rusqlite::Result<Ticket> {
    let row = conn
        .query_row(
            "SELECT academic_year, semester, institution, department,
                    min_attendance_required, min_ut_marks_required
             FROM ticket_data WHERE id = 1",
            [],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, Option<i64>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, f64>(4)?,
                    r.get::<_, f64>(5)?,
                ))
            },
        )
        .optional()?;

    Ok(match row {
        None => Ticket::default(),
        Some((academic_year, semester, institution, department, min_att, min_ut)) => Ticket {
            academic_year,
            semester,
            institution: institution.unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
            department: department.unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
            min_attendance_required: min_att,
            min_ut_marks_required: min_ut,
        },
    })
}

pub fn class_id(conn: &Connection, year: i64, class_code: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM classes WHERE year = ? AND class_code = ?",
        (year, class_code),
        |r| r.get(0),
    )
    .optional()
}
