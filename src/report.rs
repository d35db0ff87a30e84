//! Master unit-test report generation: gathers a per-class snapshot from the
//! workspace database, aggregates statistics, and renders one sheet per class
//! into the destination spreadsheet.

use crate::db::{self, Ticket};
use crate::error::ReportError;
use crate::layout::{normalize_subjects, plan_layout};
use crate::render::render_report;
use crate::sheets::SheetStore;
use crate::stats::{
    aggregate, sort_roll_nos, AggregatedStats, ReportData, ReportSubject, UnitTestEntry,
};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Display form of a class code: letters, a space, then the numeric part
/// ("TE09" becomes "TE 09"). Codes without a digit pass through unchanged.
pub fn class_label(class_code: &str) -> String {
    match class_code.find(|c: char| c.is_ascii_digit()) {
        Some(pos) if pos > 0 => {
            format!("{} {}", &class_code[..pos], &class_code[pos..])
        }
        _ => class_code.to_string(),
    }
}

pub fn sheet_title(data: &ReportData) -> String {
    format!(
        "{} SEM-{} {}",
        data.class_label, data.semester, data.academic_year
    )
}

fn teacher_tag(teacher: &str) -> String {
    teacher.chars().take(3).collect::<String>().to_uppercase()
}

/// Loads everything one class report needs. Returns `Ok(None)` when the class
/// has no enrolled students; a class with students but no batch curriculum is
/// a data-integrity error.
pub fn gather_report_data(
    conn: &Connection,
    ticket: &Ticket,
    year: i64,
    class_code: &str,
) -> Result<Option<ReportData>, ReportError> {
    let academic_year = ticket
        .academic_year
        .clone()
        .ok_or_else(|| ReportError::BadInput("academic year not configured".to_string()))?;
    let semester = ticket
        .semester
        .ok_or_else(|| ReportError::BadInput("semester not configured".to_string()))?;

    let Some(class_id) = db::class_id(conn, year, class_code)? else {
        return Err(ReportError::BadInput(format!(
            "unknown class {} in year {}",
            class_code, year
        )));
    };

    let mut stmt =
        conn.prepare("SELECT roll_no, name FROM students WHERE class_id = ?")?;
    let mut roll_nos = Vec::new();
    let mut names_by_roll: HashMap<String, String> = HashMap::new();
    for row in stmt.query_map([&class_id], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })? {
        let (roll_no, name) = row?;
        names_by_roll.insert(roll_no.clone(), name.to_uppercase());
        roll_nos.push(roll_no);
    }
    if roll_nos.is_empty() {
        return Ok(None);
    }
    sort_roll_nos(&mut roll_nos);
    let names = roll_nos
        .iter()
        .map(|r| names_by_roll.remove(r).unwrap_or_default())
        .collect();

    // All batches of a class share the theory curriculum; the first batch is
    // the source of truth for it.
    let batch_id: Option<String> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM batches WHERE class_id = ? ORDER BY batch_code LIMIT 1",
        )?;
        let mut rows = stmt.query_map([&class_id], |r| r.get(0))?;
        rows.next().transpose()?
    };
    let Some(batch_id) = batch_id else {
        return Err(ReportError::MissingCurriculum(class_code.to_string()));
    };

    let mut stmt = conn.prepare(
        "SELECT title, elective_group, teacher FROM theory_subjects
         WHERE batch_id = ? ORDER BY idx",
    )?;
    let mut subjects = Vec::new();
    for row in stmt.query_map([&batch_id], |r| {
        Ok(ReportSubject {
            title: r.get(0)?,
            elective: r.get(1)?,
            teacher: r.get::<_, String>(2).map(|t| teacher_tag(&t))?,
        })
    })? {
        subjects.push(row?);
    }
    if subjects.is_empty() {
        return Err(ReportError::MissingCurriculum(class_code.to_string()));
    }
    let subjects = normalize_subjects(subjects);

    let mut stmt = conn.prepare(
        "SELECT m.roll_no, m.subject, m.ut1, m.ut2, m.ut1_absent, m.ut2_absent
         FROM unit_test_marks m
         JOIN students s ON s.roll_no = m.roll_no
         WHERE s.class_id = ?",
    )?;
    let mut marks: HashMap<(String, String), UnitTestEntry> = HashMap::new();
    for row in stmt.query_map([&class_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            UnitTestEntry {
                ut1: r.get(2)?,
                ut2: r.get(3)?,
                ut1_absent: r.get(4)?,
                ut2_absent: r.get(5)?,
            },
        ))
    })? {
        let (roll_no, subject, entry) = row?;
        marks.insert((roll_no, subject), entry);
    }

    Ok(Some(ReportData {
        class_label: class_label(class_code),
        academic_year,
        semester,
        institution: ticket.institution.clone(),
        department: ticket.department.clone(),
        min_ut_marks: ticket.min_ut_marks_required,
        roll_nos,
        names,
        subjects,
        marks,
    }))
}

/// Inspectable report model, served over IPC without touching any sheet
/// store. Mirrors exactly what the renderer would write.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterUtModel {
    pub sheet_title: String,
    pub class_label: String,
    pub academic_year: String,
    pub semester: i64,
    pub roll_nos: Vec<String>,
    pub names: Vec<String>,
    pub subjects: Vec<ReportSubject>,
    pub half_width: usize,
    pub slot_count: usize,
    pub marks_out_of: usize,
    pub stats: AggregatedStats,
}

pub fn master_ut_model(
    conn: &Connection,
    ticket: &Ticket,
    year: i64,
    class_code: &str,
) -> Result<Option<MasterUtModel>, ReportError> {
    let Some(data) = gather_report_data(conn, ticket, year, class_code)? else {
        return Ok(None);
    };
    let plan = plan_layout(&data.subjects, data.roll_nos.len());
    let stats = aggregate(&data);
    Ok(Some(MasterUtModel {
        sheet_title: sheet_title(&data),
        class_label: data.class_label,
        academic_year: data.academic_year,
        semester: data.semester,
        roll_nos: data.roll_nos,
        names: data.names,
        subjects: data.subjects,
        half_width: plan.half_width,
        slot_count: plan.slot_count,
        marks_out_of: plan.marks_out_of(),
        stats,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub sheet_title: String,
    pub class_code: String,
    /// False when the sheet already existed and the class was skipped.
    pub created: bool,
    pub link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportManifest {
    pub generated_at: String,
    pub entries: Vec<ManifestEntry>,
}

/// Renders the master report for every class in the given years, one sheet
/// per class, sequentially. A sheet whose title already exists is left
/// untouched, which makes reruns idempotent.
pub fn generate_master_report(
    conn: &Connection,
    store: &mut dyn SheetStore,
    spreadsheet_id: &str,
    years: &[i64],
) -> Result<ReportManifest, ReportError> {
    let ticket = db::load_ticket(conn)?;
    let mut entries = Vec::new();

    for &year in years {
        let mut stmt = conn.prepare(
            "SELECT class_code FROM classes WHERE year = ? ORDER BY class_code",
        )?;
        let class_codes: Vec<String> = stmt
            .query_map([year], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        for class_code in class_codes {
            let Some(data) = gather_report_data(conn, &ticket, year, &class_code)? else {
                warn!(class = %class_code, year, "class has no students, skipping");
                continue;
            };
            let title = sheet_title(&data);

            if store.sheet_id(spreadsheet_id, &title)?.is_some() {
                info!(sheet = %title, "sheet already exists, skipping");
                entries.push(ManifestEntry {
                    sheet_title: title,
                    class_code,
                    created: false,
                    link: store.shareable_link(spreadsheet_id),
                });
                continue;
            }

            let sheet_id = store.create_sheet(spreadsheet_id, &title)?;
            let plan = plan_layout(&data.subjects, data.roll_nos.len());
            let stats = aggregate(&data);
            render_report(store, spreadsheet_id, sheet_id, &title, &data, &stats, &plan)?;
            info!(sheet = %title, students = data.roll_nos.len(), "rendered master report");

            entries.push(ManifestEntry {
                sheet_title: title,
                class_code,
                created: true,
                link: store.shareable_link(spreadsheet_id),
            });
        }
    }

    Ok(ReportManifest {
        generated_at: chrono::Utc::now().to_rfc3339(),
        entries,
    })
}
