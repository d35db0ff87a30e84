//! Emits the master report sheet against a planned layout: banner, subject
//! headers, the two-half mark grid, trailing statistics regions, charts, and
//! the cosmetic finishing pass.
//!
//! Every function here is a pure request/value builder except
//! [`render_report`], which pushes the batches to the store in order. Later
//! batches reference ranges created by earlier ones, so the sequence matters.

use crate::layout::{LayoutPlan, NOTE_HEIGHT, RANGES_HEIGHT, STATS_HEIGHT};
use crate::sheets::{
    self, borders, colored_text, grid_range, merge_cells, repeat_cell, text_format,
    update_borders, update_dimensions, CellFormat, ChartSpec, Condition, ConditionalFormatRule,
    Dimension, HorizontalAlign, Padding, SheetRequest, SheetStore, StoreError, ValueRange,
    BLUE_ACCENT, BROWN_ACCENT, RED, YELLOW,
};
use crate::stats::{AggregatedStats, MarkCell, MarkHistogram, ReportData, Term};
use serde_json::{json, Value};

const DEFAULT_FONT: &str = "Times New Roman";
const NAME_COL_PIXELS: i64 = 325;

fn num(v: f64) -> Value {
    if v.fract() == 0.0 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

fn mark_value(cell: MarkCell) -> Value {
    match cell {
        MarkCell::Absent => json!("A"),
        MarkCell::Marked(v) => num(v),
        MarkCell::Missing => json!(""),
    }
}

fn average_value(avg: Option<f64>) -> Value {
    match avg {
        Some(v) => num(v),
        // Nobody appeared; render a dash instead of propagating NaN.
        None => json!("-"),
    }
}

fn bold12(sheet_id: i64, r0: usize, r1: usize, c0: usize, c1: usize) -> SheetRequest {
    repeat_cell(
        sheet_id,
        r0,
        r1,
        c0,
        c1,
        CellFormat {
            text_format: Some(text_format(12, true)),
            ..CellFormat::default()
        },
    )
}

pub fn banner_requests(plan: &LayoutPlan, sheet_id: i64) -> Vec<SheetRequest> {
    let w = plan.half_width;
    let class_end = 5.min(w);

    let mut requests = vec![
        update_dimensions(sheet_id, Dimension::Rows, 0, plan.student_count + 35, 30),
        // Institution and department banners span each half.
        merge_cells(sheet_id, 0, 1, 0, w),
        merge_cells(sheet_id, 0, 1, w, w * 2),
        merge_cells(sheet_id, 1, 2, 0, w),
        merge_cells(sheet_id, 1, 2, w, w * 2),
        // Semester / unit-test labels on the left, class in the middle.
        merge_cells(sheet_id, 2, 3, 0, 2),
        merge_cells(sheet_id, 2, 3, w, w + 2),
        merge_cells(sheet_id, 3, 4, 0, 2),
        merge_cells(sheet_id, 3, 4, w, w + 2),
        merge_cells(sheet_id, 2, 4, 2, class_end),
        merge_cells(sheet_id, 2, 4, w + 2, w + class_end),
        merge_cells(sheet_id, 4, 5, 0, w),
        merge_cells(sheet_id, 4, 5, w, w * 2),
        repeat_cell(
            sheet_id,
            0,
            2,
            0,
            w * 2,
            CellFormat {
                text_format: Some(text_format(12, true)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            2,
            4,
            0,
            2,
            CellFormat {
                text_format: Some(text_format(14, true)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            2,
            4,
            w,
            w + 2,
            CellFormat {
                text_format: Some(text_format(14, true)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            2,
            4,
            2,
            class_end,
            CellFormat {
                text_format: Some(colored_text(36, true, BLUE_ACCENT)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            2,
            4,
            w + 2,
            w + class_end,
            CellFormat {
                text_format: Some(colored_text(36, true, BLUE_ACCENT)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            4,
            5,
            0,
            w,
            CellFormat {
                text_format: Some(colored_text(14, true, BROWN_ACCENT)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            4,
            5,
            w,
            w * 2,
            CellFormat {
                text_format: Some(colored_text(14, true, BROWN_ACCENT)),
                ..CellFormat::default()
            },
        ),
        repeat_cell(
            sheet_id,
            0,
            5,
            0,
            w * 2,
            CellFormat {
                borders: Some(borders(1, 1, 1, 1)),
                ..CellFormat::default()
            },
        ),
    ];

    // The academic-year banner only exists when the half is wide enough to
    // hold it next to the class label.
    if w > 5 {
        requests.push(merge_cells(sheet_id, 2, 4, 5, w));
        requests.push(merge_cells(sheet_id, 2, 4, w + 5, w * 2));
        requests.push(repeat_cell(
            sheet_id,
            2,
            4,
            5,
            w,
            CellFormat {
                text_format: Some(text_format(16, true)),
                ..CellFormat::default()
            },
        ));
        requests.push(repeat_cell(
            sheet_id,
            2,
            4,
            w + 5,
            w * 2,
            CellFormat {
                text_format: Some(text_format(16, true)),
                ..CellFormat::default()
            },
        ));
    }

    requests
}

pub fn banner_values(plan: &LayoutPlan, sheet_title: &str, data: &ReportData) -> Vec<ValueRange> {
    let w = plan.half_width;
    let one = |row: usize, col: usize, text: String| ValueRange {
        range: sheets::a1_cell(sheet_title, row, col),
        values: vec![vec![json!(text)]],
    };

    let mut values = Vec::new();
    for base in [0, w] {
        values.push(one(0, base, data.institution.clone()));
        values.push(one(1, base, data.department.clone()));
        values.push(one(2, base, format!("SEMESTER : {}", data.semester)));
        values.push(one(2, base + 2, data.class_label.clone()));
        if w > 5 {
            values.push(one(
                2,
                base + 5,
                format!("Academic Year : {}", data.academic_year),
            ));
        }
    }
    values.push(one(3, 0, "UNIT TEST : I".to_string()));
    values.push(one(3, w, "UNIT TEST : II".to_string()));
    values.push(one(4, 0, "UNIT TEST I REPORT".to_string()));
    values.push(one(4, w, "UNIT TEST II REPORT".to_string()));
    values
}

pub fn subject_header_requests(plan: &LayoutPlan, sheet_id: i64) -> Vec<SheetRequest> {
    let w = plan.half_width;
    let mut requests = Vec::new();

    for base in [0, w] {
        requests.push(merge_cells(sheet_id, 5, 7, base, base + 1)); // Roll No
        requests.push(merge_cells(sheet_id, 5, 7, base + 1, base + 2)); // Name
        requests.push(merge_cells(
            sheet_id,
            5,
            7,
            base + plan.total_col(),
            base + plan.total_col() + 1,
        ));
        requests.push(bold12(sheet_id, 5, 7, base, base + 2));
    }
    requests.push(merge_cells(
        sheet_id,
        5,
        7,
        plan.grand_total_col(),
        plan.grand_total_col() + 1,
    ));
    requests.push(merge_cells(
        sheet_id,
        5,
        7,
        plan.termwork_col(),
        plan.termwork_col() + 1,
    ));
    requests.push(bold12(sheet_id, 5, 7, plan.total_col(), w + 2));
    requests.push(bold12(
        sheet_id,
        5,
        7,
        w + plan.total_col(),
        plan.termwork_col() + 1,
    ));
    requests.push(repeat_cell(
        sheet_id,
        5,
        7,
        0,
        plan.full_width(),
        CellFormat {
            borders: Some(borders(1, 1, 1, 1)),
            ..CellFormat::default()
        },
    ));

    // Non-elective subjects: one column each, merged across both header rows.
    for &idx in &plan.non_elective {
        let col = plan.subject_cols[idx];
        for base in [0, w] {
            requests.push(merge_cells(sheet_id, 5, 7, base + col, base + col + 1));
            requests.push(repeat_cell(
                sheet_id,
                5,
                7,
                base + col,
                base + col + 1,
                CellFormat {
                    text_format: Some(colored_text(12, true, RED)),
                    ..CellFormat::default()
                },
            ));
        }
    }

    // Elective groups: a shared super-header spanning the member columns,
    // member titles on the row beneath.
    for span in &plan.elective_spans {
        let start = span.start_col;
        let end = start + span.members.len();
        for base in [0, w] {
            requests.push(merge_cells(sheet_id, 5, 6, base + start, base + end));
            requests.push(repeat_cell(
                sheet_id,
                5,
                6,
                base + start,
                base + end,
                CellFormat {
                    text_format: Some(text_format(10, true)),
                    ..CellFormat::default()
                },
            ));
            requests.push(repeat_cell(
                sheet_id,
                6,
                7,
                base + start,
                base + end,
                CellFormat {
                    text_format: Some(colored_text(12, true, RED)),
                    ..CellFormat::default()
                },
            ));
        }
    }

    requests
}

pub fn subject_header_values(
    plan: &LayoutPlan,
    sheet_title: &str,
    data: &ReportData,
) -> Vec<ValueRange> {
    let w = plan.half_width;
    let out_of = plan.marks_out_of();
    let one = |row: usize, col: usize, value: Value| ValueRange {
        range: sheets::a1_cell(sheet_title, row, col),
        values: vec![vec![value]],
    };

    let mut values = Vec::new();
    for base in [0, w] {
        values.push(one(5, base, json!("Roll No")));
        values.push(one(5, base + 1, json!("Name of Student")));
        values.push(one(
            5,
            base + plan.total_col(),
            json!(format!("Out of {}", out_of)),
        ));
    }
    values.push(one(
        5,
        plan.grand_total_col(),
        json!(format!("Out of {}", out_of * 2)),
    ));
    values.push(one(
        5,
        plan.termwork_col(),
        json!("Out of 20\n(For Termwork)"),
    ));

    for &idx in &plan.non_elective {
        let col = plan.subject_cols[idx];
        let label = data.subjects[idx].label();
        values.push(one(5, col, json!(label.clone())));
        values.push(one(5, w + col, json!(label)));
    }

    for span in &plan.elective_spans {
        let labels: Vec<Value> = span
            .members
            .iter()
            .map(|&i| json!(data.subjects[i].label()))
            .collect();
        values.push(one(5, span.start_col, json!(span.group.clone())));
        values.push(one(5, w + span.start_col, json!(span.group.clone())));
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, 6, span.start_col),
            values: vec![labels.clone()],
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, 6, w + span.start_col),
            values: vec![labels],
        });
    }

    values
}

/// The full data grid, one row per student:
/// roll, name, UT1 marks, UT1 total | roll, name, UT2 marks, UT2 total |
/// grand total, termwork.
pub fn marks_rows(data: &ReportData, stats: &AggregatedStats) -> Vec<Vec<Value>> {
    let mut rows = Vec::with_capacity(data.roll_nos.len());
    for (i, roll_no) in data.roll_nos.iter().enumerate() {
        let totals = &stats.students[i];
        let mut row = Vec::new();

        row.push(json!(roll_no));
        row.push(json!(data.names[i]));
        for subject in &data.subjects {
            row.push(mark_value(data.mark(roll_no, &subject.title, Term::Ut1)));
        }
        row.push(num(totals.ut1_total));

        row.push(json!(roll_no));
        row.push(json!(data.names[i]));
        for subject in &data.subjects {
            row.push(mark_value(data.mark(roll_no, &subject.title, Term::Ut2)));
        }
        row.push(num(totals.ut2_total));

        row.push(num(totals.grand_total));
        row.push(json!(totals.termwork));

        rows.push(row);
    }
    rows
}

pub fn marks_requests(plan: &LayoutPlan, sheet_id: i64, min_ut_marks: f64) -> Vec<SheetRequest> {
    let w = plan.half_width;
    let top = plan.data_start_row();
    let bottom = plan.data_end_row();

    let mut requests = vec![
        repeat_cell(
            sheet_id,
            top,
            bottom,
            0,
            plan.full_width(),
            CellFormat {
                text_format: Some(text_format(12, false)),
                borders: Some(borders(1, 1, 1, 1)),
                ..CellFormat::default()
            },
        ),
        // Absent markers in red across both halves.
        SheetRequest::AddConditionalFormat {
            rule: ConditionalFormatRule {
                ranges: vec![grid_range(sheet_id, top, bottom, 0, w * 2)],
                condition: Condition::TextEq {
                    value: "A".to_string(),
                },
                format: CellFormat {
                    text_format: Some(red_only()),
                    ..CellFormat::default()
                },
            },
            index: 0,
        },
    ];

    // Below-threshold marks get a yellow background, mark columns only.
    for (index, base) in [(1_usize, 0_usize), (2, w)] {
        requests.push(SheetRequest::AddConditionalFormat {
            rule: ConditionalFormatRule {
                ranges: vec![grid_range(
                    sheet_id,
                    top,
                    bottom,
                    base + 2,
                    base + plan.total_col(),
                )],
                condition: Condition::NumberLess {
                    value: min_ut_marks,
                },
                format: CellFormat {
                    background_color: Some(YELLOW),
                    ..CellFormat::default()
                },
            },
            index,
        });
    }

    requests.push(repeat_cell(
        sheet_id,
        top,
        bottom,
        plan.total_col(),
        plan.total_col() + 1,
        CellFormat {
            text_format: Some(bold_only()),
            ..CellFormat::default()
        },
    ));
    requests.push(repeat_cell(
        sheet_id,
        top,
        bottom,
        w + plan.total_col(),
        plan.termwork_col() + 1,
        CellFormat {
            text_format: Some(bold_only()),
            ..CellFormat::default()
        },
    ));

    // Wide, left-aligned name columns in both halves.
    for base in [0, w] {
        requests.push(update_dimensions(
            sheet_id,
            Dimension::Columns,
            base + 1,
            base + 2,
            NAME_COL_PIXELS,
        ));
        requests.push(SheetRequest::RepeatCell {
            range: grid_range(sheet_id, top, bottom, base + 1, base + 2),
            format: CellFormat {
                horizontal_alignment: Some(HorizontalAlign::Left),
                padding: Some(Padding {
                    top: 0,
                    bottom: 0,
                    left: 6,
                    right: 0,
                }),
                ..CellFormat::default()
            },
        });
    }

    requests
}

fn red_only() -> sheets::TextFormat {
    sheets::TextFormat {
        foreground_color: Some(RED),
        ..sheets::TextFormat::default()
    }
}

fn bold_only() -> sheets::TextFormat {
    sheets::TextFormat {
        bold: true,
        ..sheets::TextFormat::default()
    }
}

pub fn stats_requests(plan: &LayoutPlan, sheet_id: i64) -> Vec<SheetRequest> {
    let w = plan.half_width;
    let table_end = plan.subject_count + 2;
    let stats_row = plan.stats_row();
    let avg_row = plan.total_average_row();
    let note_row = plan.note_row();
    let ranges_row = plan.ranges_row();
    let thick = borders(2, 2, 2, 2);

    let mut requests = Vec::new();

    for base in [0, w] {
        // Stats table frame and formats.
        requests.push(update_borders(
            sheet_id,
            stats_row,
            stats_row + STATS_HEIGHT,
            base + 1,
            base + table_end,
            thick,
        ));
        requests.push(repeat_cell(
            sheet_id,
            stats_row,
            stats_row + STATS_HEIGHT,
            base,
            base + w,
            CellFormat {
                text_format: Some(text_format(12, false)),
                ..CellFormat::default()
            },
        ));
        requests.push(repeat_cell(
            sheet_id,
            stats_row,
            stats_row + 1,
            base,
            base + w,
            CellFormat {
                text_format: Some(colored_text(12, true, RED)),
                ..CellFormat::default()
            },
        ));
        requests.push(bold12(
            sheet_id,
            stats_row + 1,
            stats_row + STATS_HEIGHT,
            base + 1,
            base + 2,
        ));

        // Grand average strip.
        requests.push(update_borders(
            sheet_id,
            avg_row,
            avg_row + 1,
            base + 1,
            base + 3,
            thick,
        ));
        requests.push(repeat_cell(
            sheet_id,
            avg_row,
            avg_row + 1,
            base,
            base + w,
            CellFormat {
                text_format: Some(colored_text(14, true, BROWN_ACCENT)),
                ..CellFormat::default()
            },
        ));

        // Note block: label cell, threshold note, legend.
        requests.push(update_borders(
            sheet_id,
            note_row,
            note_row + NOTE_HEIGHT,
            base + 1,
            base + table_end,
            thick,
        ));
        requests.push(merge_cells(
            sheet_id,
            note_row,
            note_row + NOTE_HEIGHT,
            base + 1,
            base + 2,
        ));
        requests.push(merge_cells(
            sheet_id,
            note_row,
            note_row + 1,
            base + 2,
            base + table_end,
        ));
        requests.push(merge_cells(
            sheet_id,
            note_row + 1,
            note_row + 2,
            base + 3,
            base + table_end,
        ));
        requests.push(merge_cells(
            sheet_id,
            note_row + 2,
            note_row + NOTE_HEIGHT,
            base + 3,
            base + table_end,
        ));
        requests.push(repeat_cell(
            sheet_id,
            note_row,
            note_row + 1,
            base + 1,
            base + 2,
            CellFormat {
                text_format: Some(colored_text(14, true, BROWN_ACCENT)),
                ..CellFormat::default()
            },
        ));
        requests.push(repeat_cell(
            sheet_id,
            note_row,
            note_row + 1,
            base + 2,
            base + 3,
            CellFormat {
                text_format: Some(colored_text(12, true, BROWN_ACCENT)),
                ..CellFormat::default()
            },
        ));
        requests.push(repeat_cell(
            sheet_id,
            note_row + 1,
            note_row + 2,
            base + 2,
            base + 3,
            CellFormat {
                text_format: Some(colored_text(12, true, RED)),
                ..CellFormat::default()
            },
        ));
        requests.push(SheetRequest::RepeatCell {
            range: grid_range(sheet_id, note_row + 2, note_row + NOTE_HEIGHT, base + 2, base + 3),
            format: CellFormat {
                background_color: Some(YELLOW),
                ..CellFormat::default()
            },
        });
        requests.push(bold12(
            sheet_id,
            note_row + 1,
            note_row + NOTE_HEIGHT,
            base + 3,
            base + table_end,
        ));

        // Mark-range table frame and formats.
        requests.push(update_borders(
            sheet_id,
            ranges_row,
            ranges_row + RANGES_HEIGHT,
            base + 1,
            base + table_end,
            thick,
        ));
        requests.push(repeat_cell(
            sheet_id,
            ranges_row,
            ranges_row + RANGES_HEIGHT,
            base,
            base + w,
            CellFormat {
                text_format: Some(text_format(12, false)),
                ..CellFormat::default()
            },
        ));
        requests.push(repeat_cell(
            sheet_id,
            ranges_row,
            ranges_row + 1,
            base + 2,
            base + table_end,
            CellFormat {
                text_format: Some(colored_text(12, true, RED)),
                ..CellFormat::default()
            },
        ));
        requests.push(bold12(
            sheet_id,
            ranges_row,
            ranges_row + RANGES_HEIGHT,
            base + 1,
            base + 2,
        ));
    }

    requests
}

fn stats_table(stats: &AggregatedStats, term: Term) -> Vec<Vec<Value>> {
    let pick = |s: &crate::stats::SubjectStats| match term {
        Term::Ut1 => s.ut1,
        Term::Ut2 => s.ut2,
    };

    let mut header: Vec<Value> = vec![json!("")];
    let mut absent: Vec<Value> = vec![json!("ABSENT")];
    let mut appeared: Vec<Value> = vec![json!("APPEARED")];
    let mut passed: Vec<Value> = vec![json!("PASS")];
    let mut failed: Vec<Value> = vec![json!("FAIL")];
    let mut total: Vec<Value> = vec![json!("TOTAL")];
    let mut average: Vec<Value> = vec![json!("AVG")];

    for s in &stats.subjects {
        let t = pick(s);
        header.push(json!(s.title));
        absent.push(json!(t.absent));
        appeared.push(json!(t.appeared));
        passed.push(json!(t.passed));
        failed.push(json!(t.failed));
        total.push(json!(t.total));
        average.push(average_value(t.average));
    }

    vec![header, absent, appeared, passed, failed, total, average]
}

fn ranges_table(stats: &AggregatedStats, term: Term) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(RANGES_HEIGHT);
    let mut header: Vec<Value> = vec![json!("Marks obtained by Students")];
    let mut absent: Vec<Value> = vec![json!("A")];
    let mut buckets: Vec<Vec<Value>> = MarkHistogram::LABELS
        .iter()
        .map(|label| vec![json!(label)])
        .collect();
    let mut totals: Vec<Value> = vec![json!("")];

    for s in &stats.subjects {
        let (term_stats, histogram) = match term {
            Term::Ut1 => (s.ut1, s.ut1_histogram),
            Term::Ut2 => (s.ut2, s.ut2_histogram),
        };
        header.push(json!(s.title));
        absent.push(json!(term_stats.absent));
        for (i, row) in buckets.iter_mut().enumerate() {
            row.push(json!(histogram.buckets[i]));
        }
        totals.push(json!(term_stats.total));
    }

    rows.push(header);
    rows.push(absent);
    rows.append(&mut buckets);
    rows.push(totals);
    rows
}

pub fn stats_values(
    plan: &LayoutPlan,
    sheet_title: &str,
    data: &ReportData,
    stats: &AggregatedStats,
) -> Vec<ValueRange> {
    let w = plan.half_width;
    let mut values = Vec::new();

    for (base, term, grand) in [
        (0, Term::Ut1, stats.ut1_grand_average),
        (w, Term::Ut2, stats.ut2_grand_average),
    ] {
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.stats_row(), base + 1),
            values: stats_table(stats, term),
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.total_average_row(), base + 1),
            values: vec![vec![json!("TOTAL AVG"), average_value(grand)]],
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.note_row(), base + 1),
            values: vec![vec![json!("Note")]],
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.note_row(), base + 2),
            values: vec![vec![json!(format!(
                "Considered {} marks for passing",
                num(data.min_ut_marks)
            ))]],
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.note_row() + 1, base + 2),
            values: vec![
                vec![json!("A"), json!("ABSENT")],
                vec![json!(""), json!("FAIL")],
            ],
        });
        values.push(ValueRange {
            range: sheets::a1_cell(sheet_title, plan.ranges_row(), base + 1),
            values: ranges_table(stats, term),
        });
    }

    values
}

/// Two column charts, one per term, plotting the mark-range rows per subject.
pub fn chart_requests(plan: &LayoutPlan, sheet_id: i64) -> Vec<SheetRequest> {
    let w = plan.half_width;
    let table_end = plan.subject_count + 2;
    let ranges_row = plan.ranges_row();

    [("Unit Test I", 0), ("Unit Test II", w)]
        .into_iter()
        .map(|(title, base)| SheetRequest::AddChart {
            chart: ChartSpec {
                title: title.to_string(),
                domain: grid_range(
                    sheet_id,
                    ranges_row,
                    ranges_row + 1,
                    base + 1,
                    base + table_end,
                ),
                series: (0..6)
                    .map(|i| {
                        grid_range(
                            sheet_id,
                            ranges_row + 1 + i,
                            ranges_row + 2 + i,
                            base + 1,
                            base + table_end,
                        )
                    })
                    .collect(),
                anchor_row: plan.chart_anchor_row(),
                anchor_col: base + 1,
                width_pixels: 900,
                height_pixels: 600,
            },
        })
        .collect()
}

/// Cosmetic pass: default font, auto-sized rows, cell padding.
pub fn finalize_requests(plan: &LayoutPlan, sheet_id: i64) -> Vec<SheetRequest> {
    let padding = |vertical: i64| Padding {
        top: vertical,
        bottom: vertical,
        left: 8,
        right: 8,
    };

    vec![
        SheetRequest::SetDefaultFontFamily {
            sheet_id,
            family: DEFAULT_FONT.to_string(),
        },
        SheetRequest::AutoResizeRows {
            sheet_id,
            start_index: 0,
            end_index: plan.data_end_row(),
        },
        SheetRequest::RepeatCell {
            range: grid_range(sheet_id, 0, plan.data_end_row(), 0, plan.full_width()),
            format: CellFormat {
                padding: Some(padding(5)),
                ..CellFormat::default()
            },
        },
        SheetRequest::RepeatCell {
            range: grid_range(
                sheet_id,
                plan.data_end_row() + 2,
                plan.chart_anchor_row(),
                0,
                plan.full_width(),
            ),
            format: CellFormat {
                padding: Some(padding(7)),
                ..CellFormat::default()
            },
        },
    ]
}

/// Writes the complete report into an already-created sheet. Batches are
/// issued in order; a store failure aborts immediately, leaving earlier
/// writes in place.
pub fn render_report(
    store: &mut dyn SheetStore,
    spreadsheet_id: &str,
    sheet_id: i64,
    sheet_title: &str,
    data: &ReportData,
    stats: &AggregatedStats,
    plan: &LayoutPlan,
) -> Result<(), StoreError> {
    store.batch_format(spreadsheet_id, banner_requests(plan, sheet_id))?;
    store.write_values_batch(spreadsheet_id, banner_values(plan, sheet_title, data))?;

    store.batch_format(spreadsheet_id, subject_header_requests(plan, sheet_id))?;
    store.write_values_batch(spreadsheet_id, subject_header_values(plan, sheet_title, data))?;

    store.write_values(
        spreadsheet_id,
        &sheets::a1_cell(sheet_title, plan.data_start_row(), 0),
        marks_rows(data, stats),
    )?;
    store.batch_format(spreadsheet_id, marks_requests(plan, sheet_id, data.min_ut_marks))?;

    store.batch_format(spreadsheet_id, stats_requests(plan, sheet_id))?;
    store.write_values_batch(spreadsheet_id, stats_values(plan, sheet_title, data, stats))?;

    store.batch_format(spreadsheet_id, chart_requests(plan, sheet_id))?;
    store.batch_format(spreadsheet_id, finalize_requests(plan, sheet_id))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{normalize_subjects, plan_layout};
    use crate::stats::{aggregate, ReportSubject, UnitTestEntry};
    use std::collections::HashMap;

    fn sample_data() -> ReportData {
        let subjects = normalize_subjects(vec![
            ReportSubject {
                title: "DSA".to_string(),
                elective: None,
                teacher: "ABC".to_string(),
            },
            ReportSubject {
                title: "X".to_string(),
                elective: Some("Elective-A".to_string()),
                teacher: "DEF".to_string(),
            },
            ReportSubject {
                title: "Y".to_string(),
                elective: Some("Elective-A".to_string()),
                teacher: "GHI".to_string(),
            },
        ]);
        let mut marks = HashMap::new();
        marks.insert(
            ("33167".to_string(), "DSA".to_string()),
            UnitTestEntry {
                ut1: Some(10.0),
                ut2: Some(20.0),
                ..UnitTestEntry::default()
            },
        );
        marks.insert(
            ("33168".to_string(), "DSA".to_string()),
            UnitTestEntry {
                ut1: None,
                ut1_absent: true,
                ut2: Some(14.0),
                ..UnitTestEntry::default()
            },
        );
        ReportData {
            class_label: "TE 09".to_string(),
            academic_year: "2023-24".to_string(),
            semester: 1,
            institution: "Inst".to_string(),
            department: "Dept".to_string(),
            min_ut_marks: 12.0,
            roll_nos: vec!["33167".to_string(), "33168".to_string()],
            names: vec!["AAA".to_string(), "BBB".to_string()],
            subjects,
            marks,
        }
    }

    #[test]
    fn marks_rows_mirror_both_halves() {
        let data = sample_data();
        let stats = aggregate(&data);
        let plan = plan_layout(&data.subjects, data.roll_nos.len());
        let rows = marks_rows(&data, &stats);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), plan.full_width());
        // Roll and name repeat at the UT2 half.
        assert_eq!(rows[0][0], json!("33167"));
        assert_eq!(rows[0][plan.half_width], json!("33167"));
        assert_eq!(rows[0][plan.half_width + 1], json!("AAA"));
        // Absent renders as "A" in the UT1 half only.
        assert_eq!(rows[1][2], json!("A"));
        assert_eq!(rows[1][plan.half_width + 2], json!(14));
        // Grand total and termwork close the row.
        assert_eq!(rows[0][plan.grand_total_col()], json!(30));
    }

    #[test]
    fn absent_and_threshold_rules_cover_the_data_region() {
        let data = sample_data();
        let plan = plan_layout(&data.subjects, data.roll_nos.len());
        let requests = marks_requests(&plan, 7, data.min_ut_marks);

        let rules: Vec<&ConditionalFormatRule> = requests
            .iter()
            .filter_map(|r| match r {
                SheetRequest::AddConditionalFormat { rule, .. } => Some(rule),
                _ => None,
            })
            .collect();
        assert_eq!(rules.len(), 3);
        assert!(matches!(rules[0].condition, Condition::TextEq { .. }));
        assert_eq!(rules[0].ranges[0].end_col, plan.half_width * 2);
        // Threshold rules exclude roll/name/total columns.
        assert_eq!(rules[1].ranges[0].start_col, 2);
        assert_eq!(rules[1].ranges[0].end_col, plan.total_col());
        assert_eq!(rules[2].ranges[0].start_col, plan.half_width + 2);
    }

    #[test]
    fn stats_tables_line_up_with_subjects() {
        let data = sample_data();
        let stats = aggregate(&data);
        let table = stats_table(&stats, Term::Ut1);
        // Header plus six stat rows, one column per subject plus the label.
        assert_eq!(table.len(), 7);
        assert_eq!(table[0].len(), data.subjects.len() + 1);
        assert_eq!(table[1][0], json!("ABSENT"));
        assert_eq!(table[1][1], json!(1));

        let ranges = ranges_table(&stats, Term::Ut1);
        assert_eq!(ranges.len(), RANGES_HEIGHT);
        assert_eq!(ranges[0][0], json!("Marks obtained by Students"));
        // Mark 10 lands in the 0-11 bucket for DSA.
        assert_eq!(ranges[2][0], json!("0"));
        assert_eq!(ranges[3][0], json!("0-11"));
        assert_eq!(ranges[3][1], json!(1));
    }

    #[test]
    fn charts_draw_six_series_per_term() {
        let data = sample_data();
        let plan = plan_layout(&data.subjects, data.roll_nos.len());
        let charts = chart_requests(&plan, 3);
        assert_eq!(charts.len(), 2);
        for req in charts {
            let SheetRequest::AddChart { chart } = req else {
                panic!("expected chart request");
            };
            assert_eq!(chart.series.len(), 6);
            assert_eq!(chart.domain.start_row, plan.ranges_row());
        }
    }
}
