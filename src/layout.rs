//! Layout planning for the two-half (UT1 | UT2) master report sheet.
//!
//! All indices are zero-based. The two halves mirror each other structurally:
//! the UT2 half starts at `half_width`, and the grand-total / termwork columns
//! sit after it.

use crate::stats::ReportSubject;

/// Fixed header region: banner rows 0-4 plus the two subject-header rows.
pub const HEADER_ROWS: usize = 7;

/// Row offsets of the trailing regions, measured from the last data row.
pub const STATS_OFFSET: usize = 2;
pub const STATS_HEIGHT: usize = 7;
pub const TOTAL_AVERAGE_OFFSET: usize = 11;
pub const NOTE_OFFSET: usize = 14;
pub const NOTE_HEIGHT: usize = 3;
pub const RANGES_OFFSET: usize = 19;
pub const RANGES_HEIGHT: usize = 8;
pub const CHART_OFFSET: usize = 30;

/// One elective group's shared super-header span within a half.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectiveSpan {
    pub group: String,
    /// First member column within the half.
    pub start_col: usize,
    /// Indices into the normalized subject list.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    /// Data columns per half: roll + name + one per subject + total.
    pub half_width: usize,
    /// Individual subject columns (elective members counted separately).
    pub subject_count: usize,
    /// Non-elective subjects plus distinct elective groups.
    pub slot_count: usize,
    /// Column within the half for each normalized subject, in order.
    pub subject_cols: Vec<usize>,
    /// Normalized subject indices of the non-elective subjects.
    pub non_elective: Vec<usize>,
    pub elective_spans: Vec<ElectiveSpan>,
    pub student_count: usize,
}

impl LayoutPlan {
    pub fn data_start_row(&self) -> usize {
        HEADER_ROWS
    }

    pub fn data_end_row(&self) -> usize {
        HEADER_ROWS + self.student_count
    }

    pub fn stats_row(&self) -> usize {
        self.data_end_row() + STATS_OFFSET
    }

    pub fn total_average_row(&self) -> usize {
        self.data_end_row() + TOTAL_AVERAGE_OFFSET
    }

    pub fn note_row(&self) -> usize {
        self.data_end_row() + NOTE_OFFSET
    }

    pub fn ranges_row(&self) -> usize {
        self.data_end_row() + RANGES_OFFSET
    }

    pub fn chart_anchor_row(&self) -> usize {
        self.data_end_row() + CHART_OFFSET
    }

    /// Per-half total column (last column of the half).
    pub fn total_col(&self) -> usize {
        self.half_width - 1
    }

    /// Mirrors a UT1-half column into the UT2 half.
    pub fn ut2_col(&self, col: usize) -> usize {
        self.half_width + col
    }

    pub fn grand_total_col(&self) -> usize {
        self.half_width * 2
    }

    pub fn termwork_col(&self) -> usize {
        self.half_width * 2 + 1
    }

    /// Total column count of the sheet.
    pub fn full_width(&self) -> usize {
        self.half_width * 2 + 2
    }

    /// Marks obtainable per half: one 30-mark test per slot.
    pub fn marks_out_of(&self) -> usize {
        self.slot_count * 30
    }
}

/// Reorders subjects into render order: non-electives in curriculum order,
/// then elective groups in first-appearance order with members adjacent.
/// Keeps header spans and mark columns aligned regardless of how the
/// curriculum interleaves electives.
pub fn normalize_subjects(subjects: Vec<ReportSubject>) -> Vec<ReportSubject> {
    let mut ordered: Vec<ReportSubject> = subjects
        .iter()
        .filter(|s| s.elective.is_none())
        .cloned()
        .collect();

    let mut groups: Vec<&str> = Vec::new();
    for s in &subjects {
        if let Some(g) = s.elective.as_deref() {
            if !groups.contains(&g) {
                groups.push(g);
            }
        }
    }
    for group in groups {
        ordered.extend(
            subjects
                .iter()
                .filter(|s| s.elective.as_deref() == Some(group))
                .cloned(),
        );
    }
    ordered
}

/// Plans column allocation for an already-normalized subject list.
pub fn plan_layout(subjects: &[ReportSubject], student_count: usize) -> LayoutPlan {
    let subject_count = subjects.len();
    let half_width = 2 + subject_count + 1;

    // Subjects are contiguous after the roll/name columns.
    let subject_cols: Vec<usize> = (0..subject_count).map(|i| 2 + i).collect();

    let non_elective: Vec<usize> = subjects
        .iter()
        .enumerate()
        .filter(|(_, s)| s.elective.is_none())
        .map(|(i, _)| i)
        .collect();

    let mut elective_spans: Vec<ElectiveSpan> = Vec::new();
    for (i, s) in subjects.iter().enumerate() {
        let Some(group) = s.elective.as_deref() else {
            continue;
        };
        match elective_spans.iter_mut().find(|span| span.group == group) {
            Some(span) => span.members.push(i),
            None => elective_spans.push(ElectiveSpan {
                group: group.to_string(),
                start_col: subject_cols[i],
                members: vec![i],
            }),
        }
    }

    let slot_count = non_elective.len() + elective_spans.len();

    LayoutPlan {
        half_width,
        subject_count,
        slot_count,
        subject_cols,
        non_elective,
        elective_spans,
        student_count,
    }
}
