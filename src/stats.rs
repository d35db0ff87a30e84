//! Per-class unit-test statistics.
//!
//! Pure computation over an immutable [`ReportData`] snapshot; persistence and
//! rendering stay out of this module.

use serde::Serialize;
use std::collections::HashMap;

/// A subject column in the report, already normalized into render order
/// (regular subjects first, then elective groups with members adjacent).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubject {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elective: Option<String>,
    /// Short teacher tag shown under the subject title (first three letters,
    /// upper-cased).
    pub teacher: String,
}

impl ReportSubject {
    /// Column label: subject title with the teacher tag on the second line.
    pub fn label(&self) -> String {
        format!("{}\n({})", self.title, self.teacher)
    }
}

/// Recorded unit-test entry for one student and subject.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitTestEntry {
    pub ut1: Option<f64>,
    pub ut2: Option<f64>,
    pub ut1_absent: bool,
    pub ut2_absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkCell {
    Absent,
    Marked(f64),
    /// No mark recorded and not flagged absent; rendered blank and excluded
    /// from both appeared and absent counts.
    Missing,
}

impl MarkCell {
    fn from_entry(mark: Option<f64>, absent: bool) -> MarkCell {
        if absent {
            MarkCell::Absent
        } else {
            match mark {
                Some(v) => MarkCell::Marked(v),
                None => MarkCell::Missing,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Ut1,
    Ut2,
}

/// Working set for one class report. Built fresh per class per generation,
/// discarded after rendering.
#[derive(Debug, Clone)]
pub struct ReportData {
    pub class_label: String,
    pub academic_year: String,
    pub semester: i64,
    pub institution: String,
    pub department: String,
    pub min_ut_marks: f64,
    /// Ascending numeric roll order.
    pub roll_nos: Vec<String>,
    /// Upper-cased names, aligned with `roll_nos`.
    pub names: Vec<String>,
    pub subjects: Vec<ReportSubject>,
    pub marks: HashMap<(String, String), UnitTestEntry>,
}

impl ReportData {
    pub fn mark(&self, roll_no: &str, subject: &str, term: Term) -> MarkCell {
        match self
            .marks
            .get(&(roll_no.to_string(), subject.to_string()))
        {
            None => MarkCell::Missing,
            Some(e) => match term {
                Term::Ut1 => MarkCell::from_entry(e.ut1, e.ut1_absent),
                Term::Ut2 => MarkCell::from_entry(e.ut2, e.ut2_absent),
            },
        }
    }

    /// Assessment slots a student fills: regular subjects plus one per
    /// elective group (a student takes a single subject per group).
    pub fn slot_count(&self) -> usize {
        let regular = self.subjects.iter().filter(|s| s.elective.is_none()).count();
        let mut groups: Vec<&str> = Vec::new();
        for s in &self.subjects {
            if let Some(g) = s.elective.as_deref() {
                if !groups.contains(&g) {
                    groups.push(g);
                }
            }
        }
        regular + groups.len()
    }
}

/// Fixed mark-range histogram over the 0-30 domain. Buckets are mutually
/// exclusive and exhaustive: exactly 0, 1-11, 12-17, 18-22, 23-30.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkHistogram {
    pub buckets: [u32; 5],
}

impl MarkHistogram {
    pub const LABELS: [&'static str; 5] = ["0", "0-11", "12-17", "18-22", "23-30"];

    pub fn bucket_for(mark: f64) -> usize {
        if mark <= 0.0 {
            0
        } else if mark <= 11.0 {
            1
        } else if mark <= 17.0 {
            2
        } else if mark <= 22.0 {
            3
        } else {
            4
        }
    }

    fn record(&mut self, mark: f64) {
        self.buckets[Self::bucket_for(mark)] += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStats {
    pub absent: u32,
    pub appeared: u32,
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    /// `passed / appeared * 100`, two decimals; `None` when nobody appeared.
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub title: String,
    pub ut1: TermStats,
    pub ut2: TermStats,
    pub ut1_histogram: MarkHistogram,
    pub ut2_histogram: MarkHistogram,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotals {
    pub roll_no: String,
    pub ut1_total: f64,
    pub ut2_total: f64,
    pub grand_total: f64,
    /// Scaled to the 20-point termwork component.
    pub termwork: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    pub subjects: Vec<SubjectStats>,
    /// Unweighted mean of per-subject averages (not weighted by appearances).
    pub ut1_grand_average: Option<f64>,
    pub ut2_grand_average: Option<f64>,
    pub students: Vec<StudentTotals>,
}

/// Two-decimal rounding used for the report's percentage cells.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Ascending numeric roll order; non-numeric rolls sort last by string order
/// so bad data stays visible instead of disappearing.
pub fn roll_no_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let pa = a.parse::<i64>();
    let pb = b.parse::<i64>();
    match (pa, pb) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub fn sort_roll_nos(roll_nos: &mut [String]) {
    roll_nos.sort_by(|a, b| roll_no_cmp(a, b));
}

fn term_average(passed: u32, appeared: u32) -> Option<f64> {
    if appeared == 0 {
        None
    } else {
        Some(round2(passed as f64 / appeared as f64 * 100.0))
    }
}

fn grand_average(subjects: &[SubjectStats], term: Term) -> Option<f64> {
    let averages: Vec<f64> = subjects
        .iter()
        .filter_map(|s| match term {
            Term::Ut1 => s.ut1.average,
            Term::Ut2 => s.ut2.average,
        })
        .collect();
    if averages.is_empty() {
        None
    } else {
        Some(round2(averages.iter().sum::<f64>() / averages.len() as f64))
    }
}

pub fn aggregate(data: &ReportData) -> AggregatedStats {
    let mut subjects: Vec<SubjectStats> = Vec::with_capacity(data.subjects.len());

    let mut ut1_totals = vec![0.0_f64; data.roll_nos.len()];
    let mut ut2_totals = vec![0.0_f64; data.roll_nos.len()];

    for subject in &data.subjects {
        let mut ut1 = TermStats::default();
        let mut ut2 = TermStats::default();
        let mut ut1_histogram = MarkHistogram::default();
        let mut ut2_histogram = MarkHistogram::default();

        for (i, roll_no) in data.roll_nos.iter().enumerate() {
            for (term, stats, histogram, totals) in [
                (Term::Ut1, &mut ut1, &mut ut1_histogram, &mut ut1_totals),
                (Term::Ut2, &mut ut2, &mut ut2_histogram, &mut ut2_totals),
            ] {
                match data.mark(roll_no, &subject.title, term) {
                    MarkCell::Absent => stats.absent += 1,
                    MarkCell::Marked(v) => {
                        stats.appeared += 1;
                        if v >= data.min_ut_marks {
                            stats.passed += 1;
                        } else {
                            stats.failed += 1;
                        }
                        histogram.record(v);
                        totals[i] += v;
                    }
                    MarkCell::Missing => {}
                }
            }
        }

        ut1.total = ut1.appeared + ut1.absent;
        ut2.total = ut2.appeared + ut2.absent;
        ut1.average = term_average(ut1.passed, ut1.appeared);
        ut2.average = term_average(ut2.passed, ut2.appeared);

        subjects.push(SubjectStats {
            title: subject.title.clone(),
            ut1,
            ut2,
            ut1_histogram,
            ut2_histogram,
        });
    }

    let slot_count = data.slot_count();
    let out_of = slot_count as f64 * 60.0;
    let students = data
        .roll_nos
        .iter()
        .enumerate()
        .map(|(i, roll_no)| {
            let grand_total = ut1_totals[i] + ut2_totals[i];
            let termwork = if out_of > 0.0 {
                (20.0 * grand_total / out_of).round() as i64
            } else {
                0
            };
            StudentTotals {
                roll_no: roll_no.clone(),
                ut1_total: ut1_totals[i],
                ut2_total: ut2_totals[i],
                grand_total,
                termwork,
            }
        })
        .collect();

    AggregatedStats {
        ut1_grand_average: grand_average(&subjects, Term::Ut1),
        ut2_grand_average: grand_average(&subjects, Term::Ut2),
        subjects,
        students,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(title: &str) -> ReportSubject {
        ReportSubject {
            title: title.to_string(),
            elective: None,
            teacher: "ABC".to_string(),
        }
    }

    fn entry(ut1: Option<f64>, ut1_absent: bool, ut2: Option<f64>, ut2_absent: bool) -> UnitTestEntry {
        UnitTestEntry {
            ut1,
            ut2,
            ut1_absent,
            ut2_absent,
        }
    }

    fn data_with(
        subjects: Vec<ReportSubject>,
        rolls: &[&str],
        marks: Vec<((&str, &str), UnitTestEntry)>,
    ) -> ReportData {
        ReportData {
            class_label: "TE 09".to_string(),
            academic_year: "2023-24".to_string(),
            semester: 1,
            institution: "Inst".to_string(),
            department: "Dept".to_string(),
            min_ut_marks: 12.0,
            roll_nos: rolls.iter().map(|s| s.to_string()).collect(),
            names: rolls.iter().map(|_| "X".to_string()).collect(),
            subjects,
            marks: marks
                .into_iter()
                .map(|((r, s), e)| ((r.to_string(), s.to_string()), e))
                .collect(),
        }
    }

    #[test]
    fn roll_nos_sort_numerically() {
        let mut rolls = vec![
            "33170".to_string(),
            "33167".to_string(),
            "33168".to_string(),
        ];
        sort_roll_nos(&mut rolls);
        assert_eq!(rolls, vec!["33167", "33168", "33170"]);
    }

    #[test]
    fn histogram_buckets_are_exclusive_and_exhaustive() {
        assert_eq!(MarkHistogram::bucket_for(0.0), 0);
        assert_eq!(MarkHistogram::bucket_for(1.0), 1);
        assert_eq!(MarkHistogram::bucket_for(11.0), 1);
        assert_eq!(MarkHistogram::bucket_for(12.0), 2);
        assert_eq!(MarkHistogram::bucket_for(17.0), 2);
        assert_eq!(MarkHistogram::bucket_for(18.0), 3);
        assert_eq!(MarkHistogram::bucket_for(22.0), 3);
        assert_eq!(MarkHistogram::bucket_for(23.0), 4);
        assert_eq!(MarkHistogram::bucket_for(30.0), 4);
    }

    #[test]
    fn counters_hold_invariants() {
        let data = data_with(
            vec![subject("DSA")],
            &["33167", "33168", "33170"],
            vec![
                (("33167", "DSA"), entry(Some(10.0), false, Some(15.0), false)),
                (("33168", "DSA"), entry(None, true, Some(8.0), false)),
                (("33170", "DSA"), entry(Some(25.0), false, None, true)),
            ],
        );
        let agg = aggregate(&data);
        let s = &agg.subjects[0];

        assert_eq!(s.ut1.absent, 1);
        assert_eq!(s.ut1.appeared, 2);
        assert_eq!(s.ut1.total, s.ut1.appeared + s.ut1.absent);
        assert_eq!(s.ut1.passed + s.ut1.failed, s.ut1.appeared);
        assert_eq!(s.ut1.passed, 1);
        assert_eq!(s.ut1.failed, 1);
        assert_eq!(s.ut1.average, Some(50.0));
        assert_eq!(s.ut1_histogram.buckets, [0, 1, 0, 0, 1]);

        assert_eq!(s.ut2.absent, 1);
        assert_eq!(s.ut2.appeared, 2);
        assert_eq!(s.ut2.passed, 1);
        assert_eq!(s.ut2.failed, 1);
    }

    #[test]
    fn missing_marks_count_toward_neither_absent_nor_appeared() {
        let data = data_with(
            vec![subject("DSA")],
            &["33167", "33168"],
            vec![(("33167", "DSA"), entry(Some(20.0), false, None, false))],
        );
        let agg = aggregate(&data);
        let s = &agg.subjects[0];
        assert_eq!(s.ut1.appeared, 1);
        assert_eq!(s.ut1.absent, 0);
        // UT2 not yet recorded for anyone.
        assert_eq!(s.ut2.appeared, 0);
        assert_eq!(s.ut2.absent, 0);
        assert_eq!(s.ut2.average, None);
    }

    #[test]
    fn grand_average_is_unweighted_mean_of_subject_averages() {
        // One subject everyone passes, one subject one student fails; the
        // appeared counts differ but the grand average ignores them.
        let data = data_with(
            vec![subject("A"), subject("B")],
            &["1", "2", "3"],
            vec![
                (("1", "A"), entry(Some(20.0), false, None, false)),
                (("2", "A"), entry(Some(25.0), false, None, false)),
                (("3", "A"), entry(Some(28.0), false, None, false)),
                (("1", "B"), entry(Some(5.0), false, None, false)),
            ],
        );
        let agg = aggregate(&data);
        assert_eq!(agg.subjects[0].ut1.average, Some(100.0));
        assert_eq!(agg.subjects[1].ut1.average, Some(0.0));
        assert_eq!(agg.ut1_grand_average, Some(50.0));
        assert_eq!(agg.ut2_grand_average, None);
    }

    #[test]
    fn termwork_scales_to_twenty_points() {
        // One regular subject and one elective group of two: two slots, so
        // the grand total is out of 120.
        let mut elective_x = subject("X");
        elective_x.elective = Some("Elective-A".to_string());
        let mut elective_y = subject("Y");
        elective_y.elective = Some("Elective-A".to_string());

        let data = data_with(
            vec![subject("DSA"), elective_x, elective_y],
            &["1"],
            vec![
                (("1", "DSA"), entry(Some(30.0), false, Some(30.0), false)),
                (("1", "X"), entry(Some(15.0), false, Some(15.0), false)),
            ],
        );
        assert_eq!(data.slot_count(), 2);
        let agg = aggregate(&data);
        let totals = &agg.students[0];
        assert_eq!(totals.grand_total, 90.0);
        // round(20 * 90 / 120) = 15
        assert_eq!(totals.termwork, 15);
    }

    #[test]
    fn absent_and_missing_contribute_zero_to_totals() {
        let data = data_with(
            vec![subject("A"), subject("B")],
            &["1"],
            vec![
                (("1", "A"), entry(Some(18.0), false, None, true)),
                // no record at all for subject B
            ],
        );
        let agg = aggregate(&data);
        assert_eq!(agg.students[0].ut1_total, 18.0);
        assert_eq!(agg.students[0].ut2_total, 0.0);
        assert_eq!(agg.students[0].grand_total, 18.0);
    }
}
