use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::model::{DraftEntry, SubmissionOutcome, SubmitReport};

#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub entries: Vec<DraftEntry>,
}

/// Entries grouped by day, earliest first. Order within a day is batch order.
pub fn group_by_day(entries: &[DraftEntry]) -> Vec<DaySummary> {
    let mut days: BTreeMap<NaiveDate, Vec<DraftEntry>> = BTreeMap::new();
    for entry in entries {
        days.entry(entry.date).or_default().push(entry.clone());
    }
    days.into_iter()
        .map(|(date, entries)| DaySummary {
            date,
            total_hours: entries.iter().map(|e| e.hours).sum(),
            entries,
        })
        .collect()
}

pub fn render_text(entries: &[DraftEntry]) -> String {
    let mut out = String::new();
    for day in group_by_day(entries) {
        let _ = writeln!(
            out,
            "{} ({})  {:.2}h",
            day.date.format("%Y-%m-%d"),
            day.date.format("%a"),
            day.total_hours
        );
        for e in &day.entries {
            let task = e.task_id.map(|id| format!("#{}", id)).unwrap_or_default();
            let _ = writeln!(
                out,
                "  [{:<7}] {:>5.2}h  {:<14} {:<8} {}",
                e.existence.as_str(),
                e.hours,
                e.category,
                task,
                e.description
            );
        }
    }
    out
}

pub fn render_report(report: &SubmitReport) -> String {
    let mut out = format!(
        "created: {}, skipped: {}, failed: {}\n",
        report.created(),
        report.skipped(),
        report.failed().len()
    );
    for r in &report.outcomes {
        if let SubmissionOutcome::Failed(err) = &r.outcome {
            let _ = writeln!(
                out,
                "  FAILED {} {} {:.2}h {}: {}",
                r.entry.spent_on(),
                r.entry.category,
                r.entry.hours,
                r.entry.description,
                err
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Existence;

    fn entry(d: u32, hours: f64, description: &str) -> DraftEntry {
        DraftEntry {
            category: "Dev".into(),
            task_id: Some(3),
            description: description.into(),
            hours,
            date: NaiveDate::from_ymd_opt(2023, 7, d).unwrap(),
            existence: Existence::Absent,
        }
    }

    #[test]
    fn groups_and_totals_by_day() {
        let entries = vec![entry(4, 1.0, "b"), entry(3, 2.0, "a"), entry(4, 0.5, "c")];
        let days = group_by_day(&entries);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2023, 7, 3).unwrap());
        assert_eq!(days[0].total_hours, 2.0);
        assert_eq!(days[1].total_hours, 1.5);
        let descriptions: Vec<&str> = days[1].entries.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["b", "c"]);
    }

    #[test]
    fn text_shows_existence_tag() {
        let mut entries = vec![entry(3, 2.0, "a")];
        entries[0].existence = Existence::Exists;
        let text = render_text(&entries);
        assert!(text.starts_with("2023-07-03 (Mon)  2.00h"));
        assert!(text.contains("[exists ]"));
        assert!(text.contains("#3"));
    }
}
