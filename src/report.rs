//! Run-level aggregates over the output records.
//!
//! Counts per category plus a per-day trend. The trend reparses each record's
//! raw `Date:` header on a best-effort basis; records whose date cannot be
//! read still count toward the totals.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::pipeline::types::{Category, ClassificationSource, OutputRecord};

/// Trailing RFC 2822 comment, e.g. `... +0000 (UTC)`.
static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("comment pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Category counts for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub counts: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    /// Always all four categories, in `Category::ALL` order.
    pub categories: Vec<CategoryCount>,
    /// Ascending by date; only days with at least one dated record.
    pub daily: Vec<DailyTrend>,
}

impl RunSummary {
    pub fn from_records(records: &[OutputRecord]) -> Self {
        let mut daily: BTreeMap<NaiveDate, BTreeMap<Category, usize>> = BTreeMap::new();
        for record in records {
            if let Some(day) = parse_loose_date(&record.date) {
                *daily.entry(day).or_default().entry(record.category).or_default() += 1;
            }
        }

        Self {
            total: records.len(),
            categories: count_categories(records.iter().map(|r| r.category)),
            daily: daily
                .into_iter()
                .map(|(date, counts)| DailyTrend {
                    date,
                    counts: Category::ALL
                        .iter()
                        .map(|&category| CategoryCount {
                            category,
                            count: counts.get(&category).copied().unwrap_or(0),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn count(&self, category: Category) -> usize {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map_or(0, |c| c.count)
    }
}

fn count_categories(categories: impl Iterator<Item = Category>) -> Vec<CategoryCount> {
    let mut counts = Category::ALL.map(|category| CategoryCount { category, count: 0 });
    for category in categories {
        if let Some(slot) = counts.iter_mut().find(|c| c.category == category) {
            slot.count += 1;
        }
    }
    counts.to_vec()
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub records: Vec<OutputRecord>,
    /// `None` when there was nothing to classify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ClassificationSource>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(records: Vec<OutputRecord>, source: Option<ClassificationSource>) -> Self {
        let summary = RunSummary::from_records(&records);
        Self {
            records,
            source,
            summary,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// UTC calendar day of a raw `Date:` header: RFC 2822 (trailing comment
/// allowed), then RFC 3339.
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = TRAILING_COMMENT.replace(trimmed, "");

    DateTime::parse_from_rfc2822(&stripped)
        .or_else(|_| DateTime::parse_from_rfc3339(&stripped))
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: Category, date: &str) -> OutputRecord {
        OutputRecord {
            from: "Acme".into(),
            subject: "s".into(),
            date: date.into(),
            category,
            summary: "x".into(),
            suggested_action: category.suggested_action().into(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── Date parsing tests ──────────────────────────────────────────

    #[test]
    fn parses_rfc2822() {
        assert_eq!(
            parse_loose_date("Mon, 12 Oct 2026 09:30:00 +0000"),
            Some(day(2026, 10, 12))
        );
    }

    #[test]
    fn parses_rfc2822_with_comment() {
        assert_eq!(
            parse_loose_date("Tue, 13 Oct 2026 10:10:00 -0700 (PDT)"),
            Some(day(2026, 10, 13))
        );
    }

    #[test]
    fn buckets_by_utc_day() {
        // Late evening west of UTC is already the next day in UTC.
        assert_eq!(
            parse_loose_date("Tue, 13 Oct 2026 23:10:00 -0700"),
            Some(day(2026, 10, 14))
        );
        // Early morning east of UTC is still the previous day.
        assert_eq!(
            parse_loose_date("2026-10-14T01:00:00+02:00"),
            Some(day(2026, 10, 13))
        );
    }

    #[test]
    fn parses_rfc3339() {
        assert_eq!(
            parse_loose_date("2026-10-14T08:00:00+02:00"),
            Some(day(2026, 10, 14))
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_loose_date(""), None);
        assert_eq!(parse_loose_date("last Tuesday"), None);
    }

    // ── Summary tests ───────────────────────────────────────────────

    #[test]
    fn counts_in_fixed_order() {
        let summary = RunSummary::from_records(&[
            record(Category::Negative, ""),
            record(Category::Positive, ""),
            record(Category::Negative, ""),
        ]);
        let order: Vec<Category> = summary.categories.iter().map(|c| c.category).collect();
        assert_eq!(order, Category::ALL.to_vec());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(Category::Negative), 2);
        assert_eq!(summary.count(Category::FollowUpNeeded), 0);
    }

    #[test]
    fn daily_trend_groups_and_drops_undated() {
        let summary = RunSummary::from_records(&[
            record(Category::Positive, "Tue, 13 Oct 2026 10:00:00 +0000"),
            record(Category::Positive, "Mon, 12 Oct 2026 09:30:00 +0000"),
            record(Category::Neutral, "Tue, 13 Oct 2026 17:45:00 +0000 (UTC)"),
            record(Category::Negative, "not a date"),
        ]);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.daily.len(), 2);
        assert_eq!(summary.daily[0].date, day(2026, 10, 12));
        assert_eq!(summary.daily[1].date, day(2026, 10, 13));

        let tue = &summary.daily[1].counts;
        assert_eq!(tue.len(), 4);
        assert_eq!(tue[0].count, 1); // Positive
        assert_eq!(tue[2].count, 1); // Neutral
    }

    #[test]
    fn empty_report_serializes_without_source() {
        let json = serde_json::to_value(RunReport::empty()).unwrap();
        assert!(json.get("source").is_none());
        assert_eq!(json["summary"]["total"], 0);
        assert_eq!(json["summary"]["categories"][3]["category"], "Follow-up needed");
    }
}
