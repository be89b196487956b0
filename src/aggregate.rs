use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{Application, ApplicationStatus};

/// Skill count at which the resume analysis reads as complete.
const ANALYSIS_FULL_SKILLS: usize = 40;

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Every enumerated status is present, zero when absent from `apps`.
/// `Unknown` only appears when some record carried an unrecognized status.
pub fn status_counts(apps: &[Application]) -> BTreeMap<ApplicationStatus, usize> {
    let mut counts: BTreeMap<ApplicationStatus, usize> =
        ApplicationStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for app in apps {
        *counts.entry(app.status).or_insert(0) += 1;
    }
    counts
}

/// Applications per calendar month, oldest first. Uses `applied_date`,
/// falling back to `created_at`; records with neither parseable are skipped.
pub fn monthly_counts(apps: &[Application]) -> Vec<(MonthKey, usize)> {
    let mut buckets: BTreeMap<MonthKey, usize> = BTreeMap::new();
    for app in apps {
        let Some(ts) = application_timestamp(app) else {
            continue;
        };
        let key = MonthKey {
            year: ts.year(),
            month: ts.month(),
        };
        *buckets.entry(key).or_insert(0) += 1;
    }
    buckets.into_iter().collect()
}

fn application_timestamp(app: &Application) -> Option<NaiveDateTime> {
    app.applied_date
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| app.created_at.as_deref().and_then(parse_timestamp))
}

/// Accepts RFC 3339, an ISO datetime without offset, or a bare date. Offset
/// timestamps keep their own wall-clock date.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Resume analysis progress: skill count over a fixed denominator, capped at 100.
pub fn analysis_percentage(skill_count: usize) -> u32 {
    let pct = (skill_count as f64 / ANALYSIS_FULL_SKILLS as f64 * 100.0).round();
    pct.min(100.0) as u32
}

/// A 0..1 coverage ratio as a whole percentage.
pub fn coverage_percentage(ratio: f64) -> u32 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0).round().clamp(0.0, 100.0) as u32
}

#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub total: usize,
    pub active: usize,
    pub interviews: usize,
    pub offers: usize,
    pub recent: Vec<Application>,
}

impl DashboardStats {
    pub fn from_applications(apps: &[Application]) -> Self {
        let counts = status_counts(apps);
        let count = |statuses: &[ApplicationStatus]| -> usize {
            statuses.iter().map(|s| counts.get(s).copied().unwrap_or(0)).sum()
        };

        let mut recent: Vec<(Option<NaiveDateTime>, &Application)> = apps
            .iter()
            .map(|app| {
                let ts = app
                    .updated_at
                    .as_deref()
                    .and_then(parse_timestamp)
                    .or_else(|| application_timestamp(app));
                (ts, app)
            })
            .collect();
        // Newest first; undated records go last in their original order.
        recent.sort_by(|a, b| b.0.cmp(&a.0));

        Self {
            total: apps.len(),
            active: count(&[
                ApplicationStatus::Applied,
                ApplicationStatus::PhoneScreen,
                ApplicationStatus::Interviewing,
            ]),
            interviews: count(&[ApplicationStatus::PhoneScreen, ApplicationStatus::Interviewing]),
            offers: count(&[ApplicationStatus::Offer, ApplicationStatus::Accepted]),
            recent: recent
                .into_iter()
                .take(RECENT_LIMIT)
                .map(|(_, app)| app.clone())
                .collect(),
        }
    }
}
