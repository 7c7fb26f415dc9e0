//! Plain-text status rendering

use chrono::{DateTime, Local};
use ephemera_config::{EnvironmentRecord, EnvironmentStatus};
use ephemera_util::{format_clock_time, format_datetime_full, format_duration, saturating_since};
use std::fmt::Write;
use std::time::Duration;

const BAR_WIDTH: usize = 20;

/// `[#####-----]` filled in proportion to the TTL already used
pub fn progress_bar(used: Duration, total: Duration, width: usize) -> String {
    let filled = if total.is_zero() {
        width
    } else {
        let ratio = (used.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
        (ratio * width as f64).round() as usize
    };
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// One-line summary, as shown by `status` and the watch loops
pub fn status_line(record: &EnvironmentRecord, now: DateTime<Local>) -> String {
    match record.status {
        EnvironmentStatus::Unset => "No active cluster".into(),
        EnvironmentStatus::Destroyed => format!("{} destroyed", record.name),
        EnvironmentStatus::Active => {
            if let Some(overdue) = record.check_expiration(now) {
                return format!("{} EXPIRED {} overdue", record.name, format_duration(overdue));
            }
            let remaining = record.time_remaining(now);
            let used = match record.created_at {
                Some(created_at) => saturating_since(&now, &created_at),
                None => Duration::ZERO,
            };
            format!(
                "{} {} {}",
                record.name,
                progress_bar(used, used + remaining, BAR_WIDTH),
                format_duration(remaining)
            )
        }
    }
}

fn timestamp(value: &Option<DateTime<Local>>) -> String {
    value
        .as_ref()
        .map(format_datetime_full)
        .unwrap_or_else(|| "-".into())
}

/// Multi-line details for `status --verbose`.
///
/// `backstop` is whether the OS job still exists, `None` if unknown.
pub fn details(
    record: &EnvironmentRecord,
    next_retry_at: Option<DateTime<Local>>,
    backstop: Option<bool>,
    now: DateTime<Local>,
) -> String {
    let mut out = String::new();
    let project = record
        .project_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());

    let _ = writeln!(out, "{}", status_line(record, now));
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<15} {}", "STATUS:", record.status);
    let _ = writeln!(out, "{:<15} {}", "NAME:", record.name);
    let _ = writeln!(out, "{:<15} {}", "PROVIDER:", record.provider);
    let _ = writeln!(out, "{:<15} {}", "TTL:", record.ttl);
    let _ = writeln!(out, "{:<15} {}", "PROJECT PATH:", project);
    let _ = writeln!(out, "{:<15} {}", "CREATED AT:", timestamp(&record.created_at));
    let _ = writeln!(out, "{:<15} {}", "EXPIRES AT:", timestamp(&record.expires_at));
    let _ = writeln!(
        out,
        "{:<15} {}",
        "FORCE:",
        if record.force { "auto-destroy" } else { "ask" }
    );
    let _ = writeln!(out, "{:<15} {}", "CLEANUP:", record.cleanup_status());

    if let Some(at) = next_retry_at {
        let _ = writeln!(out, "{:<15} {}", "NEXT RETRY:", format_clock_time(&at));
    }

    let job = match (&record.scheduled_job_id, backstop) {
        (None, _) => "none".to_string(),
        (Some(id), Some(true)) => format!("{} (scheduled)", id),
        (Some(id), Some(false)) => format!("{} (missing)", id),
        (Some(id), None) => format!("{} (unknown)", id),
    };
    let _ = write!(out, "{:<15} {}", "BACKSTOP JOB:", job);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ephemera_util::JobId;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    fn active() -> EnvironmentRecord {
        let mut record = EnvironmentRecord {
            ttl: "10m".into(),
            ..Default::default()
        };
        record.set_active(at(12, 0, 0)).unwrap();
        record
    }

    #[test]
    fn test_progress_bar() {
        let ten = Duration::from_secs(600);
        assert_eq!(progress_bar(Duration::ZERO, ten, 10), "[----------]");
        assert_eq!(progress_bar(Duration::from_secs(300), ten, 10), "[#####-----]");
        assert_eq!(progress_bar(ten * 2, ten, 10), "[##########]");
        assert_eq!(progress_bar(Duration::ZERO, Duration::ZERO, 4), "[####]");
    }

    #[test]
    fn test_status_line() {
        let record = active();
        assert_eq!(
            status_line(&record, at(12, 5, 0)),
            format!("dev-cluster [{}{}] 5m0s", "#".repeat(10), "-".repeat(10))
        );
        assert_eq!(
            status_line(&record, at(12, 12, 30)),
            "dev-cluster EXPIRED 2m30s overdue"
        );

        let mut destroyed = record.clone();
        destroyed.set_destroyed();
        assert_eq!(status_line(&destroyed, at(12, 0, 0)), "dev-cluster destroyed");
        assert_eq!(
            status_line(&EnvironmentRecord::default(), at(12, 0, 0)),
            "No active cluster"
        );
    }

    #[test]
    fn test_details() {
        let mut record = active();
        record.set_scheduled_job(JobId::new("17"));
        record.mark_cleanup_failed(at(12, 11, 0), "task failed");

        let text = details(&record, Some(at(12, 16, 0)), Some(true), at(12, 12, 0));

        assert!(text.contains("TTL:            10m"));
        assert!(text.contains("CLEANUP:        1 attempt(s), last: 2026-03-01 12:11:00, error: task failed"));
        assert!(text.contains("NEXT RETRY:     12:16"));
        assert!(text.contains("BACKSTOP JOB:   17 (scheduled)"));
    }
}
