use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;
use crate::disk::DiskStatusProvider;
use crate::models::{AgentReport, AlertEntry, AlertLevel, DriveUsage};

/// Builds one point-in-time report over the configured drives.
///
/// Drives that are not ready (zero total space) are left out of the usage
/// list but still raise an Error alert so operators hear about them. Ready
/// drives at or above the warning threshold raise a single Warning alert.
pub fn build_report(
    provider: &dyn DiskStatusProvider,
    monitor: &MonitorConfig,
    agent_id: &str,
    now: DateTime<Utc>,
) -> AgentReport {
    let mut drives = Vec::new();
    let mut alerts = Vec::new();

    for drive in &monitor.drives {
        let status = provider.status(drive);
        if !status.is_ready() {
            alerts.push(AlertEntry {
                drive_letter: drive.clone(),
                level: AlertLevel::Error,
                message: format!("Drive {drive} is unavailable or not ready"),
            });
            continue;
        }

        let usage = DriveUsage::new(
            status.drive_letter,
            status.total_space_gb,
            status.free_space_gb,
        );
        if usage.used_percent >= monitor.warn_threshold_percent {
            alerts.push(AlertEntry {
                drive_letter: drive.clone(),
                level: AlertLevel::Warning,
                message: format!(
                    "Drive {drive} is {:.1}% full ({:.1} GB free)",
                    usage.used_percent, usage.free_space_gb
                ),
            });
        }
        drives.push(usage);
    }

    AgentReport {
        agent_id: agent_id.to_string(),
        timestamp_utc: now,
        drives,
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DriveStatus;
    use std::collections::HashMap;

    struct FakeDisks(HashMap<String, DriveStatus>);

    impl FakeDisks {
        fn new(entries: &[(&str, f64, f64)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(letter, total, free)| {
                        (
                            letter.to_string(),
                            DriveStatus {
                                drive_letter: letter.to_string(),
                                total_space_gb: *total,
                                free_space_gb: *free,
                            },
                        )
                    })
                    .collect(),
            )
        }
    }

    impl DiskStatusProvider for FakeDisks {
        fn status(&self, drive_letter: &str) -> DriveStatus {
            self.0
                .get(drive_letter)
                .cloned()
                .unwrap_or_else(|| DriveStatus::not_ready(drive_letter))
        }
    }

    fn monitor(drives: &[&str], threshold: f64) -> MonitorConfig {
        MonitorConfig {
            drives: drives.iter().map(|d| d.to_string()).collect(),
            warn_threshold_percent: threshold,
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn unready_drive_is_omitted_but_raises_error_alert() {
        let disks = FakeDisks::new(&[("C:", 500.0, 100.0), ("D:", 0.0, 0.0)]);
        let report = build_report(&disks, &monitor(&["C:", "D:"], 90.0), "agent-1", now());

        assert_eq!(report.drives.len(), 1);
        assert_eq!(report.drives[0].drive_letter, "C:");
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].drive_letter, "D:");
        assert_eq!(report.alerts[0].level, AlertLevel::Error);
    }

    #[test]
    fn drive_at_or_over_threshold_raises_one_warning() {
        let disks = FakeDisks::new(&[("C:", 500.0, 100.0)]);
        // 80% used, threshold 80 -> warn
        let report = build_report(&disks, &monitor(&["C:"], 80.0), "agent-1", now());
        let warnings: Vec<_> = report
            .alerts
            .iter()
            .filter(|a| a.level == AlertLevel::Warning && a.drive_letter == "C:")
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("80.0%"));
        assert!(warnings[0].message.contains("100.0 GB"));
    }

    #[test]
    fn drive_under_threshold_raises_no_alert() {
        let disks = FakeDisks::new(&[("C:", 500.0, 100.0)]);
        let report = build_report(&disks, &monitor(&["C:"], 90.0), "agent-1", now());
        assert!(report.alerts.is_empty());
        assert_eq!(report.drives[0].used_percent, 80.0);
    }

    #[test]
    fn threshold_is_read_per_call() {
        let disks = FakeDisks::new(&[("C:", 500.0, 100.0)]);
        let mut cfg = monitor(&["C:"], 90.0);
        assert!(build_report(&disks, &cfg, "a", now()).alerts.is_empty());
        cfg.warn_threshold_percent = 50.0;
        assert_eq!(build_report(&disks, &cfg, "a", now()).alerts.len(), 1);
    }

    #[test]
    fn report_carries_agent_identity_and_timestamp() {
        let disks = FakeDisks::new(&[("C:", 500.0, 100.0)]);
        let report = build_report(&disks, &monitor(&["C:"], 90.0), "agent-7", now());
        assert_eq!(report.agent_id, "agent-7");
        assert_eq!(report.timestamp_utc, now());
    }
}
