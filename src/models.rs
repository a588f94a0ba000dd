use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Usage snapshot for one mounted drive. Only drives that were actually
/// ready (total space > 0) are carried in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUsage {
    pub drive_letter: String,
    pub total_space_gb: f64,
    pub free_space_gb: f64,
    pub used_percent: f64,
}

impl DriveUsage {
    pub fn new(drive_letter: String, total_space_gb: f64, free_space_gb: f64) -> Self {
        Self {
            drive_letter,
            total_space_gb,
            free_space_gb,
            used_percent: used_percent(total_space_gb, free_space_gb),
        }
    }
}

/// Percentage of the drive in use; zero when the total is unknown.
pub fn used_percent(total_gb: f64, free_gb: f64) -> f64 {
    if total_gb > 0.0 {
        100.0 * (total_gb - free_gb) / total_gb
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Info" => Some(Self::Info),
            "Warning" => Some(Self::Warning),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEntry {
    pub drive_letter: String,
    pub level: AlertLevel,
    pub message: String,
}

/// One point-in-time submission from an agent. The pair
/// (agent_id, timestamp_utc) identifies the report on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub drives: Vec<DriveUsage>,
    pub alerts: Vec<AlertEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAck {
    pub success: bool,
    pub message: String,
}

/// Dashboard view of a known agent. Internal numeric keys stay internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    pub created_utc: DateTime<Utc>,
    pub last_seen_utc: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::agents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AgentRow {
    pub id: i32,
    pub agent_id: String,
    pub created_utc: String,
    pub last_seen_utc: String,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::drive_usages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DriveUsageRow {
    pub id: i32,
    pub agent_key: i32,
    pub timestamp_utc: String,
    pub drive_letter: String,
    pub total_space_gb: f64,
    pub free_space_gb: f64,
    pub used_percent: f64,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::drive_usages)]
pub struct NewDriveUsageRow {
    pub agent_key: i32,
    pub timestamp_utc: String,
    pub drive_letter: String,
    pub total_space_gb: f64,
    pub free_space_gb: f64,
    pub used_percent: f64,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::alert_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertEntryRow {
    pub id: i32,
    pub agent_key: i32,
    pub timestamp_utc: String,
    pub drive_letter: String,
    pub level: String,
    pub message: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::alert_entries)]
pub struct NewAlertEntryRow {
    pub agent_key: i32,
    pub timestamp_utc: String,
    pub drive_letter: String,
    pub level: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_percent_of_ready_drive() {
        assert_eq!(used_percent(500.0, 100.0), 80.0);
    }

    #[test]
    fn used_percent_of_unready_drive_is_zero() {
        assert_eq!(used_percent(0.0, 0.0), 0.0);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = AgentReport {
            agent_id: "agent-1".into(),
            timestamp_utc: "2024-01-01T00:00:00Z".parse().unwrap(),
            drives: vec![DriveUsage::new("C:".into(), 500.0, 100.0)],
            alerts: vec![AlertEntry {
                drive_letter: "C:".into(),
                level: AlertLevel::Warning,
                message: "almost full".into(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["agentId"], "agent-1");
        assert_eq!(json["drives"][0]["driveLetter"], "C:");
        assert_eq!(json["drives"][0]["usedPercent"], 80.0);
        assert_eq!(json["alerts"][0]["level"], "Warning");
    }

    #[test]
    fn alert_level_round_trips_through_text() {
        for level in [AlertLevel::Info, AlertLevel::Warning, AlertLevel::Error] {
            assert_eq!(AlertLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(AlertLevel::parse("Fatal"), None);
    }
}
