use chrono::{DateTime, Duration, Utc};
use disksentry::models::{AgentReport, AlertEntry, AlertLevel, DriveUsage};
use disksentry::store::ReportStore;
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> ReportStore {
    let db_path = dir.path().join("sentry.sqlite");
    let store = ReportStore::connect(db_path.to_str().unwrap()).unwrap();
    store.init_schema().await.unwrap();
    store
}

fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

fn sample_report(agent_id: &str, timestamp: DateTime<Utc>) -> AgentReport {
    AgentReport {
        agent_id: agent_id.into(),
        timestamp_utc: timestamp,
        drives: vec![
            DriveUsage::new("C:".into(), 500.0, 100.0),
            DriveUsage::new("D:".into(), 1000.0, 900.0),
        ],
        alerts: vec![AlertEntry {
            drive_letter: "C:".into(),
            level: AlertLevel::Warning,
            message: "Drive C: is 80.0% full (100.0 GB free)".into(),
        }],
    }
}

#[tokio::test]
async fn round_trip_preserves_the_full_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let report = sample_report("agent-1", ts("2024-01-01T00:00:00Z"));
    store.save_report(report.clone()).await.unwrap();

    let fetched = store.recent_reports(1).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].agent_id, report.agent_id);
    assert_eq!(fetched[0].timestamp_utc, report.timestamp_utc);
    assert_eq!(fetched[0].drives.len(), 2);
    assert_eq!(fetched[0].alerts, report.alerts);

    let c_drive = fetched[0]
        .drives
        .iter()
        .find(|d| d.drive_letter == "C:")
        .unwrap();
    assert_eq!(c_drive.used_percent, 80.0);
    assert_eq!(c_drive.total_space_gb, 500.0);
    assert_eq!(c_drive.free_space_gb, 100.0);
}

#[tokio::test]
async fn recent_reports_come_back_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let base = ts("2024-06-01T12:00:00Z");
    for minutes_ago in [20i64, 10, 0] {
        let report = sample_report("agent-1", base - Duration::minutes(minutes_ago));
        store.save_report(report).await.unwrap();
    }

    let fetched = store.recent_reports(3).await.unwrap();
    let stamps: Vec<_> = fetched.iter().map(|r| r.timestamp_utc).collect();
    assert_eq!(
        stamps,
        vec![
            base,
            base - Duration::minutes(10),
            base - Duration::minutes(20)
        ]
    );
}

#[tokio::test]
async fn count_limits_how_many_reports_are_returned() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let base = ts("2024-06-01T12:00:00Z");
    for i in 0..5i64 {
        store
            .save_report(sample_report("agent-1", base + Duration::minutes(i)))
            .await
            .unwrap();
    }

    let fetched = store.recent_reports(2).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].timestamp_utc, base + Duration::minutes(4));
}

#[tokio::test]
async fn resubmission_overwrites_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let stamp = ts("2024-01-01T00:00:00Z");
    store
        .save_report(sample_report("agent-1", stamp))
        .await
        .unwrap();
    store
        .save_report(sample_report("agent-1", stamp))
        .await
        .unwrap();

    let fetched = store.recent_reports(10).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].drives.len(), 2);
    assert_eq!(fetched[0].alerts.len(), 1);
}

#[tokio::test]
async fn alert_only_report_is_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let report = AgentReport {
        agent_id: "agent-1".into(),
        timestamp_utc: ts("2024-01-01T00:00:00Z"),
        drives: vec![],
        alerts: vec![AlertEntry {
            drive_letter: "D:".into(),
            level: AlertLevel::Error,
            message: "Drive D: is unavailable or not ready".into(),
        }],
    };
    store.save_report(report.clone()).await.unwrap();

    let fetched = store.recent_reports(1).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert!(fetched[0].drives.is_empty());
    assert_eq!(fetched[0].alerts, report.alerts);
}

#[tokio::test]
async fn reports_from_two_agents_stay_separate() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .save_report(sample_report("agent-1", ts("2024-01-01T00:00:00Z")))
        .await
        .unwrap();
    store
        .save_report(sample_report("agent-2", ts("2024-01-01T00:05:00Z")))
        .await
        .unwrap();

    let fetched = store.recent_reports(10).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].agent_id, "agent-2");
    assert_eq!(fetched[1].agent_id, "agent-1");

    let agents = store.list_agents().await.unwrap();
    let ids: Vec<_> = agents.iter().map(|a| a.agent_id.as_str()).collect();
    assert_eq!(ids, vec!["agent-1", "agent-2"]);
}

#[tokio::test]
async fn repeated_reports_keep_one_agent_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .save_report(sample_report("agent-1", ts("2024-01-01T00:00:00Z")))
        .await
        .unwrap();
    store
        .save_report(sample_report("agent-1", ts("2024-01-01T00:05:00Z")))
        .await
        .unwrap();

    let agents = store.list_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert!(agents[0].last_seen_utc >= agents[0].created_utc);
}

#[tokio::test]
async fn purge_drops_only_rows_before_the_cutoff() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let old = ts("2024-01-01T00:00:00Z");
    let new = ts("2024-03-01T00:00:00Z");
    store.save_report(sample_report("agent-1", old)).await.unwrap();
    store.save_report(sample_report("agent-1", new)).await.unwrap();

    let removed = store
        .purge_before(ts("2024-02-01T00:00:00Z"))
        .await
        .unwrap();
    // Two drive rows and one alert row from the old report.
    assert_eq!(removed, 3);

    let fetched = store.recent_reports(10).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].timestamp_utc, new);
}

#[tokio::test]
async fn concurrent_saves_for_different_agents_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        let stamp = ts("2024-01-01T00:00:00Z") + Duration::minutes(i);
        handles.push(tokio::spawn(async move {
            store
                .save_report(sample_report(&format!("agent-{i}"), stamp))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let fetched = store.recent_reports(10).await.unwrap();
    assert_eq!(fetched.len(), 4);
}
