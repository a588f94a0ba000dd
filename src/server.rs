use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::models::{AgentInfo, AgentReport, ReportAck};
use crate::store::ReportStore;

const DEFAULT_RECENT_COUNT: usize = 10;
const MAX_RECENT_COUNT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: ReportStore,
    pub api_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/agent/report", post(submit_report))
        .route("/api/dashboard/reports/recent", get(recent_reports))
        .route("/api/dashboard/agents", get(list_agents))
        .with_state(state)
}

pub async fn submit_report(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<AgentReport>,
) -> Result<Json<ReportAck>, (StatusCode, String)> {
    check_api_key(&app, &headers)?;
    validate_report(&report)?;

    let agent_id = report.agent_id.clone();
    app.store.save_report(report).await.map_err(internal_error)?;

    tracing::info!("Stored report from {agent_id}");
    Ok(Json(ReportAck {
        success: true,
        message: String::from("Report received."),
    }))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    count: Option<usize>,
}

pub async fn recent_reports(
    State(app): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<AgentReport>>, (StatusCode, String)> {
    let count = query
        .count
        .unwrap_or(DEFAULT_RECENT_COUNT)
        .min(MAX_RECENT_COUNT);
    let reports = app
        .store
        .recent_reports(count)
        .await
        .map_err(internal_error)?;
    Ok(Json(reports))
}

pub async fn list_agents(
    State(app): State<AppState>,
) -> Result<Json<Vec<AgentInfo>>, (StatusCode, String)> {
    let agents = app.store.list_agents().await.map_err(internal_error)?;
    Ok(Json(agents))
}

fn check_api_key(app: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let Some(expected) = &app.api_key else {
        return Ok(());
    };
    let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            String::from("Missing or invalid API key"),
        ))
    }
}

/// Rejects malformed submissions before any transaction is opened.
fn validate_report(report: &AgentReport) -> Result<(), (StatusCode, String)> {
    if report.agent_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            String::from("agentId must not be empty"),
        ));
    }
    for drive in &report.drives {
        if drive.drive_letter.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                String::from("driveLetter must not be empty"),
            ));
        }
        let in_range = drive.total_space_gb.is_finite()
            && drive.free_space_gb.is_finite()
            && drive.total_space_gb >= 0.0
            && drive.free_space_gb >= 0.0
            && drive.free_space_gb <= drive.total_space_gb;
        if !in_range {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Drive {} has invalid space values", drive.drive_letter),
            ));
        }
    }
    for alert in &report.alerts {
        if alert.drive_letter.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                String::from("Alert driveLetter must not be empty"),
            ));
        }
    }
    Ok(())
}

fn internal_error<E>(err: E) -> (StatusCode, String)
where
    E: std::error::Error,
{
    tracing::error!("Request failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
