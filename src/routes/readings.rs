//! Collected series: raw readings, chart points, and CSV export.

use axum::{
    extract::Query, extract::State, http::header, http::StatusCode, response::IntoResponse,
    response::Response, routing::get, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use super::error_response;
use crate::export;
use crate::models::TelemetrySample;
use crate::session::SessionHandle;
use crate::Config;

// ---

pub fn router() -> Router<(SessionHandle, Config)> {
    // ---
    Router::new()
        .route("/readings", get(readings))
        .route("/readings/chart", get(chart))
        .route("/readings/export", get(export_csv).post(export_file))
}

/// Query parameters for filtering readings
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    /// Only readings with device time (ms) at or after this value
    since: Option<i64>,
    limit: Option<usize>,
}

/// Handle `GET /readings`.
async fn readings(
    Query(params): Query<ReadingsQuery>,
    State((session, _)): State<(SessionHandle, Config)>,
) -> Json<Vec<TelemetrySample>> {
    // ---
    let filtered = session.with_state(|s| apply_filters(&s.samples, &params));
    debug!("GET /readings - returning {} readings", filtered.len());
    Json(filtered)
}

/// One line chart per measurement, x in whole seconds of device time.
#[derive(Debug, Default, Serialize, PartialEq)]
struct ChartSeries {
    humidity: Vec<(i64, f32)>,
    temperature: Vec<(i64, f32)>,
}

/// Handle `GET /readings/chart`.
async fn chart(State((session, _)): State<(SessionHandle, Config)>) -> Json<ChartSeries> {
    // ---
    Json(session.with_state(|s| chart_series(&s.samples)))
}

/// Handle `GET /readings/export`: the CSV document itself.
async fn export_csv(State((session, _)): State<(SessionHandle, Config)>) -> Response {
    // ---
    let csv = session.with_state(|s| export::to_csv(&s.samples));
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"data.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

/// Handle `POST /readings/export`: persist `data.csv` in the export directory.
async fn export_file(State((session, config)): State<(SessionHandle, Config)>) -> Response {
    // ---
    let samples = session.with_state(|s| s.samples.clone());
    info!("POST /readings/export - {} samples", samples.len());

    match export::write_csv(&config.export_dir, &samples).await {
        Ok(path) => (
            StatusCode::OK,
            Json(json!({ "path": path.display().to_string(), "rows": samples.len() })),
        )
            .into_response(),
        Err(e) => {
            error!("Export failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to export data")
        }
    }
}

/// Apply query filters to the series, keeping arrival order
fn apply_filters(samples: &[TelemetrySample], params: &ReadingsQuery) -> Vec<TelemetrySample> {
    // ---
    samples
        .iter()
        .filter(|s| params.since.map_or(true, |since| s.time >= since))
        .take(params.limit.unwrap_or(usize::MAX))
        .copied()
        .collect()
}

fn chart_series(samples: &[TelemetrySample]) -> ChartSeries {
    // ---
    ChartSeries {
        humidity: samples.iter().map(|s| (s.time_secs(), s.humidity)).collect(),
        temperature: samples
            .iter()
            .map(|s| (s.time_secs(), s.temperature))
            .collect(),
    }
}
