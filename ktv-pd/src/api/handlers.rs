//! HTTP request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, NaiveDate};
use ktv_common::time::{format_clock, parse_weekday, seconds_since_midnight, weekday_index};
use ktv_common::Error;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::api::server::AppContext;
use crate::resolver::PlayheadState;
use crate::schedule::DaySchedule;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct NowResponse {
    date: NaiveDate,
    /// Wall-clock time the playhead was resolved at, HH:MM:SS
    time: String,
    playhead: PlayheadState,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateRequest {
    /// Weekday index (0 = Sunday) or name; absent regenerates the week
    #[serde(default)]
    weekday: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DaySummary {
    weekday: u32,
    date: NaiveDate,
    program_count: usize,
    exhausted_at: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    days: Vec<DaySummary>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(e: Error) -> ApiError {
    let code = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn summary(day: &DaySchedule) -> DaySummary {
    DaySummary {
        weekday: day.weekday,
        date: day.date,
        program_count: day.programs.len(),
        exhausted_at: day.report.exhausted_at,
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "ktv-pd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/schedule/:weekday - One day's grid
///
/// `weekday` is an index (0 = Sunday) or an English day name.
pub async fn get_schedule(
    State(ctx): State<AppContext>,
    Path(weekday): Path<String>,
) -> Result<Json<DaySchedule>, ApiError> {
    let weekday = parse_weekday(&weekday).map_err(api_error)?;
    let index = weekday_index(weekday);

    ctx.service
        .schedule_for(index)
        .await
        .map(Json)
        .ok_or_else(|| api_error(Error::NotFound(format!("No schedule for weekday {}", index))))
}

/// GET /api/now - What is on air
pub async fn get_now(State(ctx): State<AppContext>) -> Result<Json<NowResponse>, ApiError> {
    let now = ctx.service.clock().now();
    let (_, playhead) = ctx.service.playhead_at(now).await.map_err(api_error)?;

    Ok(Json(NowResponse {
        date: now.date(),
        time: format_clock(seconds_since_midnight(now.time())),
        playhead,
    }))
}

/// POST /api/schedule/regenerate - Rebuild one day or the whole week
pub async fn regenerate(
    State(ctx): State<AppContext>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    match request.weekday {
        Some(text) => {
            let weekday = parse_weekday(&text).map_err(api_error)?;
            let day = ctx.service.regenerate_day(weekday).await.map_err(api_error)?;
            info!("Regenerated {} ({} programs)", day.date, day.programs.len());
            Ok(Json(RegenerateResponse {
                days: vec![summary(&day)],
            }))
        }
        None => {
            let today = ctx.service.clock().today();
            ctx.service.generate_week(today).await.map_err(api_error)?;

            let mut days = Vec::with_capacity(7);
            for offset in 0..7 {
                let date = today + chrono::Duration::days(offset);
                if let Some(day) = ctx.service.schedule_for(weekday_index(date.weekday())).await {
                    days.push(summary(&day));
                }
            }
            Ok(Json(RegenerateResponse { days }))
        }
    }
}
