use askama::Template;
use axum::{
    Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Json, Redirect},
    routing::{get, post},
};
use http::StatusCode;
use plotly::common::{Line, Mode, Title};
use plotly::layout::Axis;
use plotly::{Bar, Layout, Plot, Scatter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::CacheEntry;
use crate::config::Config;
use crate::forecast::{AnalyticsReport, ModelAnalytics};
use crate::forecast::analysis::scale_for_panels;
use crate::service::{PredictionService, Snapshot};
use crate::telemetry::shutdown_signal;
use crate::views::{DayRow, HourRow, LongTermView, MAX_DAYS, ShortTermView};

const NO_DATA_YET: &str = "No predictions available yet";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub default_panels: u32,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

#[derive(Debug, Default, Deserialize)]
struct ViewQuery {
    /// Number of installed panels (default from config)
    panels: Option<u32>,
    /// Days listed in the long-term table, 1-4
    days: Option<usize>,
    /// Day plotted hour by hour, 1-4
    day: Option<usize>,
}

impl ViewQuery {
    fn panels(&self, state: &AppState) -> u32 {
        self.panels.unwrap_or(state.default_panels).max(1)
    }
}

/// The views only have something to show once an entry exists; until then the
/// fetch error (if any) is more useful than a generic "no data".
fn require_entry(snapshot: &Snapshot) -> Result<&CacheEntry, String> {
    snapshot
        .entry
        .as_ref()
        .ok_or_else(|| snapshot.error.clone().unwrap_or_else(|| NO_DATA_YET.to_string()))
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

/// GET /api/v1/predictions
async fn get_predictions(State(state): State<AppState>) -> Json<ApiResponse<Snapshot>> {
    Json(ApiResponse::success(state.service.snapshot().await))
}

/// GET /api/v1/short-term?panels=N
async fn get_short_term(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<ApiResponse<ShortTermView>> {
    let snapshot = state.service.snapshot().await;
    match require_entry(&snapshot) {
        Ok(entry) => Json(ApiResponse::success(ShortTermView::build(
            entry,
            query.panels(&state),
        ))),
        Err(message) => Json(ApiResponse::error(message)),
    }
}

/// GET /api/v1/long-term?panels=N&days=D&day=K
async fn get_long_term(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<ApiResponse<LongTermView>> {
    let snapshot = state.service.snapshot().await;
    match require_entry(&snapshot) {
        Ok(entry) => Json(ApiResponse::success(LongTermView::build(
            entry,
            query.panels(&state),
            query.days.unwrap_or(MAX_DAYS),
            query.day.unwrap_or(1),
        ))),
        Err(message) => Json(ApiResponse::error(message)),
    }
}

/// GET /api/v1/analytics
async fn get_analytics(State(state): State<AppState>) -> ApiResult<AnalyticsReport> {
    state
        .service
        .analytics()
        .await
        .map(|report| Json(ApiResponse::success(report)))
        .map_err(|e| {
            error!(error = %e, "analytics request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::error(format!("Failed to fetch analytics: {e}"))),
            )
        })
}

/// POST /api/v1/refresh
async fn refresh(State(state): State<AppState>) -> ApiResult<CacheEntry> {
    state
        .service
        .refresh()
        .await
        .map(|entry| Json(ApiResponse::success(entry)))
        .map_err(|e| {
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::error(e.user_message().to_string())),
            )
        })
}

/// POST /refresh, the dashboard's refresh button
async fn refresh_page(State(state): State<AppState>) -> Redirect {
    // a failure shows up in the next snapshot's error banner
    let _ = state.service.refresh().await;
    Redirect::to("/")
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    has_data: bool,
    loading: bool,
    has_error: bool,
    error: String,
    last_update: String,
    panels: u32,
    days_shown: usize,
    selected_day: usize,
    short_total_kwh: String,
    peak_hour: String,
    long_total_kwh: String,
    peak_day: String,
    hour_rows: Vec<TableRow>,
    day_rows: Vec<TableRow>,
    footer: TableRow,
    short_plot: String,
    daily_plot: String,
    day_plot: String,
}

/// One pre-formatted table line.
struct TableRow {
    label: String,
    cells: Vec<String>,
}

fn hour_table_row(row: &HourRow) -> TableRow {
    TableRow {
        label: row.label.clone(),
        cells: vec![
            format!("{:.0} W", row.predicted_power),
            format!("{:.0} W", row.installation_power),
        ],
    }
}

fn day_table_row(row: &DayRow) -> TableRow {
    TableRow {
        label: row.label.clone(),
        cells: vec![
            format!("{:.0} W", row.avg_power),
            format!("{:.0} W", row.max_power),
            format!("{:.0} Wh", row.energy_wh),
            format!("{:.2} kWh", row.installation_energy_kwh),
        ],
    }
}

/// Plotly figure of hourly power for the whole installation
fn hourly_plot(rows: &[HourRow], title: &str, color: &'static str) -> String {
    let labels: Vec<String> = rows.iter().map(|r| r.label.clone()).collect();
    let power: Vec<f64> = rows.iter().map(|r| r.installation_power).collect();

    let trace = Scatter::new(labels, power)
        .name("Predicted Power (W)")
        .mode(Mode::LinesMarkers)
        .line(Line::new().color(color).width(2.0));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(title))
            .x_axis(Axis::new().title(Title::with_text("Time")))
            .y_axis(Axis::new().title(Title::with_text("Power (Watts)"))),
    );
    plot.to_json()
}

/// Plotly figure of estimated energy per day for the whole installation
fn daily_plot(days: &[DayRow], panels: u32) -> String {
    let labels: Vec<String> = days.iter().map(|d| d.label.clone()).collect();
    let energy: Vec<f64> = days
        .iter()
        .map(|d| scale_for_panels(d.energy_wh, panels))
        .collect();

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(labels, energy).name("Daily Energy Production (Wh)"));
    plot.set_layout(
        Layout::new()
            .title(Title::with_text("Solar Energy Forecast - Next 4 Days (Autoformer Model)"))
            .x_axis(Axis::new().title(Title::with_text("Date")))
            .y_axis(Axis::new().title(Title::with_text("Energy (Wh)"))),
    );
    plot.to_json()
}

fn render_dashboard(
    snapshot: &Snapshot,
    panels: u32,
    days: usize,
    day: usize,
) -> DashboardTemplate {
    let mut template = DashboardTemplate {
        has_data: false,
        loading: snapshot.loading,
        has_error: snapshot.error.is_some(),
        error: snapshot.error.clone().unwrap_or_default(),
        last_update: String::new(),
        panels,
        days_shown: days.clamp(1, MAX_DAYS),
        selected_day: day.clamp(1, MAX_DAYS),
        short_total_kwh: String::new(),
        peak_hour: String::new(),
        long_total_kwh: String::new(),
        peak_day: String::new(),
        hour_rows: Vec::new(),
        day_rows: Vec::new(),
        footer: TableRow {
            label: String::new(),
            cells: Vec::new(),
        },
        short_plot: "{}".to_string(),
        daily_plot: "{}".to_string(),
        day_plot: "{}".to_string(),
    };

    let Some(entry) = &snapshot.entry else {
        return template;
    };

    let short = ShortTermView::build(entry, panels);
    let long = LongTermView::build(entry, panels, days, day);
    let all_days = LongTermView::build(entry, panels, MAX_DAYS, day);

    template.has_data = true;
    template.last_update = entry.last_update.format("%Y-%m-%d %H:%M UTC").to_string();
    template.short_total_kwh = format!("{:.1} kWh", short.installation_energy_kwh);
    template.peak_hour = short
        .peak_hour
        .as_ref()
        .map(|p| format!("{} ({:.0} W)", p.label, p.installation_power))
        .unwrap_or_else(|| "N/A".to_string());
    template.long_total_kwh = format!("{:.1} kWh", long.installation_energy_kwh);
    template.peak_day = long
        .peak_day
        .as_ref()
        .map(|d| format!("{} ({:.0} W)", d.label, d.installation_peak_power))
        .unwrap_or_else(|| "N/A".to_string());
    template.hour_rows = short.hours.iter().map(hour_table_row).collect();
    template.day_rows = long.days.iter().map(day_table_row).collect();
    template.footer = TableRow {
        label: format!("{} day(s)", long.days_shown),
        cells: vec![
            format!("Avg: {:.0} W", long.shown.avg_power),
            format!("Peak: {:.0} W", long.shown.peak_power),
            format!("{:.0} Wh", long.shown.energy_wh),
            format!("{:.2} kWh", long.shown.installation_energy_kwh),
        ],
    };
    template.short_plot = hourly_plot(
        &short.hours,
        "Solar Energy Forecast - Next 24 Hours (GRU Model)",
        "rgb(75, 192, 192)",
    );
    template.daily_plot = daily_plot(&all_days.days, panels);
    template.day_plot = hourly_plot(
        &long.selected_day_hours,
        &format!("Hourly Forecast - Day {}", long.selected_day),
        "rgb(25, 135, 84)",
    );

    template
}

/// GET /?panels=N&days=D&day=K
async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let snapshot = state.service.snapshot().await;
    let template = render_dashboard(
        &snapshot,
        query.panels(&state),
        query.days.unwrap_or(MAX_DAYS),
        query.day.unwrap_or(1),
    );

    let html = template.render().map_err(|e| {
        error!(error = %e, "template rendering failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Html(html))
}

#[derive(Template)]
#[template(path = "analytics.html")]
struct AnalyticsTemplate {
    has_error: bool,
    error: String,
    rows: Vec<TableRow>,
}

fn model_row(name: &str, metrics: &ModelAnalytics) -> TableRow {
    TableRow {
        label: name.to_string(),
        cells: vec![
            format!("{:.2} %", metrics.success_rate_pct),
            format!("{:.2} W", metrics.conditional_mae),
        ],
    }
}

fn render_analytics(report: Result<AnalyticsReport, String>) -> AnalyticsTemplate {
    match report {
        Ok(report) => AnalyticsTemplate {
            has_error: false,
            error: String::new(),
            rows: vec![
                model_row("GRU (24 hours)", &report.gru),
                model_row("Autoformer (96 hours)", &report.autoformer),
            ],
        },
        Err(message) => AnalyticsTemplate {
            has_error: true,
            error: message,
            rows: Vec::new(),
        },
    }
}

/// GET /analytics
async fn analytics_page(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let report = state.service.analytics().await.map_err(|e| {
        error!(error = %e, "analytics request failed");
        format!("Failed to fetch analytics: {e}")
    });

    let html = render_analytics(report).render().map_err(|e| {
        error!(error = %e, "template rendering failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Html(html))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/analytics", get(analytics_page))
        .route("/refresh", post(refresh_page))
        .route("/health", get(health))
        .route("/api/v1/predictions", get(get_predictions))
        .route("/api/v1/short-term", get(get_short_term))
        .route("/api/v1/long-term", get(get_long_term))
        .route("/api/v1/analytics", get(get_analytics))
        .route("/api/v1/refresh", post(refresh))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until a shutdown signal arrives, then cancel `shutdown`.
pub async fn start_server(
    cfg: &Config,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = cfg.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dashboard listening");

    let token = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = token.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    Ok(())
}
