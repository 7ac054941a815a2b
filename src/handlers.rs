use crate::errors::AppError;
use crate::models::{
    BoxDraft, BoxOpen, BoxView, BrandFilter, SmokeDraft, SmokeEvent, SmokeStatsResponse,
    SmokeView,
};
use crate::state::AppState;
use crate::stats::{build_box_view, build_smoke_stats, build_smoke_view};
use crate::ui::{render_boxes, render_home, render_log};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    Form, Json,
};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct BoxForm {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub boxes: Option<String>,
}

impl From<BoxForm> for BoxDraft {
    fn from(form: BoxForm) -> Self {
        BoxDraft {
            brand: form.brand,
            boxes: form.boxes.and_then(|value| value.trim().parse::<f64>().ok()),
        }
    }
}

async fn smoke_view(state: &AppState) -> SmokeView {
    let now = state.clock.now();
    let log = state.smokes.lock().await;
    build_smoke_view(log.snapshot(), &now, log.is_degraded())
}

async fn box_view(state: &AppState, filter: &BrandFilter) -> BoxView {
    let now = state.clock.now();
    let log = state.boxes.lock().await;
    build_box_view(log.snapshot(), filter.brand.as_deref(), &now, log.is_degraded())
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_home(&smoke_view(&state).await))
}

pub async fn log_page(State(state): State<AppState>) -> Html<String> {
    let offset = *state.clock.now().offset();
    Html(render_log(&smoke_view(&state).await, &offset))
}

pub async fn boxes_page(
    State(state): State<AppState>,
    Query(filter): Query<BrandFilter>,
) -> Html<String> {
    Html(render_boxes(&box_view(&state, &filter).await))
}

pub async fn log_smoke(State(state): State<AppState>) -> Redirect {
    append_smoke(&state).await;
    Redirect::to("/")
}

pub async fn delete_smoke(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    remove_smoke(&state, &id).await;
    Redirect::to("/log")
}

pub async fn delete_all_smokes(State(state): State<AppState>) -> Redirect {
    clear_smokes(&state).await;
    Redirect::to("/log")
}

/// Blank brands are ignored; the page simply reloads.
pub async fn log_box(State(state): State<AppState>, Form(form): Form<BoxForm>) -> Redirect {
    append_box(&state, form.into()).await;
    Redirect::to("/boxes")
}

pub async fn delete_box(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    remove_box(&state, &id).await;
    Redirect::to("/boxes")
}

pub async fn delete_all_boxes(State(state): State<AppState>) -> Redirect {
    clear_boxes(&state).await;
    Redirect::to("/boxes")
}

pub async fn get_smokes(State(state): State<AppState>) -> Json<SmokeView> {
    Json(smoke_view(&state).await)
}

pub async fn get_smoke_stats(State(state): State<AppState>) -> Json<SmokeStatsResponse> {
    let now = state.clock.now();
    let log = state.smokes.lock().await;
    Json(build_smoke_stats(log.snapshot(), &now))
}

pub async fn create_smoke(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SmokeEvent>), AppError> {
    let event = append_smoke(&state)
        .await
        .ok_or_else(|| AppError::bad_request("smoke could not be logged"))?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn remove_smoke_api(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    remove_smoke(&state, &id).await;
    StatusCode::NO_CONTENT
}

pub async fn clear_smokes_api(State(state): State<AppState>) -> StatusCode {
    clear_smokes(&state).await;
    StatusCode::NO_CONTENT
}

pub async fn get_boxes(
    State(state): State<AppState>,
    Query(filter): Query<BrandFilter>,
) -> Json<BoxView> {
    Json(box_view(&state, &filter).await)
}

pub async fn create_box(
    State(state): State<AppState>,
    Json(draft): Json<BoxDraft>,
) -> Result<(StatusCode, Json<BoxOpen>), AppError> {
    match append_box(&state, draft).await {
        Some(entry) => Ok((StatusCode::CREATED, Json(entry))),
        None => Err(AppError::bad_request("brand must not be empty")),
    }
}

pub async fn remove_box_api(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    remove_box(&state, &id).await;
    StatusCode::NO_CONTENT
}

pub async fn clear_boxes_api(State(state): State<AppState>) -> StatusCode {
    clear_boxes(&state).await;
    StatusCode::NO_CONTENT
}

async fn append_smoke(state: &AppState) -> Option<SmokeEvent> {
    let event = state.smokes.lock().await.append(SmokeDraft);
    if let Some(event) = &event {
        info!(id = %event.id, "logged smoke");
    }
    event
}

async fn remove_smoke(state: &AppState, id: &str) {
    let removed = state.smokes.lock().await.remove(id);
    debug!(id, removed, "delete smoke");
}

async fn clear_smokes(state: &AppState) {
    state.smokes.lock().await.clear();
    info!("cleared smoke log");
}

async fn append_box(state: &AppState, draft: BoxDraft) -> Option<BoxOpen> {
    let entry = state.boxes.lock().await.append(draft);
    match &entry {
        Some(entry) => info!(id = %entry.id, brand = %entry.brand, boxes = entry.boxes, "logged box"),
        None => debug!("ignored box with blank brand"),
    }
    entry
}

async fn remove_box(state: &AppState, id: &str) {
    let removed = state.boxes.lock().await.remove(id);
    debug!(id, removed, "delete box");
}

async fn clear_boxes(state: &AppState) {
    state.boxes.lock().await.clear();
    info!("cleared box log");
}
