use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/log", get(handlers::log_page))
        .route("/boxes", get(handlers::boxes_page).post(handlers::log_box))
        .route("/smokes", post(handlers::log_smoke))
        .route("/smokes/delete-all", post(handlers::delete_all_smokes))
        .route("/smokes/:id/delete", post(handlers::delete_smoke))
        .route("/boxes/delete-all", post(handlers::delete_all_boxes))
        .route("/boxes/:id/delete", post(handlers::delete_box))
        .route(
            "/api/smokes",
            get(handlers::get_smokes)
                .post(handlers::create_smoke)
                .delete(handlers::clear_smokes_api),
        )
        .route("/api/smokes/stats", get(handlers::get_smoke_stats))
        .route("/api/smokes/:id", delete(handlers::remove_smoke_api))
        .route(
            "/api/boxes",
            get(handlers::get_boxes)
                .post(handlers::create_box)
                .delete(handlers::clear_boxes_api),
        )
        .route("/api/boxes/:id", delete(handlers::remove_box_api))
        .with_state(state)
}
