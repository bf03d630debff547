use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all feed endpoints under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/playlists",
            get(handler::list_playlists).post(handler::create_playlist),
        )
        .route(
            "/playlists/:id",
            get(handler::get_playlist).put(handler::update_playlist),
        )
        .route("/playlists/:id/items", get(handler::list_playlist_items))
        .route("/playlist-items/:id", get(handler::get_playlist_item))
        .route(
            "/channels",
            get(handler::list_channels).post(handler::create_channel),
        )
        .route(
            "/channels/:id",
            get(handler::get_channel).put(handler::update_channel),
        )
        .route("/stars", get(handler::list_stars))
        .route("/facts", post(handler::submit_fact));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
