use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;
use dp1_queue::{Fact, FactKind, FactStatus};
use dp1_store::{ListQuery, Page, SortOrder};
use dp1_types::{
    Channel, ChannelInput, ChannelUpdate, Playlist, PlaylistInput, PlaylistItem, PlaylistUpdate,
    ResourceKind,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::WriteAccess;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// JSON body extractor whose rejections use the API error shape.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServerError::Validation(rejection.body_text())),
        }
    }
}

/// Query string extractor whose rejections use the API error shape.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServerError::Validation(rejection.body_text())),
        }
    }
}

/// Query string of listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub sort: Option<SortOrder>,
    /// Restrict playlists to those referenced by this channel.
    pub channel: Option<String>,
}

impl ListParams {
    fn query(&self) -> ListQuery {
        ListQuery {
            limit: self.limit,
            cursor: self.cursor.clone(),
            sort: self.sort.unwrap_or_default(),
        }
    }
}

/// Body of a fact submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactInput {
    pub kind: FactKind,
    pub status: FactStatus,
    pub playlist_id: Uuid,
}

fn parse_uuid(s: &str, what: &str) -> ServerResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| ServerError::NotFound(format!("{what} {s}")))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    _access: WriteAccess,
    ApiJson(input): ApiJson<PlaylistInput>,
) -> ServerResult<(StatusCode, Json<Playlist>)> {
    let playlist = state.writes.create_playlist(input).await?;
    Ok((StatusCode::CREATED, Json(playlist)))
}

pub async fn update_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _access: WriteAccess,
    ApiJson(update): ApiJson<PlaylistUpdate>,
) -> ServerResult<Json<Playlist>> {
    Ok(Json(state.writes.update_playlist(&id, update).await?))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Playlist>> {
    state
        .store
        .get_playlist(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("playlist {id}")))
}

pub async fn list_playlists(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ServerResult<Json<Page<Playlist>>> {
    let query = params.query();
    let page = match &params.channel {
        Some(channel) => state
            .store
            .list_playlists_by_channel(channel, &query)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("channel {channel}")))?,
        None => state.store.list_playlists(&query).await?,
    };
    Ok(Json(page))
}

pub async fn list_playlist_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ServerResult<Json<Page<PlaylistItem>>> {
    let playlist_id = state
        .store
        .resolve_id(ResourceKind::Playlist, &id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("playlist {id}")))?;
    Ok(Json(state.store.list_playlist_items(playlist_id, &params.query()).await?))
}

pub async fn get_playlist_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<PlaylistItem>> {
    let item_id = parse_uuid(&id, "playlist item")?;
    state
        .store
        .get_playlist_item(item_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("playlist item {id}")))
}

pub async fn create_channel(
    State(state): State<AppState>,
    _access: WriteAccess,
    ApiJson(input): ApiJson<ChannelInput>,
) -> ServerResult<(StatusCode, Json<Channel>)> {
    let channel = state.writes.create_channel(input).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    _access: WriteAccess,
    ApiJson(update): ApiJson<ChannelUpdate>,
) -> ServerResult<Json<Channel>> {
    Ok(Json(state.writes.update_channel(&id, update).await?))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Channel>> {
    state
        .store
        .get_channel(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("channel {id}")))
}

pub async fn list_channels(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ServerResult<Json<Page<Channel>>> {
    Ok(Json(state.store.list_channels(&params.query()).await?))
}

pub async fn list_stars(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ServerResult<Json<Page<Playlist>>> {
    Ok(Json(state.store.list_starred(&params.query()).await?))
}

/// Accept an inbound fact. The fact is queued like any other write and
/// answered with `202 Accepted`.
pub async fn submit_fact(
    State(state): State<AppState>,
    _access: WriteAccess,
    ApiJson(input): ApiJson<FactInput>,
) -> ServerResult<(StatusCode, Json<Fact>)> {
    let fact = match input.kind {
        FactKind::Star => state.writes.record_star(input.playlist_id, input.status).await?,
    };
    Ok((StatusCode::ACCEPTED, Json(fact)))
}
