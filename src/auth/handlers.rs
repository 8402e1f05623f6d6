use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, RegistrationRequest, RegistrationResponse},
        error::AuthError,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/registration", post(registration))
}

fn peer_label(peer: &Option<ConnectInfo<SocketAddr>>) -> String {
    peer.as_ref()
        .map_or_else(|| "unknown".to_owned(), |ConnectInfo(addr)| addr.to_string())
}

#[instrument(skip_all, fields(username = %payload.username, peer = %peer_label(&peer)))]
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<LoginRequest>,
) -> Json<LoginResponse> {
    let ctx = state.call_ctx();
    Json(state.auth.login(&ctx, payload).await)
}

#[instrument(skip_all, fields(username = %payload.username, peer = %peer_label(&peer)))]
pub async fn registration(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<Json<RegistrationResponse>, AuthError> {
    let ctx = state.call_ctx();
    state.auth.registration(&ctx, payload).await.map(Json)
}
