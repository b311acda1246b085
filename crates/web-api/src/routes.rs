//! HTTP 路由
//!
//! 认证、历史消息查询与 WebSocket 升级入口。实时事件本身走 `/ws`。

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    ApplicationError, AuthenticateUserRequest, MessageDto, RegisterUserRequest, UserDto,
};
use domain::{Identity, RoomName, UserId};

use crate::{auth, error::ApiError, state::AppState, websocket};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify", get(verify))
        .route("/messages", get(room_history))
        .route("/messages/private/{user_a}/{user_b}", get(private_history))
        .route("/ws", get(websocket::websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;
    let token = state.jwt_service.generate_token(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserDto::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;
    let token = state.jwt_service.generate_token(&user)?;

    Ok(Json(AuthResponse {
        token,
        user: UserDto::from(&user),
    }))
}

/// 令牌有效返回用户信息；无效或用户已不存在时返回 401 + `{"valid": false}`。
async fn verify(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = auth::bearer_token(&headers) else {
        return invalid_verify();
    };
    let Ok(claims) = state.jwt_service.verify_token(token) else {
        return invalid_verify();
    };

    match state.user_service.get_user(UserId::new(claims.user_id)).await {
        Ok(Some(user)) => Json(VerifyResponse {
            valid: true,
            user: Some(UserDto::from(&user)),
        })
        .into_response(),
        Ok(None) => invalid_verify(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn invalid_verify() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(VerifyResponse {
            valid: false,
            user: None,
        }),
    )
        .into_response()
}

async fn room_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    require_identity(&state, &headers)?;

    let limit = query
        .limit
        .unwrap_or(state.history_limit)
        .min(state.history_limit);
    let messages = state
        .message_repository
        .list_room(&RoomName::global(), limit)
        .await
        .map_err(ApplicationError::from)?;

    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn private_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let identity = require_identity(&state, &headers)?;

    let a = UserId::new(user_a);
    let b = UserId::new(user_b);
    if identity.id != a && identity.id != b {
        return Err(ApiError::forbidden("not a participant of this conversation"));
    }

    let messages = state
        .message_repository
        .list_between(a, b)
        .await
        .map_err(ApplicationError::from)?;

    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

fn require_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token =
        auth::bearer_token(headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    state.jwt_service.verify_identity(token)
}
