//! WebSocket 传输层
//!
//! 握手阶段完成 JWT 校验，之后把 JSON 帧在 socket 与实时会话协议之间搬运。
//! 每个连接分配一个独立的会话标识，互不共享。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{ClientEvent, NewSession, ServerEvent};
use domain::{Identity, SessionId};

use crate::{auth, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// 升级前校验令牌；浏览器 WebSocket API 无法设置请求头，因此也接受 `?token=`。
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = auth::bearer_token(&headers)
        .map(ToOwned::to_owned)
        .or(query.token)
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let identity = state.jwt_service.verify_identity(&token)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let session_id = SessionId::new(Uuid::new_v4());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (mut outgoing, mut incoming) = socket.split();

    tracing::info!(
        session_id = %session_id,
        user_id = %identity.id,
        username = %identity.username,
        "WebSocket连接已建立"
    );

    if let Err(err) = state
        .realtime
        .connect(NewSession {
            session_id,
            identity,
            sender: event_tx,
        })
        .await
    {
        tracing::error!(session_id = %session_id, error = %err, "会话注册失败，关闭连接");
        let _ = outgoing.close().await;
        return;
    }

    // 发送任务：协议事件序列化后写入 socket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "事件序列化失败，跳过");
                    continue;
                }
            };
            if outgoing.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // 接收任务：解析客户端帧并交给协议处理，坏帧只回错误不断连
    let realtime = state.realtime.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => realtime.handle_event(session_id, event).await,
                    Err(err) => realtime.report_malformed(session_id, err.to_string()).await,
                },
                WsMessage::Close(_) => break,
                WsMessage::Binary(_) => {
                    tracing::debug!(session_id = %session_id, "忽略二进制帧");
                }
                // Ping 由 axum 自动应答
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.realtime.disconnect(session_id).await;
    tracing::info!(session_id = %session_id, "WebSocket连接已断开");
}
