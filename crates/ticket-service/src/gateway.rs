//! 实时网关
//!
//! 客户端通过 `/ws` 建立 WebSocket 连接。身份由上游网关认证后写入
//! `x-actor-id` / `x-actor-role` 请求头。连接建立后自动加入个人房间，
//! 之后可以发送以下消息：
//!
//! - `joinTicketRoom` / `leaveTicketRoom`：按工单可见性加入或退出工单房间
//! - `sendTicketComment`：发表公开评论，与服务调用走同一条路径

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TicketError;
use crate::models::{Actor, Role};
use crate::notification::{RealtimeBus, Room};
use crate::service::authorization::can_manage;
use crate::service::{CommentService, TicketService};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// 网关共享状态
#[derive(Clone)]
pub struct GatewayState {
    pub bus: Arc<RealtimeBus>,
    pub tickets: Arc<TicketService>,
    pub comments: Arc<CommentService>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// 客户端发来的消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinTicketRoom { ticket_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveTicketRoom { ticket_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SendTicketComment { ticket_id: Uuid, content: String },
}

/// 对客户端消息的应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerReply {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: Uuid, room: String },
    #[serde(rename_all = "camelCase")]
    Joined { rooms: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Left { ticket_id: Uuid },
    #[serde(rename_all = "camelCase")]
    CommentAdded { ticket_id: Uuid, comment_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Error { code: String, message: String },
}

impl ServerReply {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// 系统级错误只返回通用提示，详细信息仅记录日志
    fn from_ticket_error(e: &TicketError) -> Self {
        if e.is_client_error() {
            Self::error(e.error_code(), e.to_string())
        } else {
            warn!(error = %e, "实时网关处理消息失败");
            Self::error(e.error_code(), "服务内部错误，请稍后重试")
        }
    }
}

/// 从请求头解析上游认证后的身份
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, String> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| format!("缺少 {ACTOR_ID_HEADER} 请求头"))?
        .trim()
        .parse::<Uuid>()
        .map_err(|e| format!("{ACTOR_ID_HEADER} 格式错误: {e}"))?;
    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| format!("缺少 {ACTOR_ROLE_HEADER} 请求头"))?
        .parse::<Role>()?;

    Ok(Actor::new(id, role))
}

async fn health_check(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.bus.is_closed() { "closing" } else { "healthy" },
        "connections": state.bus.connection_count(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(message) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "code": "UNAUTHORIZED",
                    "message": message,
                })),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

async fn handle_socket(socket: WebSocket, state: GatewayState, actor: Actor) {
    let (connection_id, mut events) = match state.bus.connect() {
        Ok(conn) => conn,
        Err(e) => {
            warn!(actor_id = %actor.id, error = %e, "实时连接建立失败");
            return;
        }
    };
    let personal = Room::User(actor.id);
    state.bus.join(connection_id, personal);

    let (mut sender, mut receiver) = socket.split();
    info!(connection_id = %connection_id, actor_id = %actor.id, role = %actor.role, "WebSocket 已连接");

    let welcome = ServerReply::Connected {
        connection_id,
        room: personal.to_string(),
    };
    if send_json(&mut sender, &welcome).await.is_err() {
        state.bus.disconnect(connection_id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!(connection_id = %connection_id, "实时总线已关闭，结束连接");
                    break;
                };
                if send_json(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&state, &actor, connection_id, text.as_str()).await;
                        if send_json(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, error = %e, "WebSocket 接收失败");
                        break;
                    }
                }
            }
        }
    }

    state.bus.disconnect(connection_id);
    info!(connection_id = %connection_id, actor_id = %actor.id, "WebSocket 已断开");
}

/// 处理一条客户端消息并生成应答
pub async fn handle_client_message(
    state: &GatewayState,
    actor: &Actor,
    connection_id: Uuid,
    text: &str,
) -> ServerReply {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => return ServerReply::error("BAD_MESSAGE", format!("无法解析消息: {e}")),
    };

    match message {
        ClientMessage::JoinTicketRoom { ticket_id } => {
            let detail = match state.tickets.get_ticket_by_id(actor, ticket_id).await {
                Ok(detail) => detail,
                Err(e) => return ServerReply::from_ticket_error(&e),
            };

            let mut rooms = vec![Room::Ticket(ticket_id)];
            if can_manage(actor, &detail.ticket) {
                rooms.push(Room::TicketStaff(ticket_id));
            }
            for room in &rooms {
                state.bus.join(connection_id, *room);
            }
            ServerReply::Joined {
                rooms: rooms.iter().map(Room::to_string).collect(),
            }
        }
        ClientMessage::LeaveTicketRoom { ticket_id } => {
            state.bus.leave(connection_id, Room::Ticket(ticket_id));
            state.bus.leave(connection_id, Room::TicketStaff(ticket_id));
            ServerReply::Left { ticket_id }
        }
        ClientMessage::SendTicketComment { ticket_id, content } => {
            match state
                .comments
                .add_public_comment(actor, ticket_id, &content)
                .await
            {
                Ok(comment) => ServerReply::CommentAdded {
                    ticket_id,
                    comment_id: comment.id,
                },
                Err(e) => ServerReply::from_ticket_error(&e),
            }
        }
    }
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
    T: Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "实时消息序列化失败");
            return Ok(());
        }
    };

    sender.send(Message::Text(text.into())).await.map_err(|e| {
        debug!(error = %e, "WebSocket 发送失败");
    })
}
