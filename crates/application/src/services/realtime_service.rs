//! 实时会话协议
//!
//! 单个客户端连接从认证到断开的状态机：
//! Connecting -> Authenticated -> Active -> Closed。
//! 认证发生在传输层握手（web 层），本服务处理 Active 状态下的
//! 事件路由、房间扇出、输入提示和已读回执，以及连接两端的
//! 注册/注销簿记。
//!
//! 注册表是"谁在线"的唯一权威数据源，本服务不保留第二份副本。

use std::sync::Arc;

use uuid::Uuid;

use domain::{
    DomainError, Identity, Message, MessageId, MessageRepository, MessageText, RoomName,
    SessionId, UserId, UserRepository,
};

use crate::clock::Clock;
use crate::dto::MessageDto;
use crate::error::ApplicationError;
use crate::events::{ClientEvent, ServerEvent};
use crate::presence::{NewSession, PresenceRegistry};
use crate::sequencer::RoomSequencer;

pub struct RealtimeServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub registry: Arc<PresenceRegistry>,
    pub clock: Arc<dyn Clock>,
    /// 连接和加入房间时回放的历史消息条数上限。
    pub history_limit: u32,
}

pub struct RealtimeService {
    deps: RealtimeServiceDependencies,
    sequencer: RoomSequencer,
}

impl RealtimeService {
    pub fn new(deps: RealtimeServiceDependencies) -> Self {
        Self {
            deps,
            sequencer: RoomSequencer::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.deps.registry
    }

    /// Authenticated -> Active：注册会话、自动加入 global、回放历史、
    /// 广播在线列表。注册失败（重复句柄）时连接不进入 Active。
    pub async fn connect(&self, session: NewSession) -> Result<(), ApplicationError> {
        let session_id = session.session_id;
        let identity = session.identity.clone();
        let global = RoomName::global();

        // global 房间的串行化守卫覆盖 加入 + 历史回放，
        // 并发的房间消息要么出现在历史里，要么随后实时送达，不会两者皆空。
        let seq = self.sequencer.lock(&global).await;
        self.deps.registry.register(session).await?;
        self.deps.registry.join_room(session_id, global.clone()).await;
        self.send_history(session_id, &global).await;
        drop(seq);

        self.broadcast_presence().await;
        self.deps
            .registry
            .broadcast_all(
                ServerEvent::Notification {
                    message: format!("{} joined the chat", identity.username),
                },
                Some(session_id),
            )
            .await;

        tracing::info!(session_id = %session_id, user_id = %identity.id, username = %identity.username, "会话进入 Active");
        Ok(())
    }

    /// Active -> Closed：注销会话并广播在线列表；该用户已无其他
    /// 会话时追加"用户离开"通知。幂等，可与在途处理器竞争。
    pub async fn disconnect(&self, session_id: SessionId) {
        let Some(removed) = self.deps.registry.unregister(session_id).await else {
            return;
        };

        self.broadcast_presence().await;
        if !removed.user_still_online {
            self.deps
                .registry
                .broadcast_all(
                    ServerEvent::Notification {
                        message: format!("{} left the chat", removed.identity.username),
                    },
                    None,
                )
                .await;
        }

        tracing::info!(session_id = %session_id, user_id = %removed.identity.id, "会话已关闭，在线状态已清理");
    }

    /// Active 状态的事件分发。事件级失败回显给发起方，连接保持 Active。
    pub async fn handle_event(&self, session_id: SessionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::RoomJoin { room } => self.handle_room_join(session_id, room).await,
            ClientEvent::RoomLeave { room } => self.handle_room_leave(session_id, room).await,
            ClientEvent::RoomMessage { room, text } => {
                self.handle_room_message(session_id, room, text).await
            }
            ClientEvent::PrivateMessage { to_user_id, text } => {
                self.handle_private_message(session_id, to_user_id, text)
                    .await
            }
            ClientEvent::Typing { room, is_typing } => {
                self.handle_typing(session_id, room, is_typing).await
            }
            ClientEvent::MessageRead { message_id } => {
                self.handle_message_read(session_id, message_id).await
            }
        };

        if let Err(err) = result {
            tracing::warn!(session_id = %session_id, error = %err, "事件处理失败");
            self.deps
                .registry
                .send_to_session(
                    session_id,
                    ServerEvent::Error {
                        code: err.wire_code().to_owned(),
                        message: err.to_string(),
                    },
                )
                .await;
        }
    }

    /// 无法解析的事件帧：本地拒绝，不持久化、不广播、不断开连接。
    pub async fn report_malformed(&self, session_id: SessionId, detail: String) {
        self.deps
            .registry
            .send_to_session(
                session_id,
                ServerEvent::Error {
                    code: "VALIDATION_ERROR".to_owned(),
                    message: detail,
                },
            )
            .await;
    }

    async fn handle_room_join(
        &self,
        session_id: SessionId,
        room: String,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(()); // 会话已关闭，在途事件作废
        };
        let room = RoomName::parse(room)?;

        let seq = self.sequencer.lock(&room).await;
        let newly_joined = self.deps.registry.join_room(session_id, room.clone()).await;
        self.send_history(session_id, &room).await;
        if newly_joined {
            self.deps
                .registry
                .broadcast_room(
                    &room,
                    ServerEvent::Notification {
                        message: format!("{} joined {}", identity.username, room),
                    },
                    Some(session_id),
                )
                .await;
        }
        drop(seq);
        Ok(())
    }

    async fn handle_room_leave(
        &self,
        session_id: SessionId,
        room: String,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(());
        };
        let room = RoomName::parse(room)?;

        let left = self.deps.registry.leave_room(session_id, &room).await;
        if left {
            self.deps
                .registry
                .broadcast_room(
                    &room,
                    ServerEvent::Notification {
                        message: format!("{} left {}", identity.username, room),
                    },
                    None,
                )
                .await;
        }
        Ok(())
    }

    async fn handle_room_message(
        &self,
        session_id: SessionId,
        room: String,
        text: String,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(());
        };
        let room = RoomName::parse(room)?;
        let text = MessageText::parse(text)?;

        // 串行化守卫内持久化再扇出：同一房间内持久化顺序即投递顺序。
        // 持久化失败时守卫随错误路径释放，不会有部分广播。
        let mut seq = self.sequencer.lock(&room).await;
        let message = Message::room_message(
            MessageId::new(Uuid::new_v4()),
            room.clone(),
            identity,
            text,
            self.deps.clock.now(),
        );
        self.deps.message_repository.append(message.clone()).await?;

        let delivered = self
            .deps
            .registry
            .broadcast_room(
                &room,
                ServerEvent::RoomMessage {
                    room: room.as_str().to_owned(),
                    message: MessageDto::from(&message),
                },
                None,
            )
            .await;
        *seq += 1;
        tracing::debug!(room = %room, sequence = *seq, delivered, "房间消息已扇出");
        Ok(())
    }

    async fn handle_private_message(
        &self,
        session_id: SessionId,
        to_user_id: Uuid,
        text: String,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(());
        };
        let text = MessageText::parse(text)?;
        let recipient = UserId::new(to_user_id);

        // 接收者必须是已知用户；离线不是错误（依赖历史查询补课），
        // 不存在才是。没有发件箱/重试：断开的接收者错过实时事件。
        self.deps
            .user_repository
            .find_by_id(recipient)
            .await?
            .ok_or(ApplicationError::RecipientNotFound(recipient))?;

        let message = Message::private_message(
            MessageId::new(Uuid::new_v4()),
            identity.clone(),
            recipient,
            text,
            self.deps.clock.now(),
        );
        self.deps.message_repository.append(message.clone()).await?;

        let dto = MessageDto::from(&message);
        let delivered = self
            .deps
            .registry
            .send_to_user(recipient, ServerEvent::PrivateMessage(dto.clone()))
            .await;
        // 始终回显给发送者（的全部会话），即使接收者离线
        if recipient != identity.id {
            self.deps
                .registry
                .send_to_user(identity.id, ServerEvent::PrivateMessage(dto))
                .await;
        }
        tracing::debug!(from = %identity.id, to = %recipient, delivered, "私聊消息已投递");
        Ok(())
    }

    async fn handle_typing(
        &self,
        session_id: SessionId,
        room: String,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(());
        };
        let room = RoomName::parse(room)?;

        // 不持久化，服务器也不推送超时后的关闭转换；
        // 陈旧指示由接收端在 3 秒后自行清除。
        self.deps
            .registry
            .broadcast_room(
                &room,
                ServerEvent::Typing {
                    username: identity.username.as_str().to_owned(),
                    room: room.as_str().to_owned(),
                    is_typing,
                },
                Some(session_id),
            )
            .await;
        Ok(())
    }

    async fn handle_message_read(
        &self,
        session_id: SessionId,
        message_id: Uuid,
    ) -> Result<(), ApplicationError> {
        let Some(identity) = self.deps.registry.identity_of(session_id).await else {
            return Ok(());
        };
        let id = MessageId::new(message_id);

        let message = self
            .deps
            .message_repository
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::MessageNotFound))?;

        // 私聊消息的回执只接受双方本人；对其他用户该消息等同不存在
        if let Some(recipient) = message.recipient {
            if identity.id != message.sender.id && identity.id != recipient {
                return Err(ApplicationError::Domain(DomainError::MessageNotFound));
            }
        }

        // 幂等：已在已读集合中则静默无操作，不产生事件
        if message.is_read_by(identity.id) {
            return Ok(());
        }
        let newly_read = self
            .deps
            .message_repository
            .mark_read(id, identity.id)
            .await?;
        if !newly_read {
            return Ok(());
        }

        let event = ServerEvent::MessageRead {
            message_id,
            user_id: identity.id.into(),
        };
        match (&message.room, message.recipient) {
            (Some(room), None) => {
                self.deps.registry.broadcast_room(room, event, None).await;
            }
            (None, Some(recipient)) => {
                self.deps
                    .registry
                    .send_to_user(message.sender.id, event.clone())
                    .await;
                if recipient != message.sender.id {
                    self.deps.registry.send_to_user(recipient, event).await;
                }
            }
            // 构造函数保证不可达
            _ => {}
        }
        Ok(())
    }

    /// 历史回放失败以错误事件上报，协议状态不变。
    async fn send_history(&self, session_id: SessionId, room: &RoomName) {
        match self
            .deps
            .message_repository
            .list_room(room, self.deps.history_limit)
            .await
        {
            Ok(history) => {
                self.deps
                    .registry
                    .send_to_session(
                        session_id,
                        ServerEvent::RoomHistory {
                            room: room.as_str().to_owned(),
                            history: history.iter().map(MessageDto::from).collect(),
                        },
                    )
                    .await;
            }
            Err(err) => {
                tracing::warn!(room = %room, error = %err, "历史回放失败");
                let err = ApplicationError::from(err);
                self.deps
                    .registry
                    .send_to_session(
                        session_id,
                        ServerEvent::Error {
                            code: err.wire_code().to_owned(),
                            message: err.to_string(),
                        },
                    )
                    .await;
            }
        }
    }

    async fn broadcast_presence(&self) {
        let snapshot = self.deps.registry.snapshot().await;
        self.deps
            .registry
            .broadcast_all(ServerEvent::PresenceUpdate(snapshot), None)
            .await;
    }
}
