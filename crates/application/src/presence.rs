//! 在线状态注册表
//!
//! 进程内唯一的"谁在线"权威数据源：已连接会话到连接句柄和房间
//! 成员关系的映射。注册表作为单一拥有的对象注入到每个连接处理器，
//! 生命周期与进程相同，绝不是自由漂浮的全局静态量。
//!
//! 扇出是对 房间 -> 会话句柄 索引的显式迭代，而不是框架隐藏功能。

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};

use domain::{Identity, RoomName, SessionId, UserId};

use crate::dto::PresenceEntry;
use crate::error::ApplicationError;
use crate::events::ServerEvent;

/// 新建会话：一个连接恰好对应一个会话。
pub struct NewSession {
    pub session_id: SessionId,
    pub identity: Identity,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// 注销结果。`user_still_online` 为 false 表示该用户已无其他活跃会话，
/// 调用方据此决定是否广播"用户离开"通知。
#[derive(Debug)]
pub struct UnregisteredSession {
    pub identity: Identity,
    pub rooms: HashSet<RoomName>,
    pub user_still_online: bool,
}

struct SessionEntry {
    identity: Identity,
    sender: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<RoomName>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionEntry>,
    rooms: HashMap<RoomName, HashSet<SessionId>>,
}

/// 在线状态注册表。
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// 注册一个会话。同一连接句柄注册两次是传输层缺陷，直接拒绝。
    pub async fn register(&self, session: NewSession) -> Result<(), ApplicationError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.session_id) {
            return Err(ApplicationError::DuplicateSession(session.session_id));
        }
        inner.sessions.insert(
            session.session_id,
            SessionEntry {
                identity: session.identity,
                sender: session.sender,
                rooms: HashSet::new(),
            },
        );
        Ok(())
    }

    /// 注销一个会话。幂等：未知句柄返回 None，不是错误。
    /// 会话的房间成员关系随之隐式清除。
    pub async fn unregister(&self, session_id: SessionId) -> Option<UnregisteredSession> {
        let mut inner = self.inner.write().await;
        let entry = inner.sessions.remove(&session_id)?;
        for room in &entry.rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&session_id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }
        let user_still_online = inner
            .sessions
            .values()
            .any(|other| other.identity.id == entry.identity.id);
        Some(UnregisteredSession {
            identity: entry.identity,
            rooms: entry.rooms,
            user_still_online,
        })
    }

    /// 当前在线列表。调用内顺序稳定（按用户名、会话排序）。
    pub async fn snapshot(&self) -> Vec<PresenceEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<PresenceEntry> = inner
            .sessions
            .iter()
            .map(|(session_id, entry)| PresenceEntry {
                user_id: entry.identity.id.into(),
                username: entry.identity.username.as_str().to_owned(),
                connection_handle: (*session_id).into(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then(a.connection_handle.cmp(&b.connection_handle))
        });
        entries
    }

    /// 会话加入房间。重复加入是无操作，返回 false。
    pub async fn join_room(&self, session_id: SessionId, room: RoomName) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(entry) = inner.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        inner.rooms.entry(room).or_default().insert(session_id)
    }

    /// 会话离开房间。离开未加入的房间是无操作，返回 false。
    pub async fn leave_room(&self, session_id: SessionId, room: &RoomName) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(entry) = inner.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.remove(room) {
            return false;
        }
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&session_id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
        true
    }

    pub async fn identity_of(&self, session_id: SessionId) -> Option<Identity> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(&session_id)
            .map(|entry| entry.identity.clone())
    }

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        let inner = self.inner.read().await;
        inner
            .sessions
            .values()
            .any(|entry| entry.identity.id == user_id)
    }

    /// 当前加入某房间的会话句柄。
    pub async fn sessions_in_room(&self, room: &RoomName) -> Vec<SessionId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 投递到单个会话。会话已不存在或正在关闭时返回 false。
    pub async fn send_to_session(&self, session_id: SessionId, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        match inner.sessions.get(&session_id) {
            Some(entry) => deliver(session_id, entry, event),
            None => false,
        }
    }

    /// 投递到某用户的所有活跃会话（多设备），返回投递数。
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        inner
            .sessions
            .iter()
            .filter(|(_, entry)| entry.identity.id == user_id)
            .filter(|(session_id, entry)| deliver(**session_id, entry, event.clone()))
            .count()
    }

    /// 扇出到房间内所有会话，可排除一个会话（通常是发起者）。
    pub async fn broadcast_room(
        &self,
        room: &RoomName,
        event: ServerEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|session_id| Some(**session_id) != exclude)
            .filter(|session_id| {
                inner
                    .sessions
                    .get(*session_id)
                    .is_some_and(|entry| deliver(**session_id, entry, event.clone()))
            })
            .count()
    }

    /// 广播到所有连接的会话。
    pub async fn broadcast_all(&self, event: ServerEvent, exclude: Option<SessionId>) -> usize {
        let inner = self.inner.read().await;
        inner
            .sessions
            .iter()
            .filter(|(session_id, _)| Some(**session_id) != exclude)
            .filter(|(session_id, entry)| deliver(**session_id, entry, event.clone()))
            .count()
    }
}

/// 向会话通道投递。接收端已销毁说明会话正在关闭，丢弃即可。
fn deliver(session_id: SessionId, entry: &SessionEntry, event: ServerEvent) -> bool {
    match entry.sender.send(event) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!(session_id = %session_id, "session channel closed, event dropped");
            false
        }
    }
}
