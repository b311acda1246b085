//! 实时会话协议单元测试
//!
//! 使用内存存储和直连通道驱动协议状态机，覆盖房间扇出顺序、
//! 已读回执幂等、离线私聊、输入提示转发和断开清理。

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use async_trait::async_trait;
use domain::{
    Identity, Message, MessageId, MessageRepository, RepositoryError, SessionId, Timestamp, User,
    UserId, UserRepository, Username, value_objects::RoomName,
};

use crate::clock::SystemClock;
use crate::dto::MessageDto;
use crate::events::{ClientEvent, ServerEvent};
use crate::presence::NewSession;
use crate::presence::PresenceRegistry;
use crate::repository::memory::{MemoryMessageRepository, MemoryUserRepository};
use crate::services::{RealtimeService, RealtimeServiceDependencies};

struct TestEnv {
    service: RealtimeService,
    users: Arc<MemoryUserRepository>,
    messages: Arc<MemoryMessageRepository>,
}

fn test_env() -> TestEnv {
    let users = Arc::new(MemoryUserRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new());
    let service = RealtimeService::new(RealtimeServiceDependencies {
        message_repository: messages.clone(),
        user_repository: users.clone(),
        registry: Arc::new(PresenceRegistry::new()),
        clock: Arc::new(SystemClock),
        history_limit: 100,
    });
    TestEnv {
        service,
        users,
        messages,
    }
}

struct Client {
    session_id: SessionId,
    identity: Identity,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    /// 取走目前收到的全部事件。
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn room_messages(events: &[ServerEvent]) -> Vec<MessageDto> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::RoomMessage { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn error_codes(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::Error { code, .. } => Some(code.clone()),
            _ => None,
        })
        .collect()
}

async fn create_user_in(users: &MemoryUserRepository, name: &str) -> Identity {
    let user = User::register(
        UserId::new(Uuid::new_v4()),
        Username::parse(name).unwrap(),
        "hashed".to_owned(),
        Timestamp::now_utc(),
    );
    users.create(user).await.unwrap().identity()
}

async fn create_user(env: &TestEnv, name: &str) -> Identity {
    create_user_in(&env.users, name).await
}

async fn connect_to(service: &RealtimeService, identity: Identity) -> Client {
    let session_id = SessionId::new(Uuid::new_v4());
    let (tx, rx) = mpsc::unbounded_channel();
    service
        .connect(NewSession {
            session_id,
            identity: identity.clone(),
            sender: tx,
        })
        .await
        .unwrap();
    Client {
        session_id,
        identity,
        rx,
    }
}

async fn connect(env: &TestEnv, identity: Identity) -> Client {
    connect_to(&env.service, identity).await
}

/// 持久化不可用的消息存储：追加和标记已读一律失败，查询返回空。
struct FailingMessageStore;

#[async_trait]
impl MessageRepository for FailingMessageStore {
    async fn append(&self, _message: Message) -> Result<MessageId, RepositoryError> {
        Err(RepositoryError::storage("store offline"))
    }

    async fn find_by_id(&self, _id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(None)
    }

    async fn list_room(
        &self,
        _room: &RoomName,
        _limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn list_between(
        &self,
        _a: UserId,
        _b: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _id: MessageId, _reader: UserId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::storage("store offline"))
    }
}

#[tokio::test]
async fn connect_replays_history_and_broadcasts_presence() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;

    let mut a = connect(&env, alice).await;
    let events = a.drain();
    assert!(matches!(
        &events[0],
        ServerEvent::RoomHistory { room, history } if room == "global" && history.is_empty()
    ));
    assert!(matches!(
        &events[1],
        ServerEvent::PresenceUpdate(list) if list.len() == 1
    ));

    let mut b = connect(&env, bob).await;
    let a_events = a.drain();
    // 已在线的会话看到新的在线列表和加入通知
    assert!(a_events.iter().any(|e| matches!(
        e,
        ServerEvent::PresenceUpdate(list) if list.len() == 2
    )));
    assert!(a_events.iter().any(|e| matches!(
        e,
        ServerEvent::Notification { message } if message == "bob joined the chat"
    )));

    // 新会话收到历史和在线列表，但不收到自己的加入通知
    let b_events = b.drain();
    assert!(b_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RoomHistory { .. })));
    assert!(!b_events
        .iter()
        .any(|e| matches!(e, ServerEvent::Notification { .. })));
}

#[tokio::test]
async fn room_message_fans_out_to_all_members_in_order() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b = connect(&env, bob).await;
    a.drain();
    b.drain();

    for text in ["one", "two", "three"] {
        env.service
            .handle_event(
                a.session_id,
                ClientEvent::RoomMessage {
                    room: "global".to_owned(),
                    text: text.to_owned(),
                },
            )
            .await;
    }

    // 发送者也收到，且双方观察到同一持久化顺序
    let a_messages = room_messages(&a.drain());
    let b_messages = room_messages(&b.drain());
    assert_eq!(a_messages.len(), 3);
    assert_eq!(a_messages, b_messages);
    let texts: Vec<&str> = a_messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);

    // read_by 以发送者播种
    assert_eq!(a_messages[0].read_by, vec![Uuid::from(a.identity.id)]);
}

#[tokio::test]
async fn empty_room_message_is_rejected_without_broadcast() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b = connect(&env, bob).await;
    a.drain();
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomMessage {
                room: "global".to_owned(),
                text: "   ".to_owned(),
            },
        )
        .await;

    assert_eq!(error_codes(&a.drain()), vec!["VALIDATION_ERROR"]);
    assert!(b.drain().is_empty());
    let stored = env
        .messages
        .list_room(&RoomName::global(), 100)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn private_message_to_offline_recipient_persists_and_echoes() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await; // 从不连接
    let mut a = connect(&env, alice.clone()).await;
    a.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: bob.id.into(),
                text: "psst".to_owned(),
            },
        )
        .await;

    // 回显给发送者
    let events = a.drain();
    assert!(matches!(
        &events[0],
        ServerEvent::PrivateMessage(dto) if dto.text == "psst" && dto.to == Some(bob.id.into())
    ));

    // 已持久化：接收者之后靠历史查询补课
    let between = env.messages.list_between(alice.id, bob.id).await.unwrap();
    assert_eq!(between.len(), 1);
}

#[tokio::test]
async fn private_message_to_unknown_recipient_is_rejected() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let mut a = connect(&env, alice.clone()).await;
    a.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: Uuid::new_v4(),
                text: "hello?".to_owned(),
            },
        )
        .await;

    assert_eq!(error_codes(&a.drain()), vec!["NOT_FOUND"]);
    let bob_id = UserId::new(Uuid::new_v4());
    assert!(env
        .messages
        .list_between(alice.id, bob_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn private_message_reaches_every_session_of_recipient() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b_phone = connect(&env, bob.clone()).await;
    let mut b_laptop = connect(&env, bob.clone()).await;
    a.drain();
    b_phone.drain();
    b_laptop.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: bob.id.into(),
                text: "hi".to_owned(),
            },
        )
        .await;

    for client in [&mut a, &mut b_phone, &mut b_laptop] {
        let events = client.drain();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ServerEvent::PrivateMessage(_)))
                .count(),
            1
        );
    }
}

#[tokio::test]
async fn typing_is_forwarded_but_not_echoed() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b = connect(&env, bob).await;
    a.drain();
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::Typing {
                room: "global".to_owned(),
                is_typing: true,
            },
        )
        .await;

    assert!(a.drain().is_empty());
    let events = b.drain();
    assert_eq!(
        events,
        vec![ServerEvent::Typing {
            username: "alice".to_owned(),
            room: "global".to_owned(),
            is_typing: true,
        }]
    );
}

#[tokio::test]
async fn message_read_is_idempotent() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice.clone()).await;
    let mut b = connect(&env, bob.clone()).await;
    a.drain();
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomMessage {
                room: "global".to_owned(),
                text: "read me".to_owned(),
            },
        )
        .await;
    let message_id = room_messages(&b.drain())[0].id;
    a.drain();

    for _ in 0..2 {
        env.service
            .handle_event(b.session_id, ClientEvent::MessageRead { message_id })
            .await;
    }

    // 恰好一次广播，恰好一次追加
    let reads = |events: &[ServerEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::MessageRead { .. }))
            .count()
    };
    assert_eq!(reads(&a.drain()), 1);
    assert_eq!(reads(&b.drain()), 1);

    let stored = env
        .messages
        .find_by_id(domain::MessageId::new(message_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.read_by, vec![alice.id, bob.id]);
}

#[tokio::test]
async fn read_receipt_for_private_message_routes_to_both_parties() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice.clone()).await;
    let mut b = connect(&env, bob.clone()).await;
    a.drain();
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: bob.id.into(),
                text: "secret".to_owned(),
            },
        )
        .await;
    a.drain();
    let events = b.drain();
    let ServerEvent::PrivateMessage(dto) = &events[0] else {
        panic!("expected private message, got {events:?}");
    };

    env.service
        .handle_event(b.session_id, ClientEvent::MessageRead { message_id: dto.id })
        .await;

    let expected = ServerEvent::MessageRead {
        message_id: dto.id,
        user_id: bob.id.into(),
    };
    assert_eq!(a.drain(), vec![expected.clone()]);
    assert_eq!(b.drain(), vec![expected]);
}

#[tokio::test]
async fn room_join_and_leave_lifecycle() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b = connect(&env, bob).await;
    a.drain();
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomJoin {
                room: "rust".to_owned(),
            },
        )
        .await;
    let events = a.drain();
    assert!(matches!(
        &events[0],
        ServerEvent::RoomHistory { room, .. } if room == "rust"
    ));

    env.service
        .handle_event(
            b.session_id,
            ClientEvent::RoomJoin {
                room: "rust".to_owned(),
            },
        )
        .await;
    assert!(a.drain().iter().any(|e| matches!(
        e,
        ServerEvent::Notification { message } if message == "bob joined rust"
    )));
    b.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomLeave {
                room: "rust".to_owned(),
            },
        )
        .await;
    assert!(b.drain().iter().any(|e| matches!(
        e,
        ServerEvent::Notification { message } if message == "alice left rust"
    )));

    // 离开之后不再收到该房间的消息
    env.service
        .handle_event(
            b.session_id,
            ClientEvent::RoomMessage {
                room: "rust".to_owned(),
                text: "anyone?".to_owned(),
            },
        )
        .await;
    assert!(a.drain().is_empty());
    assert_eq!(room_messages(&b.drain()).len(), 1);
}

#[tokio::test]
async fn duplicate_join_replays_history_without_renotifying() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let mut b = connect(&env, bob).await;
    a.drain();
    b.drain();

    // global 已经在连接时自动加入
    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomJoin {
                room: "global".to_owned(),
            },
        )
        .await;

    assert!(a
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::RoomHistory { .. })));
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn disconnect_clears_membership_and_notifies_remaining() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let b = connect(&env, bob).await;
    a.drain();

    env.service.disconnect(b.session_id).await;

    let events = a.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PresenceUpdate(list) if list.len() == 1
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::Notification { message } if message == "bob left the chat"
    )));
    assert!(env
        .service
        .registry()
        .sessions_in_room(&RoomName::global())
        .await
        == vec![a.session_id]);

    // 幂等：重复断开不产生额外事件
    env.service.disconnect(b.session_id).await;
    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn disconnect_with_remaining_session_skips_left_notification() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let mut a = connect(&env, alice).await;
    let b_phone = connect(&env, bob.clone()).await;
    let mut b_laptop = connect(&env, bob).await;
    a.drain();
    b_laptop.drain();

    env.service.disconnect(b_phone.session_id).await;

    let events = a.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::PresenceUpdate(list) if list.len() == 2)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ServerEvent::Notification { .. })));
}

#[tokio::test]
async fn malformed_frame_is_reported_and_connection_survives() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let mut a = connect(&env, alice).await;
    a.drain();

    env.service
        .report_malformed(a.session_id, "unknown event".to_owned())
        .await;
    assert_eq!(error_codes(&a.drain()), vec!["VALIDATION_ERROR"]);

    // 连接仍然 Active
    env.service
        .handle_event(
            a.session_id,
            ClientEvent::RoomMessage {
                room: "global".to_owned(),
                text: "still here".to_owned(),
            },
        )
        .await;
    assert_eq!(room_messages(&a.drain()).len(), 1);
}

#[tokio::test]
async fn store_failure_reports_error_without_broadcast() {
    let users = Arc::new(MemoryUserRepository::new());
    let service = RealtimeService::new(RealtimeServiceDependencies {
        message_repository: Arc::new(FailingMessageStore),
        user_repository: users.clone(),
        registry: Arc::new(PresenceRegistry::new()),
        clock: Arc::new(SystemClock),
        history_limit: 100,
    });
    let alice = create_user_in(&users, "alice").await;
    let bob = create_user_in(&users, "bob").await;
    let mut a = connect_to(&service, alice).await;
    let mut b = connect_to(&service, bob.clone()).await;
    a.drain();
    b.drain();

    service
        .handle_event(
            a.session_id,
            ClientEvent::RoomMessage {
                room: "global".to_owned(),
                text: "hello".to_owned(),
            },
        )
        .await;

    // 持久化失败：错误回显给发送者，房间内没有任何消息扇出
    assert_eq!(error_codes(&a.drain()), vec!["STORE_ERROR"]);
    assert!(b.drain().is_empty());

    // 私聊路径同样不投递
    service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: bob.id.into(),
                text: "psst".to_owned(),
            },
        )
        .await;
    assert_eq!(error_codes(&a.drain()), vec!["STORE_ERROR"]);
    assert!(b.drain().is_empty());

    // 连接保持 Active：不落库的事件照常工作
    service
        .handle_event(
            a.session_id,
            ClientEvent::Typing {
                room: "global".to_owned(),
                is_typing: true,
            },
        )
        .await;
    assert_eq!(b.drain().len(), 1);
}

#[tokio::test]
async fn read_receipt_from_outsider_is_rejected() {
    let env = test_env();
    let alice = create_user(&env, "alice").await;
    let bob = create_user(&env, "bob").await;
    let carol = create_user(&env, "carol").await;
    let mut a = connect(&env, alice.clone()).await;
    let mut b = connect(&env, bob.clone()).await;
    let mut c = connect(&env, carol).await;
    a.drain();
    b.drain();
    c.drain();

    env.service
        .handle_event(
            a.session_id,
            ClientEvent::PrivateMessage {
                to_user_id: bob.id.into(),
                text: "secret".to_owned(),
            },
        )
        .await;
    a.drain();
    let events = b.drain();
    let ServerEvent::PrivateMessage(dto) = &events[0] else {
        panic!("expected private message, got {events:?}");
    };

    // 第三方用户拿到消息 id 也不能标记已读
    env.service
        .handle_event(c.session_id, ClientEvent::MessageRead { message_id: dto.id })
        .await;

    assert_eq!(error_codes(&c.drain()), vec!["NOT_FOUND"]);
    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
    let stored = env
        .messages
        .find_by_id(domain::MessageId::new(dto.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.read_by, vec![alice.id]);
}
