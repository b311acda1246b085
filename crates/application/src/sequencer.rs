//! 房间级消息串行化。
//!
//! 每个房间一把异步锁加一个单调递增序列号。持有某房间的守卫期间
//! 完成"持久化然后扇出"，对同一房间的并发加入/离开/发送表现为
//! 原子操作，从而给出单房间全序（持久化顺序 == 投递顺序）。
//! 不同房间之间互不阻塞，没有全局顺序。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use domain::RoomName;

pub struct RoomSequencer {
    rooms: Mutex<HashMap<RoomName, Arc<Mutex<u64>>>>,
}

impl Default for RoomSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// 获取房间的串行化守卫。守卫内的 u64 是该房间的序列号，
    /// 由调用方在接受一条消息时递增。
    pub async fn lock(&self, room: &RoomName) -> OwnedMutexGuard<u64> {
        let cell = {
            let mut rooms = self.rooms.lock().await;
            rooms.entry(room.clone()).or_default().clone()
        };
        cell.lock_owned().await
    }
}
