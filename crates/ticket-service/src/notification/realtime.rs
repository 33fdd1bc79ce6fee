//! 实时事件总线
//!
//! 进程内维护连接与房间的订阅关系：每个工单一个房间（另有仅员工可见的工单房间），
//! 每个用户一个个人房间。事件不持久化，离线期间的事件由通知记录补偿。
//!
//! 每个连接持有一个有界队列，队列已满时丢弃该连接的本次事件，不阻塞广播方。

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use helpdesk_shared::observability::metrics;

use super::error::DeliveryError;

/// 订阅房间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// 查看该工单的所有客户端
    Ticket(Uuid),
    /// 查看该工单的员工，私有评论事件只发到这里
    TicketStaff(Uuid),
    /// 用户个人房间，连接建立时自动加入
    User(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket:{id}"),
            Self::TicketStaff(id) => write!(f, "ticket-staff:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// 推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub event: String,
    pub room: String,
    pub data: serde_json::Value,
}

struct ConnectionEntry {
    sender: mpsc::Sender<RealtimeEvent>,
    rooms: HashSet<Room>,
}

/// 实时事件总线
///
/// 进程启动时创建并注入各组件，关闭时调用 `shutdown` 断开所有连接
pub struct RealtimeBus {
    connections: DashMap<Uuid, ConnectionEntry>,
    rooms: DashMap<Room, HashSet<Uuid>>,
    buffer: usize,
    closed: AtomicBool,
}

impl RealtimeBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// 注册一个新连接，返回连接 ID 与事件接收端
    pub fn connect(&self) -> Result<(Uuid, mpsc::Receiver<RealtimeEvent>), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Realtime("实时总线已关闭".to_string()));
        }

        let connection_id = Uuid::now_v7();
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                sender,
                rooms: HashSet::new(),
            },
        );
        metrics::set_realtime_connections(self.connections.len());
        debug!(connection_id = %connection_id, "实时连接已建立");

        Ok((connection_id, receiver))
    }

    /// 断开连接并退出其加入的所有房间
    pub fn disconnect(&self, connection_id: Uuid) {
        let Some((_, entry)) = self.connections.remove(&connection_id) else {
            return;
        };

        for room in entry.rooms {
            self.remove_member(room, connection_id);
        }
        metrics::set_realtime_connections(self.connections.len());
        debug!(connection_id = %connection_id, "实时连接已断开");
    }

    /// 加入房间，连接不存在时返回 false
    pub fn join(&self, connection_id: Uuid, room: Room) -> bool {
        {
            let Some(mut entry) = self.connections.get_mut(&connection_id) else {
                return false;
            };
            entry.rooms.insert(room);
        }

        self.rooms.entry(room).or_default().insert(connection_id);
        true
    }

    pub fn leave(&self, connection_id: Uuid, room: Room) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            entry.rooms.remove(&room);
        }
        self.remove_member(room, connection_id);
    }

    /// 将某用户的全部连接移出房间，返回移出的连接数
    ///
    /// 用户的连接以其个人房间的成员为准
    pub fn evict_user(&self, room: Room, user_id: Uuid) -> usize {
        let owned: Vec<Uuid> = match self.rooms.get(&Room::User(user_id)) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let mut evicted = 0;
        for connection_id in owned {
            let member = self
                .rooms
                .get(&room)
                .map(|set| set.contains(&connection_id))
                .unwrap_or(false);
            if member {
                self.leave(connection_id, room);
                evicted += 1;
            }
        }
        evicted
    }

    /// 向房间内所有连接广播事件，返回成功入队的连接数
    ///
    /// 队列已满的连接丢弃本次事件；接收端已关闭的连接被清理
    pub fn broadcast(
        &self,
        room: Room,
        event: &str,
        data: serde_json::Value,
    ) -> Result<usize, DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Realtime("实时总线已关闭".to_string()));
        }

        let members: Vec<Uuid> = match self.rooms.get(&room) {
            Some(set) => set.iter().copied().collect(),
            None => return Ok(0),
        };

        let payload = RealtimeEvent {
            event: event.to_string(),
            room: room.to_string(),
            data,
        };

        let mut delivered = 0;
        let mut stale = Vec::new();
        for connection_id in members {
            let Some(sender) = self
                .connections
                .get(&connection_id)
                .map(|entry| entry.sender.clone())
            else {
                continue;
            };

            match sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        room = %room,
                        event,
                        "连接事件队列已满，丢弃本次事件"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => stale.push(connection_id),
            }
        }

        for connection_id in stale {
            self.disconnect(connection_id);
        }

        Ok(delivered)
    }

    pub fn room_size(&self, room: Room) -> usize {
        self.rooms.get(&room).map(|set| set.len()).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 关闭总线，释放所有发送端，客户端的接收循环随之结束
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let count = self.connections.len();
        self.connections.clear();
        self.rooms.clear();
        metrics::set_realtime_connections(0);
        info!(connections = count, "实时总线已关闭");
    }

    fn remove_member(&self, room: Room, connection_id: Uuid) {
        if let Some(mut set) = self.rooms.get_mut(&room) {
            set.remove(&connection_id);
        }
        self.rooms.remove_if(&room, |_, set| set.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_display() {
        let id = Uuid::nil();
        assert_eq!(
            Room::Ticket(id).to_string(),
            "ticket:00000000-0000-0000-0000-000000000000"
        );
        assert!(Room::TicketStaff(id).to_string().starts_with("ticket-staff:"));
        assert!(Room::User(id).to_string().starts_with("user:"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_room_members_only() {
        let bus = RealtimeBus::new(8);
        let ticket = Uuid::now_v7();
        let (a, mut rx_a) = bus.connect().unwrap();
        let (_b, mut rx_b) = bus.connect().unwrap();
        assert!(bus.join(a, Room::Ticket(ticket)));

        let delivered = bus
            .broadcast(Room::Ticket(ticket), "ticketUpdated", json!({"id": ticket}))
            .unwrap();
        assert_eq!(delivered, 1);

        let event = rx_a.recv().await.unwrap();
        assert_eq!(event.event, "ticketUpdated");
        assert_eq!(event.room, Room::Ticket(ticket).to_string());

        let mut other = tokio_test::task::spawn(rx_b.recv());
        tokio_test::assert_pending!(other.poll());
    }

    #[tokio::test]
    async fn test_leave_and_disconnect_clean_rooms() {
        let bus = RealtimeBus::new(8);
        let user = Uuid::now_v7();
        let ticket = Uuid::now_v7();
        let (conn, _rx) = bus.connect().unwrap();
        bus.join(conn, Room::User(user));
        bus.join(conn, Room::Ticket(ticket));
        assert_eq!(bus.room_size(Room::Ticket(ticket)), 1);

        bus.leave(conn, Room::Ticket(ticket));
        assert_eq!(bus.room_size(Room::Ticket(ticket)), 0);
        assert_eq!(
            bus.broadcast(Room::Ticket(ticket), "ticketUpdated", json!({}))
                .unwrap(),
            0
        );

        bus.disconnect(conn);
        assert_eq!(bus.room_size(Room::User(user)), 0);
        assert_eq!(bus.connection_count(), 0);
        assert!(!bus.join(conn, Room::User(user)));
    }

    #[tokio::test]
    async fn test_evict_user_removes_only_that_users_connections() {
        let bus = RealtimeBus::new(8);
        let ticket = Uuid::now_v7();
        let (old_agent, new_agent) = (Uuid::now_v7(), Uuid::now_v7());
        let staff = Room::TicketStaff(ticket);

        let (phone, _phone_rx) = bus.connect().unwrap();
        let (laptop, _laptop_rx) = bus.connect().unwrap();
        let (other, _other_rx) = bus.connect().unwrap();
        for (conn, user) in [(phone, old_agent), (laptop, old_agent), (other, new_agent)] {
            bus.join(conn, Room::User(user));
            bus.join(conn, staff);
            bus.join(conn, Room::Ticket(ticket));
        }

        assert_eq!(bus.evict_user(staff, old_agent), 2);
        assert_eq!(bus.room_size(staff), 1);
        assert_eq!(bus.room_size(Room::Ticket(ticket)), 3);
        assert_eq!(bus.room_size(Room::User(old_agent)), 2);

        assert_eq!(bus.evict_user(staff, old_agent), 0);
        assert_eq!(bus.evict_user(staff, Uuid::now_v7()), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_event_without_blocking() {
        let bus = RealtimeBus::new(1);
        let user = Uuid::now_v7();
        let (conn, mut rx) = bus.connect().unwrap();
        bus.join(conn, Room::User(user));

        assert_eq!(bus.broadcast(Room::User(user), "first", json!({})).unwrap(), 1);
        assert_eq!(bus.broadcast(Room::User(user), "second", json!({})).unwrap(), 0);
        assert_eq!(rx.recv().await.unwrap().event, "first");
        assert_eq!(bus.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let bus = RealtimeBus::new(4);
        let user = Uuid::now_v7();
        let (conn, rx) = bus.connect().unwrap();
        bus.join(conn, Room::User(user));
        drop(rx);

        assert_eq!(bus.broadcast(Room::User(user), "ping", json!({})).unwrap(), 0);
        assert_eq!(bus.connection_count(), 0);
        assert_eq!(bus.room_size(Room::User(user)), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_receivers() {
        let bus = RealtimeBus::new(4);
        let (_conn, mut rx) = bus.connect().unwrap();
        bus.shutdown();

        assert!(rx.recv().await.is_none());
        assert!(bus.connect().is_err());
        assert!(matches!(
            bus.broadcast(Room::User(Uuid::now_v7()), "x", json!({})),
            Err(DeliveryError::Realtime(_))
        ));
    }
}
