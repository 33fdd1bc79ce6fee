//! 工单事件通知
//!
//! 工单房间事件同步广播；接收人计算与扇出放到后台任务，
//! 工单操作不等待通知结果。

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use super::recipients::RecipientResolver;
use crate::models::Ticket;
use crate::notification::{NotifyFanout, RealtimeBus, Room, TicketEvent};

/// 工单删除事件名
pub const TICKET_DELETED_EVENT: &str = "ticketDeleted";

#[derive(Clone)]
pub struct TicketNotifier {
    bus: Arc<RealtimeBus>,
    fanout: Arc<NotifyFanout>,
    resolver: RecipientResolver,
}

impl TicketNotifier {
    pub fn new(bus: Arc<RealtimeBus>, fanout: Arc<NotifyFanout>, resolver: RecipientResolver) -> Self {
        Self {
            bus,
            fanout,
            resolver,
        }
    }

    /// 广播工单房间事件并在后台通知相关方
    ///
    /// `room_data` 发往工单房间，`extra` 合并进通知 payload
    pub fn ticket_event(&self, ticket: &Ticket, event: TicketEvent, room_data: Value, extra: Value) {
        self.broadcast(event.room(ticket.id), event.room_event(), room_data);

        let message = event.notification(ticket.id, extra);
        let resolver = self.resolver.clone();
        let fanout = Arc::clone(&self.fanout);
        let ticket = ticket.clone();

        self.fanout.spawn_tracked(async move {
            let recipients = resolver.for_ticket(&ticket, event.notifies_customer()).await;
            fanout.notify(recipients, &message).await;
        });
    }

    /// 原负责人失去处理权限后，不再接收该工单的员工房间事件
    pub fn revoke_staff_room(&self, ticket_id: Uuid, user_id: Uuid) {
        let evicted = self.bus.evict_user(Room::TicketStaff(ticket_id), user_id);
        if evicted > 0 {
            debug!(ticket_id = %ticket_id, user_id = %user_id, evicted, "已移出工单员工房间");
        }
    }

    pub fn ticket_deleted(&self, ticket_id: Uuid) {
        self.broadcast(
            Room::Ticket(ticket_id),
            TICKET_DELETED_EVENT,
            json!({ "id": ticket_id }),
        );
    }

    fn broadcast(&self, room: Room, event: &str, data: Value) {
        match self.bus.broadcast(room, event, data) {
            Ok(listeners) => debug!(room = %room, event, listeners, "工单房间事件已广播"),
            Err(e) => warn!(room = %room, event, error = %e, "工单房间事件广播失败"),
        }
    }
}
