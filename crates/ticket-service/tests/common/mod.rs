//! 集成测试公共装配
//!
//! 使用内存存储装配完整应用：一个服务区域、一名负责该区域的工程师 X、
//! 另一区域的工程师 Y、两名管理员，以及一个拥有生效连接的客户

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use fake::Fake;
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use uuid::Uuid;

use helpdesk_shared::config::NotificationConfig;
use ticket_service::app::{Repositories, TicketApp};
use ticket_service::models::{Actor, Connection, Customer, Role, StaffMember};
use ticket_service::notification::{LoggingPushProvider, PushProvider};
use ticket_service::repository::MemoryStore;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub app: TicketApp,
    pub customer: Actor,
    pub connection_id: Uuid,
    pub area_id: Uuid,
    /// 负责客户所在区域的工程师
    pub agent: Actor,
    /// 其他区域的工程师
    pub other_agent: Actor,
    pub admins: Vec<Actor>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_provider(Arc::new(LoggingPushProvider))
    }

    pub fn with_provider(provider: Arc<dyn PushProvider>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        let area_id = Uuid::now_v7();
        let agent = add_staff(&store, Role::Team, Some(area_id), now);
        let other_agent = add_staff(&store, Role::Team, Some(Uuid::now_v7()), now);
        let admins = vec![
            add_staff(&store, Role::Admin, None, now),
            add_staff(&store, Role::Admin, None, now + Duration::seconds(1)),
        ];
        let (customer, connection_id) = add_customer(&store, Some(area_id));

        let mut config = NotificationConfig::default();
        config.push.initial_backoff_ms = 1;
        config.push.max_backoff_ms = 5;

        let app = TicketApp::build(Repositories::memory(store.clone()), provider, &config);

        Self {
            store,
            app,
            customer,
            connection_id,
            area_id,
            agent,
            other_agent,
            admins,
        }
    }

    pub fn admin(&self) -> Actor {
        self.admins[0]
    }
}

pub fn add_staff(
    store: &MemoryStore,
    role: Role,
    area_id: Option<Uuid>,
    created_at: chrono::DateTime<Utc>,
) -> Actor {
    let id = Uuid::now_v7();
    store.add_staff(StaffMember {
        id,
        name: Name().fake(),
        role,
        area_id,
        created_at,
    });
    Actor::new(id, role)
}

/// 新增客户及其生效连接
pub fn add_customer(store: &MemoryStore, area_id: Option<Uuid>) -> (Actor, Uuid) {
    let customer_id = Uuid::now_v7();
    let connection_id = Uuid::now_v7();
    store.add_connection(Connection {
        id: connection_id,
        customer_id,
        service_area_id: area_id,
        created_at: Utc::now(),
    });
    store.add_customer(Customer {
        id: customer_id,
        name: Name().fake(),
        email: None,
        active_connection_id: Some(connection_id),
        created_at: Utc::now(),
    });
    (Actor::customer(customer_id), connection_id)
}

pub fn description() -> String {
    Sentence(3..8).fake()
}
