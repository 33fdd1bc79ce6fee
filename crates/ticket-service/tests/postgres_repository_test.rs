//! PostgreSQL 仓储集成测试
//!
//! 需要可用的数据库，通过 DATABASE_URL 指定：
//! `DATABASE_URL=postgres://... cargo test -p ticket-service -- --ignored`

use sqlx::PgPool;
use uuid::Uuid;

use ticket_service::models::{
    Actor, AssignmentEntry, Role, Ticket, TicketPriority, TicketStatus,
};
use ticket_service::repository::{
    DeviceTokenRepository, DeviceTokenRepositoryTrait, TicketRepository, TicketRepositoryTrait,
};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL 未设置");
    let pool = PgPool::connect(&url).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn sample_ticket() -> (Ticket, AssignmentEntry) {
    let customer = Actor::customer(Uuid::now_v7());
    let agent = Uuid::now_v7();
    let ticket = Ticket::open(
        customer.id,
        None,
        "光猫 LOS 灯闪红".to_string(),
        None,
        TicketPriority::High,
        agent,
        &customer,
    );
    let entry = AssignmentEntry::new(ticket.id, agent, Role::Team, &customer, None);
    (ticket, entry)
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_ticket_status_compare_and_set() {
    let repo = TicketRepository::new(pool().await);
    let (mut ticket, entry) = sample_ticket();
    repo.insert(&ticket, &entry).await.unwrap();

    ticket.status = TicketStatus::Contacted;
    assert!(repo.update(&ticket, TicketStatus::New).await.unwrap());

    // 期望状态已过期
    ticket.status = TicketStatus::Assigned;
    assert!(!repo.update(&ticket, TicketStatus::New).await.unwrap());

    let stored = repo.find(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Contacted);

    repo.delete(ticket.id).await.unwrap();
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_concurrent_assignments_are_not_lost() {
    let repo = TicketRepository::new(pool().await);
    let (ticket, entry) = sample_ticket();
    repo.insert(&ticket, &entry).await.unwrap();

    let admin = Actor::admin(Uuid::now_v7());
    let appends = (0..5).map(|_| {
        let entry = AssignmentEntry::new(ticket.id, Uuid::now_v7(), Role::Team, &admin, None);
        let repo = &repo;
        async move { repo.append_assignment(&entry).await }
    });
    for result in futures::future::join_all(appends).await {
        assert!(result.unwrap().is_some());
    }

    let detail = repo.find_detail(ticket.id).await.unwrap().unwrap();
    assert_eq!(detail.assignment_history.len(), 6);

    repo.delete(ticket.id).await.unwrap();
}

#[tokio::test]
#[ignore] // 需要数据库连接
async fn test_device_token_cap_evicts_oldest() {
    let repo = DeviceTokenRepository::new(pool().await);
    let user = Uuid::now_v7();

    for i in 0..6 {
        repo.register(user, &format!("token-{i}"), 5).await.unwrap();
    }
    let tokens = repo.list(user).await.unwrap();
    assert_eq!(tokens.len(), 5);
    assert_eq!(tokens[0], "token-1");

    assert_eq!(repo.remove(user, &tokens).await.unwrap(), 5);
}
