//! 目录仓储
//!
//! 只读访问客户、连接与员工记录

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::DirectoryRepositoryTrait;
use crate::error::Result;
use crate::models::{Connection, Customer, Role, StaffMember, UserProfile};

/// 目录仓储
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryRepositoryTrait for DirectoryRepository {
    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, active_connection_id, created_at
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn find_connection(&self, id: Uuid) -> Result<Option<Connection>> {
        let connection = sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, customer_id, service_area_id, created_at
            FROM connections
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    async fn find_agent_for_area(&self, area_id: Uuid) -> Result<Option<StaffMember>> {
        let agent = sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT id, name, role, area_id, created_at
            FROM staff
            WHERE area_id = $1 AND role = $2
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(area_id)
        .bind(Role::Team)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn find_staff(&self, id: Uuid) -> Result<Option<StaffMember>> {
        let staff = sqlx::query_as::<_, StaffMember>(
            "SELECT id, name, role, area_id, created_at FROM staff WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(staff)
    }

    async fn list_admins(&self) -> Result<Vec<StaffMember>> {
        let admins = sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT id, name, role, area_id, created_at
            FROM staff
            WHERE role = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(Role::Admin)
        .fetch_all(&self.pool)
        .await?;

        Ok(admins)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, active_connection_id, created_at
            FROM customers
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let profiles = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, name, role FROM staff WHERE id = ANY($1)
            UNION ALL
            SELECT id, name, 'customer'::varchar AS role FROM customers WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }
}
