use crate::db::models::User;
use crate::db::pool::ConnectionManager;
use crate::error::DatabaseError;
use std::sync::Arc;
use tracing::info;

/// Credential record queries. Each call takes its own operation context.
#[derive(Clone)]
pub struct DbOperations {
    db: Arc<ConnectionManager>,
}

impl DbOperations {
    pub fn new(db: Arc<ConnectionManager>) -> Self {
        Self { db }
    }

    pub async fn create_user(&self, user: &User) -> Result<User, DatabaseError> {
        let ctx = self.db.new_operation_context();
        let mut conn = ctx.acquire().await?;

        let created = ctx
            .within(
                sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, email, password_hash, display_name, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id, email, password_hash, display_name, created_at
                    "#,
                )
                .bind(user.id)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.display_name)
                .bind(user.created_at)
                .fetch_one(&mut *conn),
            )
            .await?;

        drop(conn);
        ctx.release();
        info!("Created user {}", created.id);
        Ok(created)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let ctx = self.db.new_operation_context();
        let mut conn = ctx.acquire().await?;

        let user = ctx
            .within(
                sqlx::query_as::<_, User>(
                    "SELECT id, email, password_hash, display_name, created_at FROM users WHERE email = $1",
                )
                .bind(email)
                .fetch_optional(&mut *conn),
            )
            .await?;

        drop(conn);
        ctx.release();
        Ok(user)
    }
}
