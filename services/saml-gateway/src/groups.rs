use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupStoreError {
    #[error("root group not found")]
    RootGroupMissing,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOwner {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RootGroup {
    pub id: String,
    pub name: String,
    pub owner: GroupOwner,
}

/// Read access to the application's group records.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn root_group(&self) -> Result<RootGroup, GroupStoreError>;
}

pub struct PgGroupStore {
    pool: PgPool,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn root_group(&self) -> Result<RootGroup, GroupStoreError> {
        let row = sqlx::query(
            "SELECT id, name, owner_email, owner_name FROM groups WHERE privilege = 'root' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GroupStoreError::RootGroupMissing)?;

        Ok(RootGroup {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner: GroupOwner {
                email: row.try_get("owner_email")?,
                name: row.try_get("owner_name")?,
            },
        })
    }
}
