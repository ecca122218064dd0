//! User lookup used to annotate who triggered a status change.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use statusline_core::db::DatabasePool;
use statusline_core::errors::Result;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Actor {
    pub name: String,
    pub email: String,
}

impl Actor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Root-cause text recorded on intervals created by this user.
    pub fn root_cause(&self) -> String {
        format!("Monitor status created by {} ({})", self.name, self.email)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>>;
}

/// Fixed in-memory directory.
#[derive(Default, Clone)]
pub struct StaticDirectory {
    actors: Arc<RwLock<HashMap<Uuid, Actor>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(self, user_id: Uuid, actor: Actor) -> Self {
        self.actors.write().insert(user_id, actor);
        self
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>> {
        Ok(self.actors.read().get(&user_id).cloned())
    }
}

/// Reads `users(id, name, email)`, owned by the surrounding platform.
#[derive(Clone)]
pub struct PgActorDirectory {
    pool: DatabasePool,
}

impl PgActorDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActorDirectory for PgActorDirectory {
    async fn resolve(&self, user_id: Uuid) -> Result<Option<Actor>> {
        let actor = sqlx::query_as::<_, Actor>("SELECT name, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.inner())
            .await?;
        Ok(actor)
    }
}
