//! Actor directory: resolves actor ids to an identity for audit attribution.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use cert_registry_core::ActorId;

/// A resolved actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: ActorId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Lookup of actors performing lifecycle operations.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Resolve an actor id, or `None` if it is unknown.
    async fn resolve(&self, id: &ActorId) -> Option<Actor>;
}

/// Directory backed by an in-process map.
#[derive(Default)]
pub struct StaticDirectory {
    actors: RwLock<HashMap<ActorId, Actor>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a fixed set of actors.
    pub fn with_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        Self {
            actors: RwLock::new(actors.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    /// Add or replace an actor.
    pub async fn insert(&self, actor: Actor) {
        self.actors.write().await.insert(actor.id, actor);
    }
}

#[async_trait]
impl ActorDirectory for StaticDirectory {
    async fn resolve(&self, id: &ActorId) -> Option<Actor> {
        self.actors.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_known_and_unknown() {
        let alice = Actor::new(ActorId::new(), "Alice Admin");
        let directory = StaticDirectory::with_actors([alice.clone()]);

        assert_eq!(directory.resolve(&alice.id).await, Some(alice));
        assert_eq!(directory.resolve(&ActorId::new()).await, None);

        let bob = Actor::new(ActorId::new(), "Bob");
        directory.insert(bob.clone()).await;
        assert_eq!(directory.resolve(&bob.id).await, Some(bob));
    }
}
