use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::Identity;
use crate::session::actor::SessionHandle;
use crate::session::sync::ConflictPolicy;
use crate::store::ResumeStore;

/// How often the reaper looks for idle sessions.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Live sessions by id. Cloned into `AppState`; all clones share the map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the user and starts a session for them.
    pub async fn open(
        &self,
        store: Arc<dyn ResumeStore>,
        identity: Identity,
        policy: ConflictPolicy,
    ) -> Result<SessionHandle, AppError> {
        store.upsert_user(&identity).await?;
        let user_id = identity.user_id;
        let handle = SessionHandle::spawn(store, identity, policy);
        let open = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(handle.id(), handle.clone());
            sessions.len()
        };
        info!("Opened session {} for user {user_id} ({open} open)", handle.id());
        Ok(handle)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<SessionHandle, AppError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
        handle.touch();
        Ok(handle)
    }

    pub async fn close(&self, session_id: Uuid) -> Result<(), AppError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
        // Already gone is as good as closed.
        let _ = handle.shutdown().await;
        Ok(())
    }

    /// Closes every session that nobody is streaming and that has been idle
    /// for at least `max_idle`. Returns how many were closed.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|h| !h.has_listeners() && h.idle_for() >= max_idle)
                .map(SessionHandle::id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for handle in &idle {
            info!("Closing idle session {}", handle.id());
            let _ = handle.shutdown().await;
        }
        idle.len()
    }

    /// Runs `reap_idle` in the background for the life of the process.
    pub fn spawn_reaper(&self, max_idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = REAP_INTERVAL.min(max_idle).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let closed = registry.reap_idle(max_idle).await;
                if closed > 0 {
                    info!("Reaped {closed} idle session(s)");
                }
            }
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
