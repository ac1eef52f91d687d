use std::sync::Arc;

use agent_core::{Goal, Plan};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use page_driver::PageDriver;
use parking_lot::RwLock;
use tabpilot_core_types::OriginId;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    errors::RegistryError,
    model::{SessionConfig, TaskSession},
};

/// Session claimed for a new goal
pub struct Claim {
    pub session: Arc<RwLock<TaskSession>>,
    /// False when an idle or finished session was reused
    pub created: bool,
}

/// What one sweep pass took out of the registry
#[derive(Default)]
pub struct SweepReport {
    /// Page handles to hand back to the context provider
    pub released: Vec<(OriginId, Arc<dyn PageDriver>)>,
    pub evicted: Vec<OriginId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.evicted.is_empty()
    }
}

/// In-memory session store keyed by origin.
pub struct SessionRegistry {
    sessions: DashMap<OriginId, Arc<RwLock<TaskSession>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, origin: &OriginId) -> Option<Arc<RwLock<TaskSession>>> {
        self.sessions.get(origin).map(|entry| Arc::clone(entry.value()))
    }

    pub fn ensure(&self, origin: &OriginId) -> Result<Arc<RwLock<TaskSession>>, RegistryError> {
        self.get(origin)
            .ok_or_else(|| RegistryError::NotFound(origin.clone()))
    }

    /// Read a session under its lock
    pub fn with_session<R>(
        &self,
        origin: &OriginId,
        read: impl FnOnce(&TaskSession) -> R,
    ) -> Option<R> {
        let session = self.get(origin)?;
        let guard = session.read();
        Some(read(&guard))
    }

    pub fn is_running(&self, origin: &OriginId) -> bool {
        self.with_session(origin, TaskSession::is_running)
            .unwrap_or(false)
    }

    /// Start `goal` on the origin's session, creating it on first use, and
    /// attach `page` to it.
    ///
    /// The shard lock is held across the status check so two callers racing
    /// on one origin cannot both get a running session.
    pub fn claim(
        &self,
        origin: &OriginId,
        goal: Goal,
        plan: Plan,
        page: Arc<dyn PageDriver>,
    ) -> Result<Claim, RegistryError> {
        match self.sessions.entry(origin.clone()) {
            Entry::Occupied(entry) => {
                let session = Arc::clone(entry.get());
                {
                    let mut guard = session.write();
                    guard.start(goal, plan)?;
                    guard.page = Some(page);
                }
                debug!(origin = %origin, "session reused");
                Ok(Claim {
                    session,
                    created: false,
                })
            }
            Entry::Vacant(entry) => {
                let mut fresh = TaskSession::new(origin.clone());
                fresh.start(goal, plan)?;
                fresh.page = Some(page);
                let session = Arc::new(RwLock::new(fresh));
                entry.insert(Arc::clone(&session));
                info!(origin = %origin, "session created");
                Ok(Claim {
                    session,
                    created: true,
                })
            }
        }
    }

    pub fn remove(&self, origin: &OriginId) -> Option<Arc<RwLock<TaskSession>>> {
        self.sessions.remove(origin).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn origins(&self) -> Vec<OriginId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Release idle page handles and evict long-finished sessions
    pub fn sweep(&self, now: Instant, config: &SessionConfig) -> SweepReport {
        let mut report = SweepReport::default();
        let mut expired = Vec::new();

        for entry in self.sessions.iter() {
            let mut session = entry.value().write();
            if let Some(page) = session.take_idle_page(now, config.context_idle()) {
                report.released.push((entry.key().clone(), page));
            }
            if session.is_expired(now, config.session_idle()) {
                expired.push(entry.key().clone());
            }
        }

        for origin in expired {
            // re-checked under the shard lock; a goal may have arrived meanwhile
            let removed = self.sessions.remove_if(&origin, |_, session| {
                session.read().is_expired(now, config.session_idle())
            });
            if let Some((origin, session)) = removed {
                if let Some(page) = session.write().page.take() {
                    report.released.push((origin.clone(), page));
                }
                report.evicted.push(origin);
            }
        }

        if !report.is_empty() {
            info!(
                released = report.released.len(),
                evicted = report.evicted.len(),
                remaining = self.sessions.len(),
                "registry sweep"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{PlanSource, Step, TaskType};
    use page_driver::memory::{demo_site, InMemoryPage};
    use std::time::Duration;
    use tabpilot_core_types::TaskStatus;

    fn goal(text: &str) -> (Goal, Plan) {
        let plan = Plan::new(text, TaskType::Generic, PlanSource::Template)
            .with_steps(vec![Step::observe("page_loaded")]);
        (Goal::new(text, TaskType::Generic), plan)
    }

    fn claim(registry: &SessionRegistry, origin: &OriginId, text: &str) -> Result<Claim, RegistryError> {
        let (goal, plan) = goal(text);
        registry.claim(origin, goal, plan, page())
    }

    fn page() -> Arc<dyn PageDriver> {
        Arc::new(InMemoryPage::new(Arc::new(demo_site().unwrap())))
    }

    #[tokio::test]
    async fn second_claim_while_running_conflicts() {
        let registry = SessionRegistry::new();
        let origin = OriginId::new("tab-1");
        assert!(claim(&registry, &origin, "first").unwrap().created);

        let err = claim(&registry, &origin, "second").err().unwrap();
        assert_eq!(err.kind(), tabpilot_core_types::ErrorKind::SessionConflict);

        registry
            .ensure(&origin)
            .unwrap()
            .write()
            .finish(TaskStatus::Completed, None);
        let reused = claim(&registry, &origin, "second").unwrap();
        assert!(!reused.created);
        assert_eq!(reused.session.read().generation, 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn origins_are_independent() {
        let registry = SessionRegistry::new();
        claim(&registry, &OriginId::new("tab-1"), "a").unwrap();
        claim(&registry, &OriginId::new("tab-2"), "b").unwrap();
        assert!(registry.is_running(&OriginId::new("tab-1")));
        assert!(registry.is_running(&OriginId::new("tab-2")));
        assert!(!registry.is_running(&OriginId::new("tab-3")));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_releases_then_evicts() {
        let registry = SessionRegistry::new();
        let config = SessionConfig::default();
        let origin = OriginId::new("tab-1");
        let session = claim(&registry, &origin, "a").unwrap().session;
        assert!(session.read().page.is_some());

        tokio::time::advance(Duration::from_secs(120)).await;
        // running sessions keep everything
        assert!(registry.sweep(Instant::now(), &config).is_empty());

        session.write().finish(TaskStatus::Completed, None);
        tokio::time::advance(Duration::from_secs(61)).await;
        let report = registry.sweep(Instant::now(), &config);
        assert_eq!(report.released.len(), 1);
        assert!(report.evicted.is_empty());
        assert!(session.read().page.is_none());

        tokio::time::advance(Duration::from_secs(240)).await;
        let report = registry.sweep(Instant::now(), &config);
        assert_eq!(report.evicted, vec![origin.clone()]);
        assert!(registry.get(&origin).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_also_returns_a_held_page() {
        let registry = SessionRegistry::new();
        let config = SessionConfig {
            context_idle_secs: 600,
            ..SessionConfig::default()
        };
        let origin = OriginId::new("tab-1");
        let session = claim(&registry, &origin, "a").unwrap().session;
        {
            let mut guard = session.write();
            guard.finish(TaskStatus::Failed, None);
        }

        tokio::time::advance(Duration::from_secs(301)).await;
        let report = registry.sweep(Instant::now(), &config);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.released.len(), 1);
    }
}
