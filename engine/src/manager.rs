//! Project Queue Manager (§4.1): owns one [`ProjectLock`] per live project, driving each
//! project's run loop on its own spawned task so projects never block one another.

use std::sync::Arc;

use dashmap::DashMap;

use crate::action::Action;
use crate::run_loop;
use crate::task_lock::ProjectLock;

pub struct ProjectQueueManager {
    locks: DashMap<String, Arc<ProjectLock>>,
    deps: run_loop::RunLoopDeps,
}

impl ProjectQueueManager {
    pub fn new(deps: run_loop::RunLoopDeps) -> Arc<Self> {
        Arc::new(Self {
            locks: DashMap::new(),
            deps,
        })
    }

    /// Returns the lock for `project_id`, spawning its run loop the first time it's seen.
    pub fn get_or_create(self: &Arc<Self>, project_id: &str) -> Arc<ProjectLock> {
        if let Some(existing) = self.locks.get(project_id) {
            return existing.value().clone();
        }
        let lock = ProjectLock::new(project_id);
        self.locks.insert(project_id.to_string(), lock.clone());
        let manager = self.clone();
        let spawned_lock = lock.clone();
        tokio::spawn(async move {
            run_loop::drive(spawned_lock, manager.deps.clone()).await;
        });
        lock
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<ProjectLock>> {
        self.locks.get(project_id).map(|l| l.value().clone())
    }

    /// Removes a project's lock once its run loop has terminated (empty queue, idle state).
    /// The run loop itself calls back into this when it exits, not callers.
    pub fn remove(&self, project_id: &str) {
        self.locks.remove(project_id);
    }

    /// Enqueues `action` on its project's lock, creating the lock (and run loop) if needed.
    pub fn enqueue(self: &Arc<Self>, action: Action) {
        let lock = self.get_or_create(action.project_id());
        lock.put(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_existing_lock() {
        let manager = ProjectQueueManager::new(run_loop::RunLoopDeps::for_test());
        let a = manager.get_or_create("p1");
        let b = manager.get_or_create("p1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn remove_drops_the_lock() {
        let manager = ProjectQueueManager::new(run_loop::RunLoopDeps::for_test());
        manager.get_or_create("p1");
        manager.remove("p1");
        assert!(manager.get("p1").is_none());
    }
}
