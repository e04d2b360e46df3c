use crate::error::EngineError;
use crate::runtime::{CompetitionRuntime, RuntimeServices};
use agents::Credentials;
use core_types::CompetitionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type SharedRuntime = Arc<Mutex<CompetitionRuntime>>;

/// Per-process cache of live runtimes, keyed by competition id.
///
/// A miss is never an error by itself: the runtime is rebuilt from the store.
/// Each registry owns a unique lease holder id, so two processes sharing a
/// database never run the same competition's cycle at once.
pub struct Registry {
    services: RuntimeServices,
    holder: String,
    runtimes: Mutex<HashMap<String, SharedRuntime>>,
}

impl Registry {
    pub fn new(services: RuntimeServices) -> Self {
        Self {
            services,
            holder: format!("arena-{}", Uuid::new_v4()),
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn len(&self) -> usize {
        self.runtimes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runtimes.lock().await.is_empty()
    }

    pub async fn create(&self, config: CompetitionConfig) -> Result<SharedRuntime, EngineError> {
        let runtime =
            CompetitionRuntime::create(config, self.services.clone(), self.holder.clone()).await?;
        let id = runtime.id().to_string();
        let shared = Arc::new(Mutex::new(runtime));
        self.runtimes.lock().await.insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    /// Warm lookup, or cold resume from the store followed by agent initialization.
    ///
    /// A cached runtime is only reused while it agrees with the stored row; another
    /// process sharing the store may have paused, completed or advanced it.
    pub async fn get_or_restore(
        &self,
        competition_id: &str,
        credentials: &Credentials,
    ) -> Result<SharedRuntime, EngineError> {
        let cached = self.runtimes.lock().await.get(competition_id).cloned();
        if let Some(runtime) = cached {
            match self.services.store.load_competition(competition_id).await? {
                None => {
                    self.evict(competition_id, &runtime).await;
                    return Err(EngineError::NotFound(competition_id.to_string()));
                }
                Some(stored) if runtime.lock().await.matches_stored(&stored) => {
                    tracing::debug!(competition_id, "Warm resume");
                    return Ok(runtime);
                }
                Some(stored) => {
                    tracing::info!(
                        competition_id,
                        status = %stored.status,
                        cycle_count = stored.cycle_count,
                        "Cached runtime is stale, reloading"
                    );
                    self.evict(competition_id, &runtime).await;
                }
            }
        }

        let mut runtime =
            CompetitionRuntime::restore(competition_id, self.services.clone(), self.holder.clone())
                .await?;
        if !runtime.initialize(credentials).await {
            tracing::debug!(
                competition_id,
                issues = runtime.issues().len(),
                "Restored with unusable agents"
            );
        }

        let mut runtimes = self.runtimes.lock().await;
        // A concurrent caller may have restored it while we were loading.
        let shared = runtimes
            .entry(competition_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(runtime)));
        Ok(Arc::clone(shared))
    }

    /// Removes `runtime` from the cache unless it was already replaced.
    async fn evict(&self, competition_id: &str, runtime: &SharedRuntime) {
        let mut runtimes = self.runtimes.lock().await;
        if runtimes.get(competition_id).is_some_and(|cached| Arc::ptr_eq(cached, runtime)) {
            runtimes.remove(competition_id);
        }
    }

    /// Drops the cached runtime and deletes the competition everywhere.
    pub async fn delete(&self, competition_id: &str) -> Result<bool, EngineError> {
        self.runtimes.lock().await.remove(competition_id);
        CompetitionRuntime::delete(&self.services, competition_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, services};
    use core_types::CompetitionStatus;

    #[tokio::test]
    async fn test_warm_lookup_returns_same_runtime() {
        let registry = Registry::new(services().await);
        let created = registry.create(config(&["alpha"])).await.unwrap();
        let id = created.lock().await.id().to_string();

        let found = registry.get_or_restore(&id, &Credentials::new()).await.unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_cold_resume_in_a_second_process() {
        let services = services().await;
        let first = Registry::new(services.clone());
        let runtime = first.create(config(&["alpha", "beta"])).await.unwrap();
        let id = {
            let mut guard = runtime.lock().await;
            guard.start(&Credentials::new()).await.unwrap();
            guard.run_cycle().await.unwrap();
            guard.id().to_string()
        };

        let second = Registry::new(services);
        assert_ne!(first.holder(), second.holder());
        let restored = second.get_or_restore(&id, &Credentials::new()).await.unwrap();
        let mut guard = restored.lock().await;
        assert!(guard.is_ready());
        assert_eq!(guard.competition().cycle_count, 1);
        assert_eq!(guard.run_cycle().await.unwrap().cycle_number, 2);
    }

    #[tokio::test]
    async fn test_pause_in_another_process_reaches_cached_runtime() {
        let services = services().await;
        let first = Registry::new(services.clone());
        let runtime = first.create(config(&["alpha", "beta"])).await.unwrap();
        let id = {
            let mut guard = runtime.lock().await;
            guard.start(&Credentials::new()).await.unwrap();
            guard.id().to_string()
        };

        let second = Registry::new(services.clone());
        let other = second.get_or_restore(&id, &Credentials::new()).await.unwrap();
        other.lock().await.stop().await.unwrap();

        // The stale copy cannot commit over the pause.
        let err = runtime.lock().await.run_cycle().await.err().unwrap();
        assert_eq!(err.kind(), "persistence_error");

        let reloaded = first.get_or_restore(&id, &Credentials::new()).await.unwrap();
        assert!(!Arc::ptr_eq(&runtime, &reloaded));
        let err = reloaded.lock().await.run_cycle().await.err().unwrap();
        assert_eq!(err.kind(), "invalid_transition");

        let stored = services.store.load_competition(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, CompetitionStatus::Paused);
        assert_eq!(stored.cycle_count, 0);
        assert_eq!(first.len().await, 1);
    }

    #[tokio::test]
    async fn test_cycle_in_another_process_reaches_cached_runtime() {
        let services = services().await;
        let first = Registry::new(services.clone());
        let runtime = first.create(config(&["alpha"])).await.unwrap();
        let id = {
            let mut guard = runtime.lock().await;
            guard.start(&Credentials::new()).await.unwrap();
            guard.id().to_string()
        };

        let second = Registry::new(services);
        let other = second.get_or_restore(&id, &Credentials::new()).await.unwrap();
        assert_eq!(other.lock().await.run_cycle().await.unwrap().cycle_number, 1);

        let reloaded = first.get_or_restore(&id, &Credentials::new()).await.unwrap();
        let mut guard = reloaded.lock().await;
        assert_eq!(guard.competition().cycle_count, 1);
        assert_eq!(guard.run_cycle().await.unwrap().cycle_number, 2);
    }

    #[tokio::test]
    async fn test_delete_then_lookup_is_not_found() {
        let registry = Registry::new(services().await);
        let runtime = registry.create(config(&["alpha"])).await.unwrap();
        let id = runtime.lock().await.id().to_string();

        assert!(registry.delete(&id).await.unwrap());
        assert!(!registry.delete(&id).await.unwrap());
        let err = registry.get_or_restore(&id, &Credentials::new()).await.err().unwrap();
        assert_eq!(err.kind(), "not_found");
        assert!(registry.is_empty().await);
    }
}
