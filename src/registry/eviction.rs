//! Background sweep that evicts idle registrations.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ListenerRegistry;

/// Periodically calls [`ListenerRegistry::evict_idle`].
///
/// Holds only a [`Weak`] reference, so the task ends on its own once the
/// last strong reference to the registry is dropped.
#[derive(Debug)]
pub struct EvictionTask {
    registry: Weak<ListenerRegistry>,
    interval: Duration,
}

impl EvictionTask {
    /// Creates a sweep over `registry` running every `interval`.
    #[must_use]
    pub const fn new(registry: Weak<ListenerRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Convenience for `EvictionTask::new(Arc::downgrade(registry), interval)`.
    #[must_use]
    pub fn for_registry(registry: &Arc<ListenerRegistry>, interval: Duration) -> Self {
        Self::new(Arc::downgrade(registry), interval)
    }

    /// Spawns the sweep on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = self.registry.upgrade() else {
                    tracing::debug!("registry dropped, eviction task exiting");
                    break;
                };
                let evicted = registry.evict_idle().await;
                if !evicted.is_empty() {
                    tracing::info!(count = evicted.len(), "eviction sweep removed idle users");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::WaitingTimes;
    use crate::domain::{Domain, UserId};

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_idle_user() {
        let Ok(times) = WaitingTimes::from_millis(0, 100, 200) else {
            panic!("valid waiting times");
        };
        let registry = Arc::new(ListenerRegistry::new(times));
        let user = UserId::from("sleepy");
        registry
            .register_listener(&user, &Domain::new("evict_task"), None)
            .await;

        let handle = EvictionTask::for_registry(&registry, Duration::from_millis(50)).spawn();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!registry.is_registered(&user).await);

        drop(registry);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
