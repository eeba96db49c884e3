//! Admission of triggers against the single shared clipboard

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::OverlapPolicy;

/// Held for the lifetime of an admitted run
#[derive(Debug)]
pub struct RunPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

#[derive(Debug, Clone)]
pub struct RunGate {
    semaphore: Arc<Semaphore>,
}

impl RunGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Admit a run under `policy`; `None` means the trigger is dropped
    pub async fn admit(&self, policy: OverlapPolicy) -> Option<RunPermit> {
        let permit = match policy {
            OverlapPolicy::Drop => Some(Arc::clone(&self.semaphore).try_acquire_owned().ok()?),
            OverlapPolicy::Queue => Some(Arc::clone(&self.semaphore).acquire_owned().await.ok()?),
            OverlapPolicy::Allow => None,
        };
        Some(RunPermit { _permit: permit })
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_rejects_while_held() {
        let gate = RunGate::new();
        let first = gate.admit(OverlapPolicy::Drop).await;
        assert!(first.is_some());
        assert!(gate.admit(OverlapPolicy::Drop).await.is_none());

        drop(first);
        assert!(gate.admit(OverlapPolicy::Drop).await.is_some());
    }

    #[tokio::test]
    async fn test_allow_ignores_gate() {
        let gate = RunGate::new();
        let _held = gate.admit(OverlapPolicy::Drop).await.unwrap();
        assert!(gate.admit(OverlapPolicy::Allow).await.is_some());
    }

    #[tokio::test]
    async fn test_queue_waits_for_release() {
        let gate = RunGate::new();
        let held = gate.admit(OverlapPolicy::Drop).await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit(OverlapPolicy::Queue).await.is_some() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }
}
