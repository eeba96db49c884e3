//! Global hotkey listener
//!
//! The OS input hook is installed once per process on a dedicated thread and
//! feeds every key transition through [`dispatch`]. A single mutex-guarded
//! slot holds the active subscription; dispatch runs while holding that
//! lock, so once [`HotkeyListener::stop`] returns no delivery is in flight
//! and none will follow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::keys::{ChordTracker, HotkeyBinding, KeyEvent};

/// Receives raw key transitions on the hook thread
pub type KeySink = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// Invoked on every matching release. Must return immediately: it runs on
/// the hook thread with the subscription slot locked.
pub type TriggerCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of raw key transitions from the OS input subsystem
pub trait KeyEventSource: Send + Sync {
    /// Install the global input hook on its own thread and deliver every
    /// key transition to `sink` from there. Returns once the hook is known
    /// to be live, or with `BindingUnavailable` if it could not be installed.
    fn install(&self, sink: KeySink) -> Result<(), HotkeyError>;
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("invalid hotkey binding '{binding}': {reason}")]
    InvalidBinding { binding: String, reason: String },

    #[error("hotkey cannot be registered: {0}")]
    BindingUnavailable(String),

    #[error("another hotkey subscription is already active")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Proof of an active subscription, consumed by [`HotkeyListener::stop`]
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    binding: HotkeyBinding,
}

impl ListenerHandle {
    pub fn binding(&self) -> &HotkeyBinding {
        &self.binding
    }
}

struct Subscription {
    id: u64,
    tracker: ChordTracker,
    on_release: TriggerCallback,
}

type Slot = Arc<Mutex<Option<Subscription>>>;

/// Global hotkey listener that dispatches binding releases
pub struct HotkeyListener {
    source: Arc<dyn KeyEventSource>,
    slot: Slot,
    hook_installed: Mutex<bool>,
    next_id: AtomicU64,
}

impl HotkeyListener {
    /// Create a listener over the given hook source; nothing is installed
    /// until the first `start`
    pub fn new(source: Arc<dyn KeyEventSource>) -> Self {
        Self {
            source,
            slot: Arc::new(Mutex::new(None)),
            hook_installed: Mutex::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Begin dispatching releases of `binding` to `on_release`
    pub fn start(
        &self,
        binding: HotkeyBinding,
        on_release: TriggerCallback,
    ) -> Result<ListenerHandle, HotkeyError> {
        self.ensure_hook()?;

        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(HotkeyError::AlreadyRunning);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *slot = Some(Subscription {
            id,
            tracker: ChordTracker::new(binding.clone()),
            on_release,
        });

        info!(%binding, "hotkey registered");
        Ok(ListenerHandle { id, binding })
    }

    /// Unregister the subscription behind `handle`
    pub fn stop(&self, handle: ListenerHandle) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|sub| sub.id == handle.id) {
            *slot = None;
            info!(binding = %handle.binding, "hotkey unregistered");
        } else {
            debug!(binding = %handle.binding, "stale hotkey handle ignored");
        }
    }

    /// Check if a subscription is currently active
    pub fn is_running(&self) -> bool {
        lock(&self.slot).is_some()
    }

    fn ensure_hook(&self) -> Result<(), HotkeyError> {
        let mut installed = lock(&self.hook_installed);
        if *installed {
            return Ok(());
        }

        let slot = Arc::clone(&self.slot);
        self.source
            .install(Arc::new(move |event| dispatch(&slot, event)))?;

        *installed = true;
        info!("global input hook installed");
        Ok(())
    }
}

/// Route one key transition to the active subscription, if any
fn dispatch(slot: &Mutex<Option<Subscription>>, event: KeyEvent) {
    let mut slot = lock(slot);
    if let Some(sub) = slot.as_mut() {
        if sub.tracker.handle(event) {
            debug!(binding = %sub.tracker.binding(), "hotkey released");
            (sub.on_release)();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}


#[cfg(test)]
mod tests {
    use super::testing::{counter, DeniedSource, ManualSource};
    use super::*;
    use crate::hotkey::keys::Key;

    #[test]
    fn test_listener_creation() {
        let listener = HotkeyListener::new(Arc::new(ManualSource::default()));
        assert!(!listener.is_running());
    }

    #[test]
    fn test_release_dispatches_callback() {
        let source = Arc::new(ManualSource::default());
        let listener = HotkeyListener::new(source.clone());
        let (count, callback) = counter();

        let _handle = listener.start("rshift".parse().unwrap(), callback).unwrap();
        source.tap(&[Key::ShiftRight]);
        source.tap(&[Key::ShiftRight]);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_dispatch_after_stop() {
        let source = Arc::new(ManualSource::default());
        let listener = HotkeyListener::new(source.clone());
        let (count, callback) = counter();

        let handle = listener.start("alt+z".parse().unwrap(), callback).unwrap();
        listener.stop(handle);
        source.tap(&[Key::AltLeft, Key::Char('z')]);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!listener.is_running());
    }

    #[test]
    fn test_second_subscription_rejected() {
        let source = Arc::new(ManualSource::default());
        let listener = HotkeyListener::new(source.clone());
        let (_, callback) = counter();

        let _handle = listener.start("rshift".parse().unwrap(), callback.clone()).unwrap();
        let err = listener.start("alt+z".parse().unwrap(), callback).unwrap_err();
        assert!(matches!(err, HotkeyError::AlreadyRunning));
    }

    #[test]
    fn test_hook_installed_once() {
        let source = Arc::new(ManualSource::default());
        let listener = HotkeyListener::new(source.clone());
        let (_, callback) = counter();

        let handle = listener.start("rshift".parse().unwrap(), callback.clone()).unwrap();
        listener.stop(handle);
        let _handle = listener.start("rshift".parse().unwrap(), callback).unwrap();

        assert_eq!(source.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_denied_hook_is_binding_unavailable() {
        let listener = HotkeyListener::new(Arc::new(DeniedSource));
        let (_, callback) = counter();

        let err = listener.start("rshift".parse().unwrap(), callback).unwrap_err();
        assert!(matches!(err, HotkeyError::BindingUnavailable(_)));
        assert!(!listener.is_running());
    }
}
