//! Hotkey rebinding
//!
//! Owns the active [`ListenerHandle`] behind a mutex that is held only across
//! the stop/start transition, never across trigger dispatches.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use super::keys::HotkeyBinding;
use super::listener::{HotkeyError, HotkeyListener, ListenerHandle, TriggerCallback};

pub struct HotkeyBinder {
    listener: HotkeyListener,
    on_trigger: TriggerCallback,
    active: Mutex<Option<ListenerHandle>>,
}

impl HotkeyBinder {
    pub fn new(listener: HotkeyListener, on_trigger: TriggerCallback) -> Self {
        Self {
            listener,
            on_trigger,
            active: Mutex::new(None),
        }
    }

    /// Swap the active binding for `binding`
    ///
    /// The binding is parsed before anything is touched; the old handle is
    /// fully stopped before the new one starts. If the new binding cannot be
    /// registered the previous one is put back and the error returned.
    pub fn rebind(&self, binding: &str) -> Result<HotkeyBinding, HotkeyError> {
        let binding: HotkeyBinding = binding.parse()?;

        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        let previous = active.take().map(|handle| {
            let old = handle.binding().clone();
            self.listener.stop(handle);
            old
        });

        match self.listener.start(binding.clone(), Arc::clone(&self.on_trigger)) {
            Ok(handle) => {
                *active = Some(handle);
                info!(%binding, previous = ?previous.as_ref().map(|b| b.to_string()), "hotkey bound");
                Ok(binding)
            }
            Err(e) => {
                warn!(%binding, ?e, "failed to bind hotkey");
                if let Some(old) = previous {
                    match self.listener.start(old.clone(), Arc::clone(&self.on_trigger)) {
                        Ok(handle) => {
                            *active = Some(handle);
                            info!(binding = %old, "previous hotkey restored");
                        }
                        Err(restore_err) => {
                            error!(binding = %old, ?restore_err, "failed to restore previous hotkey");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Currently bound key combination
    pub fn current(&self) -> Option<HotkeyBinding> {
        self.active
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|handle| handle.binding().clone())
    }

    /// Stop listening altogether
    pub fn unbind(&self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = active.take() {
            self.listener.stop(handle);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.listener.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::hotkey::keys::Key;
    use crate::hotkey::listener::testing::{counter, DeniedSource, ManualSource};

    fn binder() -> (Arc<ManualSource>, HotkeyBinder, Arc<std::sync::atomic::AtomicUsize>) {
        let source = Arc::new(ManualSource::default());
        let (count, callback) = counter();
        let binder = HotkeyBinder::new(HotkeyListener::new(source.clone()), callback);
        (source, binder, count)
    }

    #[test]
    fn test_rebind_swaps_keys() {
        let (source, binder, count) = binder();
        binder.rebind("rshift").unwrap();
        binder.rebind("alt+z").unwrap();

        source.tap(&[Key::ShiftRight]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        source.tap(&[Key::AltLeft, Key::Char('z')]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(binder.current().unwrap().to_string(), "alt+z");
    }

    #[test]
    fn test_invalid_rebind_keeps_previous() {
        let (source, binder, count) = binder();
        binder.rebind("ctrl+alt+x").unwrap();

        let err = binder.rebind("ctrl+nonsense").unwrap_err();
        assert!(matches!(err, HotkeyError::InvalidBinding { .. }));

        source.tap(&[Key::ControlLeft, Key::AltLeft, Key::Char('x')]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(binder.current().unwrap().to_string(), "ctrl+alt+x");
    }

    #[test]
    fn test_unbind_stops_dispatch() {
        let (source, binder, count) = binder();
        binder.rebind("rshift").unwrap();
        binder.unbind();

        source.tap(&[Key::ShiftRight]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!binder.is_bound());
        assert!(binder.current().is_none());
    }

    #[test]
    fn test_initial_bind_failure_surfaces() {
        let (_, callback) = counter();
        let binder = HotkeyBinder::new(HotkeyListener::new(Arc::new(DeniedSource)), callback);

        let err = binder.rebind("rshift").unwrap_err();
        assert!(matches!(err, HotkeyError::BindingUnavailable(_)));
        assert!(!binder.is_bound());
    }
}
