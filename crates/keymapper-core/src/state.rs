//! Shared state between the hook thread and the editor UI.
//!
//! Every field has its own lock and every accessor takes exactly one of them.
//! No accessor calls another locked accessor while holding its lock, so lock
//! order never matters. Bulk table updates go through
//! [`RemapState::with_remappings_disabled`], which makes the hook pass events
//! through untouched until the update is done.

use crate::input::Input;
use crate::key_delay::{KeyDelay, KeyDelayCallbacks};
use crate::keys::VirtualKey;
use crate::remap_table::{AppSpecificShortcutRemapTable, ShortcutRemapTable, SingleKeyRemapTable};
use crate::shortcut::Shortcut;
use crate::types::{KeyEvent, RemapTarget, WindowHandle, DEFAULT_CONFIGURATION};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Which editor or detection window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UiState {
    #[default]
    Deactivated,
    /// Picking a single key in the remap-keys editor.
    DetectSingleKeyRemapWindowActivated,
    /// Picking a shortcut target in the remap-keys editor.
    DetectShortcutWindowInEditKeyboardWindowActivated,
    EditKeyboardWindowActivated,
    /// Picking a shortcut in the shortcuts editor.
    DetectShortcutWindowActivated,
    EditShortcutsWindowActivated,
}

/// Notifications for the editor UI. Sent with `try_send`, so a slow UI loses
/// updates rather than stalling the hook; the buffers stay authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DetectedKeyChanged(VirtualKey),
    DetectedShortcutChanged(Shortcut),
}

pub struct RemapState {
    ui_state: Mutex<UiState>,
    current_ui_window: Mutex<WindowHandle>,
    /// Keys currently held in the detection window.
    detected_shortcut: Mutex<Shortcut>,
    /// What the detection window displays: the chord as of the last key-down.
    current_shortcut: Mutex<Shortcut>,
    detected_remap_key: Mutex<VirtualKey>,
    current_config: Mutex<String>,
    key_delays: Mutex<BTreeMap<VirtualKey, KeyDelay>>,
    activated_app: Mutex<Option<String>>,
    ui_events: Mutex<Option<Sender<UiEvent>>>,
    remappings_enabled: AtomicBool,
    single_key: RwLock<SingleKeyRemapTable>,
    os_level: Mutex<ShortcutRemapTable>,
    app_specific: Mutex<AppSpecificShortcutRemapTable>,
}

impl Default for RemapState {
    fn default() -> Self {
        Self::new()
    }
}

impl RemapState {
    pub fn new() -> Self {
        Self {
            ui_state: Mutex::new(UiState::Deactivated),
            current_ui_window: Mutex::new(WindowHandle::NULL),
            detected_shortcut: Mutex::new(Shortcut::new()),
            current_shortcut: Mutex::new(Shortcut::new()),
            detected_remap_key: Mutex::new(VirtualKey::NONE),
            current_config: Mutex::new(DEFAULT_CONFIGURATION.to_string()),
            key_delays: Mutex::new(BTreeMap::new()),
            activated_app: Mutex::new(None),
            ui_events: Mutex::new(None),
            remappings_enabled: AtomicBool::new(true),
            single_key: RwLock::new(SingleKeyRemapTable::new()),
            os_level: Mutex::new(ShortcutRemapTable::new()),
            app_specific: Mutex::new(AppSpecificShortcutRemapTable::new()),
        }
    }

    // ---- UI interaction state ----

    pub fn set_ui_state(&self, state: UiState, window: WindowHandle) {
        debug!(?state, "ui state changed");
        *self.ui_state.lock() = state;
        *self.current_ui_window.lock() = window;
    }

    /// Back to [`UiState::Deactivated`], with the detection buffers emptied.
    pub fn reset_ui_state(&self) {
        self.set_ui_state(UiState::Deactivated, WindowHandle::NULL);
        self.detected_shortcut.lock().reset();
        self.current_shortcut.lock().reset();
        *self.detected_remap_key.lock() = VirtualKey::NONE;
    }

    pub fn ui_state(&self) -> UiState {
        *self.ui_state.lock()
    }

    /// True when `state` is active and its window has focus. Asking for an
    /// editor state also matches a detection window the editor opened, focused
    /// or not, except the shortcut detection window of the keyboard editor.
    pub fn check_ui_state(&self, state: UiState, input: &dyn Input) -> bool {
        let current = *self.ui_state.lock();
        if current == state {
            let window = *self.current_ui_window.lock();
            return window == input.get_foreground_window();
        }
        match state {
            // The keyboard editor's shortcut detection window has its own stage.
            UiState::EditKeyboardWindowActivated => {
                current == UiState::DetectSingleKeyRemapWindowActivated
            }
            UiState::EditShortcutsWindowActivated => {
                current == UiState::DetectShortcutWindowActivated
            }
            _ => false,
        }
    }

    /// Returns a receiver for detection updates, replacing any earlier one.
    pub fn subscribe_ui_events(&self, capacity: usize) -> Receiver<UiEvent> {
        let (sender, receiver) = bounded(capacity);
        *self.ui_events.lock() = Some(sender);
        receiver
    }

    fn notify_ui(&self, event: UiEvent) {
        let guard = self.ui_events.lock();
        if let Some(sender) = guard.as_ref() {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("ui event dropped, receiver is behind"),
                Err(TrySendError::Disconnected(_)) => trace!("ui event receiver is gone"),
            }
        }
    }

    // ---- detection buffers ----

    pub fn select_detected_remap_key(&self, key: VirtualKey) {
        *self.detected_remap_key.lock() = key;
        self.notify_ui(UiEvent::DetectedKeyChanged(key));
    }

    pub fn get_detected_single_remap_key(&self) -> VirtualKey {
        *self.detected_remap_key.lock()
    }

    /// Adds a key to the detected shortcut. The displayed shortcut follows
    /// when the detected one actually changed.
    pub fn select_detected_shortcut(&self, key: VirtualKey) {
        let changed = {
            let mut detected = self.detected_shortcut.lock();
            match detected.set_key(key) {
                Ok(true) => Some(*detected),
                Ok(false) => None,
                Err(err) => {
                    trace!(%err, "key not added to detected shortcut");
                    None
                }
            }
        };
        if let Some(shortcut) = changed {
            *self.current_shortcut.lock() = shortcut;
            self.notify_ui(UiEvent::DetectedShortcutChanged(shortcut));
        }
    }

    pub fn reset_detected_shortcut_key(&self, key: VirtualKey) {
        self.detected_shortcut.lock().reset_key(key);
    }

    /// The shortcut the detection window should display.
    pub fn get_detected_shortcut(&self) -> Shortcut {
        *self.current_shortcut.lock()
    }

    // ---- key delays ----

    /// # Panics
    ///
    /// Panics if `key` is already registered.
    pub fn register_key_delay(
        &self,
        key: VirtualKey,
        callbacks: KeyDelayCallbacks,
    ) -> std::io::Result<()> {
        let mut delays = self.key_delays.lock();
        if delays.contains_key(&key) {
            panic!("key delay for {} is already registered", key);
        }
        delays.insert(key, KeyDelay::new(key, callbacks)?);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `key` was never registered.
    pub fn unregister_key_delay(&self, key: VirtualKey) {
        let removed = self.key_delays.lock().remove(&key);
        match removed {
            // Dropped outside the lock: the worker's callbacks may take it.
            Some(delay) => drop(delay),
            None => panic!("key delay for {} is not registered", key),
        }
    }

    pub fn clear_registered_key_delays(&self) {
        let delays = std::mem::take(&mut *self.key_delays.lock());
        drop(delays);
    }

    /// Forwards the event to the key's delay worker. Returns `false` when the
    /// key has no registration.
    pub fn handle_key_delay_event(&self, event: &KeyEvent) -> bool {
        let delays = self.key_delays.lock();
        match delays.get(&event.vk) {
            Some(delay) => {
                delay.key_event(event.edge);
                true
            }
            None => false,
        }
    }

    // ---- configuration name ----

    pub fn set_current_config_name(&self, name: &str) {
        *self.current_config.lock() = name.to_string();
    }

    pub fn get_current_config_name(&self) -> String {
        self.current_config.lock().clone()
    }

    // ---- activated app ----

    /// Records the app whose shortcut remap is held, so its release is handled
    /// against the same table after a focus change.
    pub fn set_activated_app(&self, app: Option<String>) {
        *self.activated_app.lock() = app;
    }

    pub fn get_activated_app(&self) -> Option<String> {
        self.activated_app.lock().clone()
    }

    // ---- enable flag ----

    pub fn are_remappings_enabled(&self) -> bool {
        self.remappings_enabled.load(Ordering::Acquire)
    }

    pub fn set_remappings_enabled(&self, enabled: bool) {
        self.remappings_enabled.store(enabled, Ordering::Release);
    }

    /// Disables remapping until the guard drops, then restores the previous value.
    pub fn disable_remappings(&self) -> RemappingsDisabledGuard<'_> {
        let previous = self.remappings_enabled.swap(false, Ordering::AcqRel);
        RemappingsDisabledGuard {
            state: self,
            previous,
        }
    }

    pub fn with_remappings_disabled<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.disable_remappings();
        f()
    }

    // ---- single-key table ----

    /// Returns `true` when `original` had no remap before.
    pub fn add_single_key_remap(&self, original: VirtualKey, target: RemapTarget) -> bool {
        self.single_key.write().insert(original, target).is_none()
    }

    pub fn clear_single_key_remaps(&self) {
        self.single_key.write().clear();
    }

    pub fn get_single_key_remap(&self, original: VirtualKey) -> Option<RemapTarget> {
        self.single_key.read().get(&original).copied()
    }

    pub fn single_key_remaps(&self) -> SingleKeyRemapTable {
        self.single_key.read().clone()
    }

    // ---- shortcut tables ----

    pub fn add_os_level_shortcut(&self, original: Shortcut, target: RemapTarget) -> bool {
        self.os_level.lock().insert(original, target)
    }

    pub fn add_app_specific_shortcut(
        &self,
        app: &str,
        original: Shortcut,
        target: RemapTarget,
    ) -> bool {
        self.app_specific
            .lock()
            .entry(app.to_lowercase())
            .or_default()
            .insert(original, target)
    }

    pub fn clear_os_level_shortcuts(&self) {
        self.os_level.lock().clear();
    }

    /// Also forgets the activated app: its held remap went with the table.
    pub fn clear_app_specific_shortcuts(&self) {
        self.app_specific.lock().clear();
        self.set_activated_app(None);
    }

    /// Runs `f` on the OS-level table, or on `app`'s table (created if absent).
    pub fn with_shortcut_remap_table<R>(
        &self,
        app: Option<&str>,
        f: impl FnOnce(&mut ShortcutRemapTable) -> R,
    ) -> R {
        match app {
            None => f(&mut self.os_level.lock()),
            Some(app) => {
                let mut tables = self.app_specific.lock();
                f(tables.entry(app.to_lowercase()).or_default())
            }
        }
    }

    pub fn get_shortcut_remap_table(&self, app: Option<&str>) -> ShortcutRemapTable {
        self.with_shortcut_remap_table(app, |table| table.clone())
    }

    pub fn get_sorted_shortcut_remap_vector(&self, app: Option<&str>) -> Vec<Shortcut> {
        self.with_shortcut_remap_table(app, |table| table.sorted().to_vec())
    }

    /// Whether any shortcut of the table is currently held. Never creates a table.
    pub fn check_shortcut_remap_invoked(&self, app: Option<&str>) -> bool {
        match app {
            None => self.os_level.lock().is_any_invoked(),
            Some(app) => self
                .app_specific
                .lock()
                .get(&app.to_lowercase())
                .is_some_and(ShortcutRemapTable::is_any_invoked),
        }
    }

    pub fn has_app_specific_table(&self, app: &str) -> bool {
        self.app_specific.lock().contains_key(&app.to_lowercase())
    }

    pub fn app_specific_shortcut_remaps(&self) -> AppSpecificShortcutRemapTable {
        self.app_specific.lock().clone()
    }
}

pub struct RemappingsDisabledGuard<'a> {
    state: &'a RemapState,
    previous: bool,
}

impl Drop for RemappingsDisabledGuard<'_> {
    fn drop(&mut self) {
        self.state.set_remappings_enabled(self.previous);
    }
}
