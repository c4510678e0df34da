//! Short-press / long-press detection for keys whose raw events are held
//! back from the OS.
//!
//! [`KeyDelayMachine`] is the timing logic on its own. [`KeyDelay`] drives one
//! on a worker thread so the hook only has to post the event and return.

use crate::keys::VirtualKey;
use crate::types::{KeyEdge, LONG_PRESS_DELAY};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDelayState {
    Released,
    OnHold { since: Instant },
    OnHoldTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDelayAction {
    ShortPress,
    LongPressDetected,
    LongPressReleased,
}

#[derive(Debug, Clone)]
pub struct KeyDelayMachine {
    state: KeyDelayState,
    threshold: Duration,
}

impl Default for KeyDelayMachine {
    fn default() -> Self {
        Self::new(LONG_PRESS_DELAY)
    }
}

impl KeyDelayMachine {
    pub fn new(threshold: Duration) -> Self {
        Self {
            state: KeyDelayState::Released,
            threshold,
        }
    }

    pub fn state(&self) -> KeyDelayState {
        self.state
    }

    /// When the long-press boundary elapses, if a press is being timed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            KeyDelayState::OnHold { since } => Some(since + self.threshold),
            _ => None,
        }
    }

    pub fn on_event(&mut self, edge: KeyEdge, now: Instant) -> Vec<KeyDelayAction> {
        match (self.state, edge) {
            (KeyDelayState::Released, KeyEdge::Down) => {
                self.state = KeyDelayState::OnHold { since: now };
                Vec::new()
            }
            // Auto-repeat.
            (_, KeyEdge::Down) => Vec::new(),
            (KeyDelayState::OnHold { since }, KeyEdge::Up) => {
                self.state = KeyDelayState::Released;
                if now.saturating_duration_since(since) >= self.threshold {
                    // The boundary passed but nobody polled the deadline.
                    vec![
                        KeyDelayAction::LongPressDetected,
                        KeyDelayAction::LongPressReleased,
                    ]
                } else {
                    vec![KeyDelayAction::ShortPress]
                }
            }
            (KeyDelayState::OnHoldTimeout, KeyEdge::Up) => {
                self.state = KeyDelayState::Released;
                vec![KeyDelayAction::LongPressReleased]
            }
            (KeyDelayState::Released, KeyEdge::Up) => Vec::new(),
        }
    }

    /// Fires the long press at most once per hold.
    pub fn on_deadline(&mut self, now: Instant) -> Option<KeyDelayAction> {
        match self.state {
            KeyDelayState::OnHold { since } if now.saturating_duration_since(since) >= self.threshold => {
                self.state = KeyDelayState::OnHoldTimeout;
                Some(KeyDelayAction::LongPressDetected)
            }
            _ => None,
        }
    }
}

pub type KeyDelayCallback = Arc<dyn Fn(VirtualKey) + Send + Sync>;

#[derive(Clone)]
pub struct KeyDelayCallbacks {
    pub on_short_press: KeyDelayCallback,
    pub on_long_press_detected: KeyDelayCallback,
    pub on_long_press_released: KeyDelayCallback,
}

impl KeyDelayCallbacks {
    pub fn new(
        on_short_press: impl Fn(VirtualKey) + Send + Sync + 'static,
        on_long_press_detected: impl Fn(VirtualKey) + Send + Sync + 'static,
        on_long_press_released: impl Fn(VirtualKey) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_short_press: Arc::new(on_short_press),
            on_long_press_detected: Arc::new(on_long_press_detected),
            on_long_press_released: Arc::new(on_long_press_released),
        }
    }

    fn invoke(&self, action: KeyDelayAction, key: VirtualKey) {
        trace!(?key, ?action, "key delay callback");
        match action {
            KeyDelayAction::ShortPress => (self.on_short_press)(key),
            KeyDelayAction::LongPressDetected => (self.on_long_press_detected)(key),
            KeyDelayAction::LongPressReleased => (self.on_long_press_released)(key),
        }
    }
}

enum Message {
    Key(KeyEdge, Instant),
    Quit,
}

/// One registered key. Events are posted without blocking; callbacks run on
/// the worker thread.
pub struct KeyDelay {
    key: VirtualKey,
    sender: Sender<Message>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl KeyDelay {
    pub fn new(key: VirtualKey, callbacks: KeyDelayCallbacks) -> std::io::Result<Self> {
        Self::with_threshold(key, callbacks, LONG_PRESS_DELAY)
    }

    pub fn with_threshold(
        key: VirtualKey,
        callbacks: KeyDelayCallbacks,
        threshold: Duration,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded();
        let worker = thread::Builder::new()
            .name(format!("key-delay-{:#04x}", key.code()))
            .spawn(move || {
                let mut machine = KeyDelayMachine::new(threshold);
                loop {
                    let message = match machine.deadline() {
                        Some(deadline) => receiver.recv_deadline(deadline),
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match message {
                        Ok(Message::Key(edge, at)) => {
                            for action in machine.on_event(edge, at) {
                                callbacks.invoke(action, key);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(action) = machine.on_deadline(Instant::now()) {
                                callbacks.invoke(action, key);
                            }
                        }
                        Ok(Message::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(?key, "key delay worker stopped");
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            key,
            sender,
            worker: Some(worker),
            worker_id,
        })
    }

    pub fn key(&self) -> VirtualKey {
        self.key
    }

    pub fn key_event(&self, edge: KeyEdge) {
        if self.sender.send(Message::Key(edge, Instant::now())).is_err() {
            warn!(key = ?self.key, "key delay worker is gone");
        }
    }
}

impl Drop for KeyDelay {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Quit);
        if let Some(worker) = self.worker.take() {
            // A callback may unregister its own key; the worker then exits on its own.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}
