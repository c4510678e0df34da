use crate::keys::{ModifierFamily, ModifierSide, VirtualKey};
use crate::pipeline;
use crate::state::RemapState;
use crate::types::{HookDecision, KeyEvent, KeyInput, WindowHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Everything the engine needs from the OS.
pub trait Input: Send + Sync {
    /// Synthesizes key events. They come back through the hook later.
    fn send_virtual_input(&self, inputs: &[KeyInput]);

    /// Whether the key is currently held. Common modifier codes report
    /// either side.
    fn get_virtual_key_state(&self, vk: VirtualKey) -> bool;

    /// Image file name of the process owning the foreground window, lowercased.
    fn get_foreground_process(&self) -> Option<String>;

    fn get_foreground_window(&self) -> WindowHandle;
}

/// In-memory OS used by tests and benches.
///
/// Sent input is queued and replayed through the pipeline after the current
/// event, the way the OS hands synthesized input back to the hook. Events
/// the pipeline lets through update the key state and are recorded.
pub struct MockInput {
    key_state: Mutex<[bool; 256]>,
    pending: Mutex<VecDeque<KeyInput>>,
    delivered: Mutex<Vec<KeyEvent>>,
    sent: Mutex<usize>,
    foreground_process: Mutex<Option<String>>,
    foreground_window: Mutex<WindowHandle>,
}

impl Default for MockInput {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInput {
    pub fn new() -> Self {
        Self {
            key_state: Mutex::new([false; 256]),
            pending: Mutex::new(VecDeque::new()),
            delivered: Mutex::new(Vec::new()),
            sent: Mutex::new(0),
            foreground_process: Mutex::new(None),
            foreground_window: Mutex::new(WindowHandle::NULL),
        }
    }

    /// Sending a common modifier presses its left key, like the OS does.
    fn physical_slot(vk: VirtualKey) -> Option<usize> {
        let vk = match ModifierFamily::classify(vk) {
            Some((family, ModifierSide::Common)) => family.left(),
            _ => vk,
        };
        let code = vk.code() as usize;
        (code < 256).then_some(code)
    }

    pub fn set_key_state(&self, vk: VirtualKey, down: bool) {
        if let Some(slot) = Self::physical_slot(vk) {
            self.key_state.lock()[slot] = down;
        }
    }

    pub fn set_foreground_process(&self, name: Option<&str>) {
        *self.foreground_process.lock() = name.map(str::to_string);
    }

    pub fn set_foreground_window(&self, hwnd: WindowHandle) {
        *self.foreground_window.lock() = hwnd;
    }

    /// Runs a hardware event through the pipeline, then every event it
    /// synthesized, until nothing is left queued.
    pub fn feed(&self, state: &RemapState, event: KeyEvent) -> HookDecision {
        let decision = self.dispatch(state, event);
        loop {
            // Pop under a short lock; the pipeline may queue more.
            let next = self.pending.lock().pop_front();
            match next {
                Some(input) => {
                    self.dispatch(state, input.into());
                }
                None => break,
            }
        }
        decision
    }

    pub fn press(&self, state: &RemapState, vk: VirtualKey) -> HookDecision {
        self.feed(state, KeyEvent::down(vk))
    }

    pub fn release(&self, state: &RemapState, vk: VirtualKey) -> HookDecision {
        self.feed(state, KeyEvent::up(vk))
    }

    /// Presses then releases.
    pub fn tap(&self, state: &RemapState, vk: VirtualKey) {
        self.press(state, vk);
        self.release(state, vk);
    }

    fn dispatch(&self, state: &RemapState, event: KeyEvent) -> HookDecision {
        let decision = pipeline::handle_keyboard_hook_event(state, self, &event);
        if decision == HookDecision::PassThrough {
            self.set_key_state(event.vk, event.is_down());
            self.delivered.lock().push(event);
        }
        decision
    }

    /// Events that reached the rest of the system, oldest first.
    pub fn delivered(&self) -> Vec<KeyEvent> {
        self.delivered.lock().clone()
    }

    /// Number of events synthesized through [`Input::send_virtual_input`].
    pub fn send_count(&self) -> usize {
        *self.sent.lock()
    }

    pub fn reset(&self) {
        *self.key_state.lock() = [false; 256];
        self.pending.lock().clear();
        self.delivered.lock().clear();
        *self.sent.lock() = 0;
    }
}

impl Input for MockInput {
    fn send_virtual_input(&self, inputs: &[KeyInput]) {
        *self.sent.lock() += inputs.len();
        self.pending.lock().extend(inputs.iter().copied());
    }

    fn get_virtual_key_state(&self, vk: VirtualKey) -> bool {
        let state = self.key_state.lock();
        match ModifierFamily::classify(vk) {
            Some((family, ModifierSide::Common)) => {
                state[family.left().code() as usize] || state[family.right().code() as usize]
            }
            _ => (vk.code() as usize) < 256 && state[vk.code() as usize],
        }
    }

    fn get_foreground_process(&self) -> Option<String> {
        self.foreground_process.lock().clone()
    }

    fn get_foreground_window(&self) -> WindowHandle {
        *self.foreground_window.lock()
    }
}
