//! The hook pipeline: an ordered list of stages, first decisive one wins.

use crate::handlers;
use crate::input::Input;
use crate::keys::VirtualKey;
use crate::state::RemapState;
use crate::types::{Flow, HookDecision, KeyEvent, SUPPRESS_FLAG};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Everything passes while tables are being replaced.
    RemappingsEnabled,
    /// Our own throwaway events.
    SuppressFlag,
    DetectSingleKey,
    /// Shortcut detection opened from the keyboard editor.
    DetectShortcutFromRemapKeys,
    SingleKeyRemap,
    /// Shortcut detection opened from the shortcuts editor.
    DetectShortcut,
    AppSpecificShortcut,
    OsLevelShortcut,
}

/// Stage order. App-specific shortcuts come before OS-level ones.
pub const STAGES: [Stage; 8] = [
    Stage::RemappingsEnabled,
    Stage::SuppressFlag,
    Stage::DetectSingleKey,
    Stage::DetectShortcutFromRemapKeys,
    Stage::SingleKeyRemap,
    Stage::DetectShortcut,
    Stage::AppSpecificShortcut,
    Stage::OsLevelShortcut,
];

impl Stage {
    pub fn run(self, state: &RemapState, input: &dyn Input, event: &KeyEvent) -> Flow {
        match self {
            Stage::RemappingsEnabled => {
                if state.are_remappings_enabled() {
                    Flow::Continue
                } else {
                    Flow::PassThrough
                }
            }
            Stage::SuppressFlag => {
                if event.extra_info == SUPPRESS_FLAG {
                    Flow::Suppress
                } else {
                    Flow::Continue
                }
            }
            Stage::DetectSingleKey => {
                handlers::detect_single_remap_key_ui_backend(state, input, event)
            }
            Stage::DetectShortcutFromRemapKeys => {
                handlers::detect_shortcut_ui_backend(state, input, event, true)
            }
            Stage::SingleKeyRemap => handlers::handle_single_key_remap_event(state, input, event),
            Stage::DetectShortcut => handlers::detect_shortcut_ui_backend(state, input, event, false),
            Stage::AppSpecificShortcut => {
                handlers::handle_app_specific_shortcut_remap_event(state, input, event)
            }
            Stage::OsLevelShortcut => {
                handlers::handle_os_level_shortcut_remap_event(state, input, event)
            }
        }
    }
}

/// Runs `stages` in order and returns the first decision, or pass-through.
pub fn run_stages(
    stages: &[Stage],
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> HookDecision {
    for &stage in stages {
        match stage.run(state, input, event) {
            Flow::Continue => {}
            Flow::Suppress => {
                trace!(?stage, vk = ?event.vk, "suppressed");
                return HookDecision::Suppress;
            }
            Flow::PassThrough => return HookDecision::PassThrough,
        }
    }
    HookDecision::PassThrough
}

/// Entry point for every keyboard event. Never panics: a fault inside a stage
/// lets the event through.
pub fn handle_keyboard_hook_event(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> HookDecision {
    if event.is_foreign_injected() {
        trace!(vk = ?event.vk, extra_info = event.extra_info, "input injected by another program");
    }
    let decision = match catch_unwind(AssertUnwindSafe(|| run_stages(&STAGES, state, input, event))) {
        Ok(decision) => decision,
        Err(_) => {
            warn!(vk = ?event.vk, "remap pipeline panicked, passing event through");
            return HookDecision::PassThrough;
        }
    };

    // A suppressed Num Lock press has already flipped the toggle state.
    if decision == HookDecision::Suppress
        && event.vk == VirtualKey::NUMLOCK
        && event.is_down()
        && event.extra_info != SUPPRESS_FLAG
    {
        handlers::set_num_lock_to_previous_state(input);
    }
    decision
}
