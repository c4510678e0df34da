//! Per-stage event handlers called by the pipeline.
//!
//! Handlers decide under the table lock, then release it before sending
//! input or touching other state fields.

use crate::input::Input;
use crate::keys::{ModifierFamily, ModifierSide, VirtualKey};
use crate::remap_table::ShortcutRemapTable;
use crate::shortcut::Shortcut;
use crate::state::{RemapState, UiState};
use crate::types::{
    Flow, KeyEdge, KeyEvent, KeyInput, RemapTarget, SHORTCUT_FLAG, SINGLE_KEY_FLAG, SUPPRESS_FLAG,
};
use tracing::{debug, trace};

/// Down and up of [`VirtualKey::DUMMY`].
pub fn dummy_key_events(extra_info: usize) -> [KeyInput; 2] {
    [
        KeyInput::new(VirtualKey::DUMMY, KeyEdge::Down, extra_info),
        KeyInput::new(VirtualKey::DUMMY, KeyEdge::Up, extra_info),
    ]
}

/// Appends modifier events for `to_send`: downs in Win, Ctrl, Alt, Shift
/// order, ups in reverse.
///
/// With `compare`, modifiers both shortcuts share are left alone. With
/// `released`, the family of that key is skipped on the way down and always
/// released on the way up.
pub fn push_modifier_events(
    events: &mut Vec<KeyInput>,
    to_send: &Shortcut,
    win_key_invoked: Option<ModifierSide>,
    edge: KeyEdge,
    extra_info: usize,
    compare: Option<&Shortcut>,
    released: Option<VirtualKey>,
) {
    let is_released = |family: ModifierFamily| {
        released.is_some_and(|vk| matches!(ModifierFamily::classify(vk), Some((f, _)) if f == family))
    };

    let mut push = |family: ModifierFamily| {
        let Some(key) = to_send.modifier_key(family, win_key_invoked) else {
            return;
        };
        let shared = compare
            .is_some_and(|other| other.modifier_key(family, win_key_invoked) == Some(key));
        let send = match edge {
            KeyEdge::Down => !shared && !is_released(family),
            KeyEdge::Up => !shared || is_released(family),
        };
        if send {
            events.push(KeyInput::new(key, edge, extra_info));
        }
    };

    match edge {
        KeyEdge::Down => ModifierFamily::ALL.iter().copied().for_each(&mut push),
        KeyEdge::Up => ModifierFamily::ALL.iter().rev().copied().for_each(&mut push),
    }
}

/// Resends Num Lock so its toggle state matches what it was before a
/// suppressed press flipped it.
pub fn set_num_lock_to_previous_state(input: &dyn Input) {
    input.send_virtual_input(&[
        KeyInput::new(VirtualKey::NUMLOCK, KeyEdge::Down, SUPPRESS_FLAG),
        KeyInput::new(VirtualKey::NUMLOCK, KeyEdge::Up, SUPPRESS_FLAG),
    ]);
}

// ---- detection windows ----

/// Feeds keys to the single-key detection window while it is focused.
/// While the keyboard editor is open, remapping is skipped.
pub fn detect_single_remap_key_ui_backend(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> Flow {
    if state.check_ui_state(UiState::DetectSingleKeyRemapWindowActivated, input) {
        if !state.handle_key_delay_event(event) && event.is_down() {
            state.select_detected_remap_key(event.vk);
        }
        return Flow::Suppress;
    }
    if state.check_ui_state(UiState::EditKeyboardWindowActivated, input) {
        return Flow::PassThrough;
    }
    Flow::Continue
}

/// Feeds keys to a shortcut detection window while it is focused.
/// `is_remap_key` selects the one opened from the keyboard editor.
pub fn detect_shortcut_ui_backend(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
    is_remap_key: bool,
) -> Flow {
    let detecting = if is_remap_key {
        state.check_ui_state(UiState::DetectShortcutWindowInEditKeyboardWindowActivated, input)
    } else {
        state.check_ui_state(UiState::DetectShortcutWindowActivated, input)
    };

    if detecting {
        if !state.handle_key_delay_event(event) {
            match event.edge {
                KeyEdge::Down => state.select_detected_shortcut(event.vk),
                KeyEdge::Up => state.reset_detected_shortcut_key(event.vk),
            }
        }
        return Flow::Suppress;
    }

    let editing = if is_remap_key {
        state.ui_state() == UiState::DetectShortcutWindowInEditKeyboardWindowActivated
    } else {
        state.check_ui_state(UiState::EditShortcutsWindowActivated, input)
    };
    if editing {
        Flow::PassThrough
    } else {
        Flow::Continue
    }
}

// ---- single-key remaps ----

fn is_engine_generated(event: &KeyEvent) -> bool {
    event.extra_info == SINGLE_KEY_FLAG || event.extra_info == SHORTCUT_FLAG
}

pub fn handle_single_key_remap_event(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> Flow {
    if is_engine_generated(event) {
        return Flow::Continue;
    }
    let Some(target) = state.get_single_key_remap(event.vk) else {
        return Flow::Continue;
    };

    let events = match target {
        RemapTarget::Key(vk) if vk == VirtualKey::DISABLED => Vec::new(),
        RemapTarget::Key(vk) => vec![KeyInput::new(
            vk.filter_artificial(),
            event.edge,
            SINGLE_KEY_FLAG,
        )],
        RemapTarget::Shortcut(shortcut) => {
            let action = KeyInput::new(
                shortcut.action_key().filter_artificial(),
                event.edge,
                SHORTCUT_FLAG,
            );
            let mut events = Vec::with_capacity(shortcut.size());
            if event.is_up() {
                events.push(action);
            }
            push_modifier_events(
                &mut events,
                &shortcut,
                Some(ModifierSide::Left),
                event.edge,
                SHORTCUT_FLAG,
                None,
                None,
            );
            if event.is_down() {
                events.push(action);
            }
            events
        }
    };

    trace!(vk = ?event.vk, edge = ?event.edge, %target, "single key remap");
    if !events.is_empty() {
        input.send_virtual_input(&events);
    }
    Flow::Suppress
}

// ---- shortcut remaps ----

enum Activation {
    Unchanged,
    Set,
    Clear,
}

struct ShortcutOutcome {
    flow: Flow,
    events: Vec<KeyInput>,
    activation: Activation,
}

impl ShortcutOutcome {
    fn new(flow: Flow, events: Vec<KeyInput>) -> Self {
        Self {
            flow,
            events,
            activation: Activation::Unchanged,
        }
    }

    fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

/// Applies a shortcut remap table to one event. `app` names the app-specific
/// table, `None` is the OS-level one.
pub fn handle_shortcut_remap_event(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
    app: Option<&str>,
) -> Flow {
    let outcome =
        state.with_shortcut_remap_table(app, |table| shortcut_remap_outcome(table, input, event));

    if !outcome.events.is_empty() {
        input.send_virtual_input(&outcome.events);
    }
    if let Some(app) = app {
        match outcome.activation {
            Activation::Set => state.set_activated_app(Some(app.to_string())),
            Activation::Clear => state.set_activated_app(None),
            Activation::Unchanged => {}
        }
    }
    outcome.flow
}

fn key_is_down(input: &dyn Input, vk: VirtualKey) -> bool {
    input.get_virtual_key_state(vk.filter_artificial())
}

/// Whether nothing but `vk` is held, treating it as a one-key shortcut.
fn is_keyboard_state_clear_except_key(input: &dyn Input, vk: VirtualKey) -> bool {
    let mut only = Shortcut::new();
    let _ = only.set_key(vk.filter_artificial());
    only.is_keyboard_state_clear_except_shortcut(input)
}

fn shortcut_remap_outcome(
    table: &mut ShortcutRemapTable,
    input: &dyn Input,
    event: &KeyEvent,
) -> ShortcutOutcome {
    let any_invoked = table.is_any_invoked();
    let sorted = table.sorted().to_vec();

    for original in sorted {
        let Some(remap) = table.get_mut(&original) else {
            continue;
        };
        // While one remap is held, only that one is processed.
        if any_invoked && !remap.is_shortcut_invoked {
            continue;
        }

        let target = remap.target;
        let to_disabled = target.is_disabled();
        let src_size = original.size();

        if !remap.is_shortcut_invoked {
            if !(original.check_modifiers_keyboard_state(input)
                && event.vk == original.action_key()
                && event.is_down())
            {
                continue;
            }

            let needs_clear_state = matches!(target, RemapTarget::Shortcut(_)) || to_disabled;
            if needs_clear_state && !original.is_keyboard_state_clear_except_shortcut(input) {
                continue;
            }

            remap.win_key_invoked = if input.get_virtual_key_state(VirtualKey::RWIN) {
                Some(ModifierSide::Right)
            } else if input.get_virtual_key_state(VirtualKey::LWIN) {
                Some(ModifierSide::Left)
            } else {
                None
            };
            let win = remap.win_key_invoked;

            let mut events = Vec::new();
            match target {
                RemapTarget::Shortcut(dest) => {
                    let common = original.common_modifiers_count(&dest);
                    if common + 1 != src_size {
                        events.extend(dummy_key_events(SHORTCUT_FLAG));
                        push_modifier_events(
                            &mut events,
                            &original,
                            win,
                            KeyEdge::Up,
                            SHORTCUT_FLAG,
                            Some(&dest),
                            None,
                        );
                    }
                    push_modifier_events(
                        &mut events,
                        &dest,
                        win,
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                        Some(&original),
                        None,
                    );
                    events.push(KeyInput::new(
                        dest.action_key().filter_artificial(),
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                    ));
                }
                RemapTarget::Key(vk) => {
                    events.extend(dummy_key_events(SHORTCUT_FLAG));
                    push_modifier_events(
                        &mut events,
                        &original,
                        win,
                        KeyEdge::Up,
                        SHORTCUT_FLAG,
                        None,
                        None,
                    );
                    if !to_disabled {
                        events.push(KeyInput::new(
                            vk.filter_artificial(),
                            KeyEdge::Down,
                            SHORTCUT_FLAG,
                        ));
                    }
                }
            }

            remap.is_shortcut_invoked = true;
            remap.is_original_action_key_pressed = true;
            debug!(%original, %target, "shortcut remap invoked");
            return ShortcutOutcome::new(Flow::Suppress, events).with_activation(Activation::Set);
        }

        // Invoked: the original shortcut is held down.
        let win = remap.win_key_invoked;
        let mut events = Vec::new();

        // Case 1: an original modifier is released.
        if original.check_modifier(event.vk) && event.is_up() {
            match target {
                RemapTarget::Shortcut(dest) => {
                    if key_is_down(input, dest.action_key()) {
                        events.push(KeyInput::new(
                            dest.action_key().filter_artificial(),
                            KeyEdge::Up,
                            SHORTCUT_FLAG,
                        ));
                    }
                    push_modifier_events(
                        &mut events,
                        &dest,
                        win,
                        KeyEdge::Up,
                        SHORTCUT_FLAG,
                        Some(&original),
                        Some(event.vk),
                    );
                    push_modifier_events(
                        &mut events,
                        &original,
                        win,
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                        Some(&dest),
                        Some(event.vk),
                    );
                    if dest.check_modifier(event.vk) {
                        events.extend(dummy_key_events(SHORTCUT_FLAG));
                    }
                }
                RemapTarget::Key(vk) => {
                    if !to_disabled && key_is_down(input, vk) {
                        events.push(KeyInput::new(
                            vk.filter_artificial(),
                            KeyEdge::Up,
                            SHORTCUT_FLAG,
                        ));
                    }
                    push_modifier_events(
                        &mut events,
                        &original,
                        win,
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                        None,
                        Some(event.vk),
                    );
                    events.extend(dummy_key_events(SHORTCUT_FLAG));
                }
            }
            table.reset_invocations();
            debug!(%original, "shortcut remap released");
            return ShortcutOutcome::new(Flow::Suppress, events).with_activation(Activation::Clear);
        }

        // The OS sees the target's modifiers as held.
        let target_modifiers_held = match target {
            RemapTarget::Shortcut(dest) => dest.check_modifiers_keyboard_state(input),
            RemapTarget::Key(_) => true,
        };
        if !target_modifiers_held {
            continue;
        }
        let Some(remap) = table.get_mut(&original) else {
            continue;
        };

        // Case 2: the action key auto-repeats.
        if event.vk == original.action_key() && event.is_down() {
            remap.is_original_action_key_pressed = true;
            let mut activation = Activation::Unchanged;
            match target {
                RemapTarget::Key(_) if to_disabled => {}
                RemapTarget::Shortcut(dest) => events.push(KeyInput::new(
                    dest.action_key().filter_artificial(),
                    KeyEdge::Down,
                    SHORTCUT_FLAG,
                )),
                RemapTarget::Key(vk) => {
                    if is_keyboard_state_clear_except_key(input, vk) {
                        events.push(KeyInput::new(
                            vk.filter_artificial(),
                            KeyEdge::Down,
                            SHORTCUT_FLAG,
                        ));
                    } else {
                        // Another key is held: go back to the physical state.
                        events.push(KeyInput::new(vk.filter_artificial(), KeyEdge::Up, SHORTCUT_FLAG));
                        push_modifier_events(
                            &mut events,
                            &original,
                            win,
                            KeyEdge::Down,
                            SHORTCUT_FLAG,
                            None,
                            None,
                        );
                        events.extend(dummy_key_events(SHORTCUT_FLAG));
                        table.reset_invocations();
                        activation = Activation::Clear;
                    }
                }
            }
            return ShortcutOutcome::new(Flow::Suppress, events).with_activation(activation);
        }

        // Case 3: the action key is released, target modifiers stay held.
        if event.vk == original.action_key() && event.is_up() {
            remap.is_original_action_key_pressed = false;
            let mut activation = Activation::Unchanged;
            match target {
                RemapTarget::Key(_) if to_disabled => {}
                RemapTarget::Shortcut(dest) => events.push(KeyInput::new(
                    dest.action_key().filter_artificial(),
                    KeyEdge::Up,
                    SHORTCUT_FLAG,
                )),
                RemapTarget::Key(vk) => {
                    events.push(KeyInput::new(vk.filter_artificial(), KeyEdge::Up, SHORTCUT_FLAG));
                    if !is_keyboard_state_clear_except_key(input, vk) {
                        push_modifier_events(
                            &mut events,
                            &original,
                            win,
                            KeyEdge::Down,
                            SHORTCUT_FLAG,
                            None,
                            None,
                        );
                        table.reset_invocations();
                        activation = Activation::Clear;
                    }
                }
            }
            return ShortcutOutcome::new(Flow::Suppress, events).with_activation(activation);
        }

        // Case 4: an original modifier is pressed again.
        if original.check_modifier(event.vk) && event.is_down() {
            return ShortcutOutcome::new(Flow::Suppress, events);
        }

        // Case 5: any other key goes down. Restore the original modifiers and
        // let the key through.
        if event.is_down() {
            let mut activation = Activation::Unchanged;
            match target {
                RemapTarget::Shortcut(dest) => {
                    let action_pressed = remap.is_original_action_key_pressed;
                    if key_is_down(input, dest.action_key()) {
                        events.push(KeyInput::new(
                            dest.action_key().filter_artificial(),
                            KeyEdge::Up,
                            SHORTCUT_FLAG,
                        ));
                    }
                    push_modifier_events(
                        &mut events,
                        &dest,
                        win,
                        KeyEdge::Up,
                        SHORTCUT_FLAG,
                        Some(&original),
                        None,
                    );
                    push_modifier_events(
                        &mut events,
                        &original,
                        win,
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                        Some(&dest),
                        None,
                    );
                    if action_pressed {
                        events.push(KeyInput::new(
                            original.action_key(),
                            KeyEdge::Down,
                            SHORTCUT_FLAG,
                        ));
                    }
                    table.reset_invocations();
                    activation = Activation::Clear;
                }
                // A held key target combines with other keys, e.g. Alt+D -> Win then A gives Win+A.
                RemapTarget::Key(vk) if !remap.is_original_action_key_pressed => {
                    if !to_disabled && key_is_down(input, vk) {
                        events.push(KeyInput::new(vk.filter_artificial(), KeyEdge::Up, SHORTCUT_FLAG));
                    }
                    push_modifier_events(
                        &mut events,
                        &original,
                        win,
                        KeyEdge::Down,
                        SHORTCUT_FLAG,
                        None,
                        None,
                    );
                    table.reset_invocations();
                    activation = Activation::Clear;
                }
                RemapTarget::Key(_) => {}
            }
            return ShortcutOutcome::new(Flow::Continue, events).with_activation(activation);
        }

        // Case 6: other releases need nothing.
        return ShortcutOutcome::new(Flow::Continue, events);
    }

    ShortcutOutcome::new(Flow::Continue, Vec::new())
}

/// Table name for the foreground app: the activated app while one of its
/// remaps is held, else the process name, then the name without extension.
pub fn resolve_app_specific_table(state: &RemapState, input: &dyn Input) -> Option<String> {
    if let Some(app) = state.get_activated_app() {
        return Some(app);
    }
    let process = input.get_foreground_process()?.to_lowercase();
    if state.has_app_specific_table(&process) {
        return Some(process);
    }
    let stem = match process.rfind('.') {
        Some(idx) => &process[..idx],
        None => process.as_str(),
    };
    state.has_app_specific_table(stem).then(|| stem.to_string())
}

pub fn handle_app_specific_shortcut_remap_event(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> Flow {
    if event.extra_info == SHORTCUT_FLAG {
        return Flow::Continue;
    }
    // An OS-level remap in progress owns the keyboard.
    if state.check_shortcut_remap_invoked(None) {
        return Flow::Continue;
    }
    match resolve_app_specific_table(state, input) {
        Some(app) => handle_shortcut_remap_event(state, input, event, Some(&app)),
        None => Flow::Continue,
    }
}

pub fn handle_os_level_shortcut_remap_event(
    state: &RemapState,
    input: &dyn Input,
    event: &KeyEvent,
) -> Flow {
    if event.extra_info == SHORTCUT_FLAG {
        return Flow::Continue;
    }
    handle_shortcut_remap_event(state, input, event, None)
}
