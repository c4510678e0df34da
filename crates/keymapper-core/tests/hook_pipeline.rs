use crossbeam_channel::unbounded;
use keymapper_core::key_delay::KeyDelayCallbacks;
use keymapper_core::remap_helper::{
    apply_shortcut_remappings, apply_single_key_remappings, RemapBufferItem,
};
use keymapper_core::types::{WindowHandle, SHORTCUT_FLAG, SINGLE_KEY_FLAG};
use keymapper_core::{
    HookDecision, Input, KeyEdge, KeyEvent, KeyInput, MockInput, RemapState, RemapTarget,
    Shortcut, UiState, VirtualKey,
};
use std::time::Duration;

fn key(c: u8) -> VirtualKey {
    VirtualKey::from_ascii(c)
}

fn shortcut(keys: &[VirtualKey]) -> Shortcut {
    Shortcut::from_keys(keys).unwrap()
}

/// Delivered events without the dummy key pairs.
fn delivered(input: &MockInput) -> Vec<(VirtualKey, KeyEdge)> {
    input
        .delivered()
        .iter()
        .filter(|e| e.vk != VirtualKey::DUMMY)
        .map(|e| (e.vk, e.edge))
        .collect()
}

fn down_keys(input: &MockInput) -> Vec<VirtualKey> {
    input
        .delivered()
        .iter()
        .filter(|e| e.is_down() && e.vk != VirtualKey::DUMMY)
        .map(|e| e.vk)
        .collect()
}

#[test]
fn single_key_remaps_replace_the_source_event() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_single_key_remap(key(b'C'), RemapTarget::Key(key(b'D')));

    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'A')), HookDecision::Suppress);
    input.tap(&state, key(b'C'));

    assert_eq!(
        delivered(&input),
        vec![
            (key(b'B'), KeyEdge::Down),
            (key(b'B'), KeyEdge::Up),
            (key(b'D'), KeyEdge::Down),
            (key(b'D'), KeyEdge::Up),
        ]
    );
    assert!(input
        .delivered()
        .iter()
        .all(|e| e.injected && e.extra_info == SINGLE_KEY_FLAG));
}

#[test]
fn swapped_keys_do_not_loop() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_single_key_remap(key(b'B'), RemapTarget::Key(key(b'A')));

    input.tap(&state, key(b'A'));
    input.tap(&state, key(b'B'));
    assert_eq!(down_keys(&input), vec![key(b'B'), key(b'A')]);
}

#[test]
fn disabled_key_produces_nothing() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'Q'), RemapTarget::Key(VirtualKey::DISABLED));

    assert_eq!(input.press(&state, key(b'Q')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'Q')), HookDecision::Suppress);
    assert!(input.delivered().is_empty());
    assert_eq!(input.send_count(), 0);
}

#[test]
fn key_to_shortcut_sends_modifiers_around_action_key() {
    let state = RemapState::new();
    let input = MockInput::new();
    let target = shortcut(&[VirtualKey::CONTROL, VirtualKey::SHIFT, key(b'C')]);
    state.add_single_key_remap(VirtualKey::F1, RemapTarget::Shortcut(target));

    input.tap(&state, VirtualKey::F1);
    assert_eq!(
        delivered(&input),
        vec![
            (VirtualKey::CONTROL, KeyEdge::Down),
            (VirtualKey::SHIFT, KeyEdge::Down),
            (key(b'C'), KeyEdge::Down),
            (key(b'C'), KeyEdge::Up),
            (VirtualKey::SHIFT, KeyEdge::Up),
            (VirtualKey::CONTROL, KeyEdge::Up),
        ]
    );
}

#[test]
fn common_modifier_source_matches_either_side() {
    let state = RemapState::new();
    let input = MockInput::new();
    apply_single_key_remappings(
        &state,
        &[RemapBufferItem::new(VirtualKey::CONTROL, key(b'A'))],
    );

    input.tap(&state, VirtualKey::RCONTROL);
    input.tap(&state, VirtualKey::LCONTROL);
    assert_eq!(down_keys(&input), vec![key(b'A'), key(b'A')]);
}

#[test]
fn longer_shortcut_wins_over_its_prefix() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Key(key(b'X')),
    );
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, VirtualKey::SHIFT, key(b'A')]),
        RemapTarget::Key(key(b'Y')),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, VirtualKey::LSHIFT);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::LSHIFT);
    input.release(&state, VirtualKey::LCONTROL);

    let downs = down_keys(&input);
    assert_eq!(downs.iter().filter(|&&vk| vk == key(b'Y')).count(), 1);
    assert!(!downs.contains(&key(b'X')));
    for vk in [key(b'Y'), VirtualKey::LCONTROL, VirtualKey::LSHIFT] {
        assert!(!input.get_virtual_key_state(vk), "{vk} still held");
    }
}

#[test]
fn single_key_remap_hides_the_source_from_shortcuts() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'C')));
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Key(key(b'X')),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.tap(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);

    assert_eq!(down_keys(&input), vec![VirtualKey::LCONTROL, key(b'C')]);
}

#[test]
fn remapped_key_can_complete_a_shortcut() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'B')]),
        RemapTarget::Key(key(b'X')),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.tap(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);

    assert_eq!(down_keys(&input), vec![VirtualKey::LCONTROL, key(b'X')]);
}

#[test]
fn app_specific_shortcut_is_checked_before_os_level() {
    let state = RemapState::new();
    let input = MockInput::new();
    let source = shortcut(&[VirtualKey::CONTROL, key(b'A')]);
    state.add_os_level_shortcut(source, RemapTarget::Key(key(b'X')));
    state.add_app_specific_shortcut("notepad.exe", source, RemapTarget::Key(key(b'Y')));

    input.set_foreground_process(Some("notepad.exe"));
    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    assert_eq!(state.get_activated_app().as_deref(), Some("notepad.exe"));

    // Focus moves away while the shortcut is held; release still goes to notepad's remap.
    input.set_foreground_process(Some("code.exe"));
    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);
    assert_eq!(state.get_activated_app(), None);
    assert!(!input.get_virtual_key_state(key(b'Y')));

    input.press(&state, VirtualKey::LCONTROL);
    input.tap(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);

    let downs = down_keys(&input);
    assert_eq!(downs.iter().filter(|&&vk| vk == key(b'Y')).count(), 1);
    assert_eq!(downs.iter().filter(|&&vk| vk == key(b'X')).count(), 1);
    assert!(downs.iter().position(|&vk| vk == key(b'Y')) < downs.iter().position(|&vk| vk == key(b'X')));
}

#[test]
fn reapplying_tables_while_held_forgets_the_activated_app() {
    let state = RemapState::new();
    let input = MockInput::new();
    let ctrl_a = shortcut(&[VirtualKey::CONTROL, key(b'A')]);
    let rows = vec![
        RemapBufferItem::for_app(ctrl_a, key(b'X'), "notepad.exe"),
        RemapBufferItem::for_app(ctrl_a, key(b'Y'), "code.exe"),
    ];
    apply_shortcut_remappings(&state, &rows);

    input.set_foreground_process(Some("notepad.exe"));
    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    assert_eq!(state.get_activated_app().as_deref(), Some("notepad.exe"));

    apply_shortcut_remappings(&state, &rows);
    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);
    assert_eq!(state.get_activated_app(), None);

    input.set_foreground_process(Some("code.exe"));
    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);

    let downs = down_keys(&input);
    assert_eq!(downs.iter().filter(|&&vk| vk == key(b'X')).count(), 1);
    assert_eq!(downs.last(), Some(&key(b'Y')));
}

#[test]
fn shortcut_to_shortcut_keeps_shared_modifiers() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Shortcut(shortcut(&[VirtualKey::CONTROL, key(b'V')])),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    assert!(input.get_virtual_key_state(VirtualKey::LCONTROL));
    assert!(input.get_virtual_key_state(key(b'V')));

    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);

    assert_eq!(
        delivered(&input),
        vec![
            (VirtualKey::LCONTROL, KeyEdge::Down),
            (key(b'V'), KeyEdge::Down),
            (key(b'V'), KeyEdge::Up),
            (VirtualKey::CONTROL, KeyEdge::Up),
        ]
    );
    assert!(!input.get_virtual_key_state(VirtualKey::CONTROL));
}

#[test]
fn shortcut_to_shortcut_swaps_modifiers_behind_dummy_key() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::MENU, key(b'A')]),
        RemapTarget::Shortcut(shortcut(&[VirtualKey::CONTROL, key(b'C')])),
    );

    input.press(&state, VirtualKey::LMENU);
    input.press(&state, key(b'A'));

    let events = input.delivered();
    let dummy_at = events.iter().position(|e| e.vk == VirtualKey::DUMMY);
    let alt_up_at = events
        .iter()
        .position(|e| e.vk == VirtualKey::MENU && e.edge == KeyEdge::Up);
    assert!(dummy_at.is_some() && dummy_at < alt_up_at);
    assert!(!input.get_virtual_key_state(VirtualKey::MENU));
    assert!(input.get_virtual_key_state(VirtualKey::CONTROL));
    assert!(input.get_virtual_key_state(key(b'C')));
    assert!(events
        .iter()
        .filter(|e| e.injected)
        .all(|e| e.extra_info == SHORTCUT_FLAG));
}

#[test]
fn auto_repeat_repeats_the_target_action_key() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Shortcut(shortcut(&[VirtualKey::CONTROL, key(b'V')])),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    input.press(&state, key(b'A'));
    input.press(&state, key(b'A'));

    let v_downs = down_keys(&input).iter().filter(|&&vk| vk == key(b'V')).count();
    assert_eq!(v_downs, 3);
    assert!(!down_keys(&input).contains(&key(b'A')));
}

#[test]
fn other_key_reverts_to_physical_state() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Shortcut(shortcut(&[VirtualKey::CONTROL, key(b'V')])),
    );

    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    assert_eq!(input.press(&state, key(b'B')), HookDecision::PassThrough);

    assert!(input.get_virtual_key_state(VirtualKey::LCONTROL));
    assert!(input.get_virtual_key_state(key(b'A')));
    assert!(input.get_virtual_key_state(key(b'B')));
    assert!(!input.get_virtual_key_state(key(b'V')));
    assert!(!state.check_shortcut_remap_invoked(None));
}

#[test]
fn shortcut_to_disabled_swallows_the_shortcut() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'Q')]),
        RemapTarget::Key(VirtualKey::DISABLED),
    );

    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'Q')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'Q')), HookDecision::Suppress);
    assert_eq!(input.release(&state, VirtualKey::LCONTROL), HookDecision::Suppress);

    assert!(!down_keys(&input).contains(&key(b'Q')));
    for code in 1..0xFF {
        assert!(!input.get_virtual_key_state(VirtualKey(code)));
    }
}

#[test]
fn shortcut_to_shortcut_needs_a_clear_keyboard() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Shortcut(shortcut(&[VirtualKey::CONTROL, key(b'V')])),
    );

    input.press(&state, key(b'Z'));
    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::PassThrough);
    assert!(!down_keys(&input).contains(&key(b'V')));
}

#[test]
fn side_specific_shortcut_ignores_the_other_side() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::LCONTROL, key(b'A')]),
        RemapTarget::Key(key(b'X')),
    );

    input.press(&state, VirtualKey::RCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::PassThrough);
    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::RCONTROL);

    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
}

#[test]
fn side_specific_shortcut_wins_over_side_neutral() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Key(key(b'Y')),
    );
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::LCONTROL, key(b'A')]),
        RemapTarget::Key(key(b'X')),
    );

    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
    assert_eq!(down_keys(&input), vec![VirtualKey::LCONTROL, key(b'X')]);
    input.release(&state, key(b'A'));
    input.release(&state, VirtualKey::LCONTROL);

    // The right side still reaches the side-neutral remap.
    input.press(&state, VirtualKey::RCONTROL);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
    let downs = down_keys(&input);
    assert_eq!(downs.iter().filter(|&&vk| vk == key(b'X')).count(), 1);
    assert_eq!(downs.last(), Some(&key(b'Y')));
}

#[test]
fn remappings_pass_through_while_disabled() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));

    state.with_remappings_disabled(|| {
        assert_eq!(input.press(&state, key(b'A')), HookDecision::PassThrough);
        input.release(&state, key(b'A'));
    });
    input.tap(&state, key(b'A'));

    assert_eq!(down_keys(&input), vec![key(b'A'), key(b'B')]);
}

#[test]
fn single_key_detection_captures_raw_keys() {
    let state = RemapState::new();
    let input = MockInput::new();
    let window = WindowHandle(7);
    state.add_single_key_remap(key(b'Q'), RemapTarget::Key(key(b'W')));
    state.set_ui_state(UiState::DetectSingleKeyRemapWindowActivated, window);
    input.set_foreground_window(window);

    assert_eq!(input.press(&state, key(b'Q')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'Q')), HookDecision::Suppress);
    assert_eq!(state.get_detected_single_remap_key(), key(b'Q'));
    assert!(input.delivered().is_empty());

    // Unfocused, the editor is still open: keys pass raw, without remapping.
    input.set_foreground_window(WindowHandle(8));
    assert_eq!(input.press(&state, key(b'Q')), HookDecision::PassThrough);
    assert_eq!(down_keys(&input), vec![key(b'Q')]);
}

#[test]
fn shortcut_detection_sees_remapped_keys() {
    let state = RemapState::new();
    let input = MockInput::new();
    let window = WindowHandle(3);
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.set_ui_state(UiState::DetectShortcutWindowActivated, window);
    input.set_foreground_window(window);
    let events = state.subscribe_ui_events(16);

    input.press(&state, VirtualKey::LCONTROL);
    input.press(&state, key(b'A'));
    input.release(&state, key(b'A'));

    assert_eq!(
        state.get_detected_shortcut(),
        shortcut(&[VirtualKey::LCONTROL, key(b'B')])
    );
    assert!(input.delivered().is_empty());
    assert_eq!(events.try_iter().count(), 2);
}

#[test]
fn keyboard_editor_shortcut_detection_captures_raw_keys() {
    let state = RemapState::new();
    let input = MockInput::new();
    let window = WindowHandle(9);
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.set_ui_state(UiState::DetectShortcutWindowInEditKeyboardWindowActivated, window);
    input.set_foreground_window(window);

    assert_eq!(input.press(&state, VirtualKey::LCONTROL), HookDecision::Suppress);
    assert_eq!(input.press(&state, key(b'A')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'A')), HookDecision::Suppress);

    assert_eq!(
        state.get_detected_shortcut(),
        shortcut(&[VirtualKey::LCONTROL, key(b'A')])
    );
    assert!(input.delivered().is_empty());
    assert_eq!(input.send_count(), 0);
}

#[test]
fn unfocused_keyboard_editor_shortcut_detection_passes_raw_keys() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'C')]),
        RemapTarget::Key(key(b'X')),
    );
    state.set_ui_state(
        UiState::DetectShortcutWindowInEditKeyboardWindowActivated,
        WindowHandle(9),
    );
    input.set_foreground_window(WindowHandle(10));

    assert_eq!(input.press(&state, key(b'A')), HookDecision::PassThrough);
    input.release(&state, key(b'A'));
    input.press(&state, VirtualKey::LCONTROL);
    input.tap(&state, key(b'C'));

    assert_eq!(
        down_keys(&input),
        vec![key(b'A'), VirtualKey::LCONTROL, key(b'C')]
    );
    assert_eq!(state.get_detected_shortcut(), Shortcut::new());
}

#[test]
fn key_delay_claims_its_key_inside_detection_windows() {
    let state = RemapState::new();
    let input = MockInput::new();
    let window = WindowHandle(11);
    let (tx, rx) = unbounded();
    state
        .register_key_delay(
            key(b'K'),
            KeyDelayCallbacks::new(
                move |vk| {
                    let _ = tx.send(vk);
                },
                |_| {},
                |_| {},
            ),
        )
        .unwrap();
    state.set_ui_state(UiState::DetectShortcutWindowActivated, window);
    input.set_foreground_window(window);

    input.press(&state, VirtualKey::LCONTROL);
    assert_eq!(input.press(&state, key(b'K')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'K')), HookDecision::Suppress);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(key(b'K')));
    assert_eq!(state.get_detected_shortcut(), shortcut(&[VirtualKey::LCONTROL]));

    state.set_ui_state(UiState::DetectSingleKeyRemapWindowActivated, window);
    assert_eq!(input.press(&state, key(b'K')), HookDecision::Suppress);
    assert_eq!(input.release(&state, key(b'K')), HookDecision::Suppress);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(key(b'K')));
    assert_eq!(state.get_detected_single_remap_key(), VirtualKey::NONE);

    assert!(input.delivered().is_empty());
    state.clear_registered_key_delays();
}

#[test]
fn shortcut_editor_skips_shortcut_remaps_only() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_os_level_shortcut(
        shortcut(&[VirtualKey::CONTROL, key(b'C')]),
        RemapTarget::Key(key(b'X')),
    );
    state.set_ui_state(UiState::EditShortcutsWindowActivated, WindowHandle(5));
    input.set_foreground_window(WindowHandle(5));

    input.tap(&state, key(b'A'));
    input.press(&state, VirtualKey::LCONTROL);
    input.tap(&state, key(b'C'));

    assert_eq!(
        down_keys(&input),
        vec![key(b'B'), VirtualKey::LCONTROL, key(b'C')]
    );
}

#[test]
fn remapped_away_num_lock_keeps_its_toggle() {
    let state = RemapState::new();
    let input = MockInput::new();
    state.add_single_key_remap(VirtualKey::NUMLOCK, RemapTarget::Key(VirtualKey::F1));

    input.press(&state, VirtualKey::NUMLOCK);
    // F1 down, then the Num Lock down/up pair that is itself suppressed.
    assert_eq!(input.send_count(), 3);
    assert_eq!(down_keys(&input), vec![VirtualKey::F1]);
}

struct PanickingInput(MockInput);

impl Input for PanickingInput {
    fn send_virtual_input(&self, inputs: &[KeyInput]) {
        self.0.send_virtual_input(inputs);
    }

    fn get_virtual_key_state(&self, vk: VirtualKey) -> bool {
        self.0.get_virtual_key_state(vk)
    }

    fn get_foreground_process(&self) -> Option<String> {
        panic!("foreground lookup failed");
    }

    fn get_foreground_window(&self) -> WindowHandle {
        self.0.get_foreground_window()
    }
}

#[test]
fn faults_inside_the_pipeline_pass_the_event_through() {
    let state = RemapState::new();
    let input = PanickingInput(MockInput::new());
    state.add_app_specific_shortcut(
        "notepad.exe",
        shortcut(&[VirtualKey::CONTROL, key(b'A')]),
        RemapTarget::Key(key(b'B')),
    );

    let decision = keymapper_core::pipeline::handle_keyboard_hook_event(
        &state,
        &input,
        &KeyEvent::down(key(b'A')),
    );
    assert_eq!(decision, HookDecision::PassThrough);
}
