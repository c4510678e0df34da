use keymapper_core::remap_helper::{
    apply_shortcut_remappings, apply_single_key_remappings, check_if_remappings_are_valid,
    get_orphaned_keys, pre_process_remap_table,
};
use keymapper_core::remap_table::SingleKeyRemapTable;
use keymapper_core::{RemapBufferItem, RemapState, RemapTarget, Shortcut, ValidationOutcome, VirtualKey};

fn key(c: u8) -> VirtualKey {
    VirtualKey::from_ascii(c)
}

fn shortcut(keys: &[VirtualKey]) -> Shortcut {
    Shortcut::from_keys(keys).unwrap()
}

fn ctrl(c: u8) -> Shortcut {
    shortcut(&[VirtualKey::CONTROL, key(c)])
}

#[test]
fn empty_buffer_is_valid() {
    assert_eq!(check_if_remappings_are_valid(&[]), ValidationOutcome::NoError);
}

#[test]
fn complete_key_rows_are_valid() {
    let rows = vec![
        RemapBufferItem::new(key(b'A'), key(b'B')),
        RemapBufferItem::new(key(b'B'), key(b'A')),
        RemapBufferItem::new(VirtualKey::CAPITAL, VirtualKey::DISABLED),
        RemapBufferItem::new(key(b'C'), ctrl(b'V')),
    ];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::NoError);
}

#[test]
fn missing_target_is_invalid() {
    let rows = vec![RemapBufferItem::new(key(b'A'), VirtualKey::NONE)];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::RemapUnsuccessful);

    let rows = vec![RemapBufferItem::new(VirtualKey::NONE, key(b'A'))];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::RemapUnsuccessful);
}

#[test]
fn shortcut_without_action_key_is_invalid() {
    let cases = [
        shortcut(&[VirtualKey::CONTROL]),
        shortcut(&[VirtualKey::CONTROL, VirtualKey::SHIFT]),
        shortcut(&[VirtualKey::LWIN, VirtualKey::MENU, VirtualKey::SHIFT]),
    ];
    for incomplete in cases {
        let rows = vec![RemapBufferItem::new(ctrl(b'A'), incomplete)];
        assert_eq!(
            check_if_remappings_are_valid(&rows),
            ValidationOutcome::RemapUnsuccessful,
            "{incomplete}"
        );
    }
    // An action key alone is not a shortcut either.
    let rows = vec![RemapBufferItem::new(shortcut(&[key(b'A')]), ctrl(b'B'))];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::RemapUnsuccessful);
}

#[test]
fn same_shortcut_in_different_scopes_is_valid() {
    let rows = vec![
        RemapBufferItem::new(ctrl(b'A'), ctrl(b'V')),
        RemapBufferItem::for_app(ctrl(b'A'), ctrl(b'C'), "notepad.exe"),
        RemapBufferItem::for_app(ctrl(b'A'), key(b'X'), "code.exe"),
    ];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::NoError);
}

#[test]
fn same_shortcut_twice_for_one_app_is_invalid() {
    let rows = vec![
        RemapBufferItem::for_app(ctrl(b'A'), ctrl(b'V'), "notepad.exe"),
        RemapBufferItem::for_app(ctrl(b'A'), ctrl(b'C'), "notepad.exe"),
    ];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::RemapUnsuccessful);
}

#[test]
fn app_names_differing_only_in_case_share_a_scope() {
    let rows = vec![
        RemapBufferItem::for_app(ctrl(b'A'), key(b'X'), "Notepad.exe"),
        RemapBufferItem::for_app(ctrl(b'A'), key(b'Y'), "notepad.exe"),
    ];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::RemapUnsuccessful);

    let rows = vec![
        RemapBufferItem::for_app(ctrl(b'A'), key(b'X'), "NOTEPAD.EXE"),
        RemapBufferItem::for_app(ctrl(b'B'), key(b'Y'), "notepad.exe"),
    ];
    assert_eq!(check_if_remappings_are_valid(&rows), ValidationOutcome::NoError);
}

#[test]
fn swapped_keys_leave_no_orphans() {
    let rows = vec![
        RemapBufferItem::new(key(b'A'), key(b'B')),
        RemapBufferItem::new(key(b'B'), key(b'A')),
    ];
    assert!(get_orphaned_keys(&rows).is_empty());
}

#[test]
fn one_way_remap_orphans_its_source() {
    let rows = vec![
        RemapBufferItem::new(key(b'A'), key(b'B')),
        RemapBufferItem::new(key(b'C'), VirtualKey::DISABLED),
        RemapBufferItem::new(key(b'D'), key(b'C')),
    ];
    assert_eq!(get_orphaned_keys(&rows), vec![key(b'A'), key(b'D')]);
}

#[test]
fn pre_process_folds_only_matching_pairs() {
    let mut table = SingleKeyRemapTable::new();
    table.insert(VirtualKey::LCONTROL, RemapTarget::Key(key(b'A')));
    table.insert(VirtualKey::RCONTROL, RemapTarget::Key(key(b'A')));
    table.insert(VirtualKey::LSHIFT, RemapTarget::Key(key(b'B')));
    table.insert(VirtualKey::RSHIFT, RemapTarget::Key(key(b'C')));
    table.insert(VirtualKey::LMENU, RemapTarget::Key(key(b'D')));
    pre_process_remap_table(&mut table);

    assert_eq!(table.get(&VirtualKey::CONTROL), Some(&RemapTarget::Key(key(b'A'))));
    assert!(!table.contains_key(&VirtualKey::LCONTROL));
    assert!(!table.contains_key(&VirtualKey::RCONTROL));
    assert!(table.contains_key(&VirtualKey::LSHIFT));
    assert!(table.contains_key(&VirtualKey::RSHIFT));
    assert!(!table.contains_key(&VirtualKey::SHIFT));
    assert!(table.contains_key(&VirtualKey::LMENU));
    assert_eq!(table.len(), 4);
}

#[test]
fn applying_nothing_clears_the_tables() {
    let state = RemapState::new();
    state.add_single_key_remap(key(b'A'), RemapTarget::Key(key(b'B')));
    state.add_os_level_shortcut(ctrl(b'A'), RemapTarget::Key(key(b'B')));
    state.add_app_specific_shortcut("notepad.exe", ctrl(b'A'), RemapTarget::Key(key(b'B')));

    assert_eq!(apply_single_key_remappings(&state, &[]), 0);
    assert_eq!(apply_shortcut_remappings(&state, &[]), 0);

    assert!(state.single_key_remaps().is_empty());
    assert!(state.get_shortcut_remap_table(None).is_empty());
    assert!(state.app_specific_shortcut_remaps().is_empty());
    assert!(state.are_remappings_enabled());
}

#[test]
fn invalid_rows_are_not_committed() {
    let state = RemapState::new();
    let rows = vec![
        RemapBufferItem::new(key(b'A'), key(b'B')),
        RemapBufferItem::new(key(b'C'), VirtualKey::NONE),
    ];
    assert_eq!(apply_single_key_remappings(&state, &rows), 1);

    let table = state.single_key_remaps();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(&key(b'A')), Some(&RemapTarget::Key(key(b'B'))));
}

#[test]
fn common_modifier_source_becomes_two_entries() {
    let state = RemapState::new();
    let rows = vec![
        RemapBufferItem::new(VirtualKey::CONTROL, key(b'A')),
        RemapBufferItem::new(VirtualKey::WIN_BOTH, VirtualKey::DISABLED),
    ];
    assert_eq!(apply_single_key_remappings(&state, &rows), 2);

    let table = state.single_key_remaps();
    assert_eq!(table.len(), 4);
    for vk in [VirtualKey::LCONTROL, VirtualKey::RCONTROL] {
        assert_eq!(table.get(&vk), Some(&RemapTarget::Key(key(b'A'))));
    }
    for vk in [VirtualKey::LWIN, VirtualKey::RWIN] {
        assert!(table.get(&vk).is_some_and(|t| t.is_disabled()));
    }
}

#[test]
fn shortcut_rows_go_to_their_scope() {
    let state = RemapState::new();
    let rows = vec![
        RemapBufferItem::new(ctrl(b'A'), ctrl(b'V')),
        RemapBufferItem::for_app(ctrl(b'B'), key(b'X'), "Notepad.exe"),
        RemapBufferItem::for_app(ctrl(b'C'), shortcut(&[VirtualKey::CONTROL]), "notepad.exe"),
    ];
    assert_eq!(apply_shortcut_remappings(&state, &rows), 2);

    let global = state.get_shortcut_remap_table(None);
    assert_eq!(global.len(), 1);
    assert_eq!(global.get(&ctrl(b'A')).map(|r| r.target), Some(RemapTarget::Shortcut(ctrl(b'V'))));

    let apps = state.app_specific_shortcut_remaps();
    let notepad = apps.get("notepad.exe").expect("app names are lowercased");
    assert_eq!(notepad.len(), 1);
    assert!(notepad.get(&ctrl(b'C')).is_none());
}
