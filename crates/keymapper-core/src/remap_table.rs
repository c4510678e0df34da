use crate::keys::{ModifierSide, VirtualKey};
use crate::shortcut::Shortcut;
use crate::types::RemapTarget;
use std::cmp::Reverse;
use std::collections::BTreeMap;

pub type SingleKeyRemapTable = BTreeMap<VirtualKey, RemapTarget>;

/// A shortcut remap plus the runtime flags the hook keeps while it is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapShortcut {
    pub target: RemapTarget,
    /// The source shortcut is currently held and its target has been sent.
    pub is_shortcut_invoked: bool,
    /// Which Win key fired a common-Win source, so the same one is released.
    pub win_key_invoked: Option<ModifierSide>,
    /// Source action key is still physically down after invocation.
    pub is_original_action_key_pressed: bool,
}

impl RemapShortcut {
    pub fn new(target: RemapTarget) -> Self {
        Self {
            target,
            is_shortcut_invoked: false,
            win_key_invoked: None,
            is_original_action_key_pressed: false,
        }
    }

    fn reset_flags(&mut self) {
        self.is_shortcut_invoked = false;
        self.win_key_invoked = None;
        self.is_original_action_key_pressed = false;
    }
}

/// Shortcut remaps keyed by source, with a derived iteration order that puts
/// longer shortcuts first.
#[derive(Debug, Clone, Default)]
pub struct ShortcutRemapTable {
    remaps: BTreeMap<Shortcut, RemapShortcut>,
    sorted: Vec<Shortcut>,
}

impl ShortcutRemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites. Returns `true` when the source was new.
    pub fn insert(&mut self, source: Shortcut, target: RemapTarget) -> bool {
        let is_new = self
            .remaps
            .insert(source, RemapShortcut::new(target))
            .is_none();
        if is_new {
            self.sorted.push(source);
            self.resort();
        }
        is_new
    }

    pub fn clear(&mut self) {
        self.remaps.clear();
        self.sorted.clear();
    }

    pub fn len(&self) -> usize {
        self.remaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaps.is_empty()
    }

    pub fn get(&self, source: &Shortcut) -> Option<&RemapShortcut> {
        self.remaps.get(source)
    }

    pub fn get_mut(&mut self, source: &Shortcut) -> Option<&mut RemapShortcut> {
        self.remaps.get_mut(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Shortcut, &RemapShortcut)> {
        self.remaps.iter()
    }

    /// Sources ordered by descending key count, then side-specific modifiers
    /// before side-neutral ones, then key codes.
    pub fn sorted(&self) -> &[Shortcut] {
        &self.sorted
    }

    pub fn is_any_invoked(&self) -> bool {
        self.remaps.values().any(|r| r.is_shortcut_invoked)
    }

    /// Forgets every in-flight invocation.
    pub fn reset_invocations(&mut self) {
        self.remaps.values_mut().for_each(RemapShortcut::reset_flags);
    }

    fn resort(&mut self) {
        self.sorted
            .sort_by_key(|s| (Reverse(s.size()), s.side_neutral_modifier_count(), *s));
    }
}

/// Per-application shortcut tables, keyed by lowercased process image name.
pub type AppSpecificShortcutRemapTable = BTreeMap<String, ShortcutRemapTable>;
