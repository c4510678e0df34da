//! Turns editable remap rows into committed tables.

use crate::keys::{split_common_modifier, ModifierFamily, VirtualKey};
use crate::remap_table::SingleKeyRemapTable;
use crate::state::RemapState;
use crate::types::RemapTarget;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    NoError,
    RemapUnsuccessful,
}

/// One editable row. An empty `target_app` means the remap is global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapBufferItem {
    pub original: RemapTarget,
    pub remap: RemapTarget,
    pub target_app: String,
}

impl RemapBufferItem {
    pub fn new(original: impl Into<RemapTarget>, remap: impl Into<RemapTarget>) -> Self {
        Self {
            original: original.into(),
            remap: remap.into(),
            target_app: String::new(),
        }
    }

    pub fn for_app(
        original: impl Into<RemapTarget>,
        remap: impl Into<RemapTarget>,
        target_app: &str,
    ) -> Self {
        Self {
            original: original.into(),
            remap: remap.into(),
            target_app: target_app.to_string(),
        }
    }

    /// Both sides present and complete.
    pub fn is_valid(&self) -> bool {
        self.original.is_valid() && self.remap.is_valid()
    }
}

pub type RemapBuffer = Vec<RemapBufferItem>;

/// Every row must be complete and no source may repeat within its scope.
/// The same source under two different apps, or once global and once
/// app-specific, is fine. App names compare case-insensitively.
pub fn check_if_remappings_are_valid(remappings: &[RemapBufferItem]) -> ValidationOutcome {
    let mut seen: BTreeMap<String, BTreeSet<RemapTarget>> = BTreeMap::new();
    let mut outcome = ValidationOutcome::NoError;
    for item in remappings {
        let scope = seen.entry(item.target_app.to_lowercase()).or_default();
        if !item.is_valid() || !scope.insert(item.original) {
            debug!(original = %item.original, app = %item.target_app, "invalid remap row");
            outcome = ValidationOutcome::RemapUnsuccessful;
        }
    }
    outcome
}

/// Keys remapped away that nothing else is remapped to, sorted by code.
pub fn get_orphaned_keys(remappings: &[RemapBufferItem]) -> Vec<VirtualKey> {
    let mut sources = BTreeSet::new();
    let mut targets = BTreeSet::new();
    for item in remappings.iter().filter(|item| item.is_valid()) {
        if let RemapTarget::Key(source) = item.original {
            sources.insert(source);
            if let RemapTarget::Key(target) = item.remap {
                targets.insert(target);
            }
        }
    }
    sources.difference(&targets).copied().collect()
}

/// Folds left/right modifier pairs with the same target into one common entry.
pub fn pre_process_remap_table(table: &mut SingleKeyRemapTable) {
    for family in ModifierFamily::ALL {
        let (left, right) = (family.left(), family.right());
        match (table.get(&left), table.get(&right)) {
            (Some(l), Some(r)) if l == r => {
                let target = *l;
                table.remove(&left);
                table.remove(&right);
                table.insert(family.common(), target);
            }
            _ => {}
        }
    }
}

/// Replaces the single-key table with the valid rows of `remappings`. Common
/// modifier sources become separate left and right entries. Returns the
/// number of rows committed.
pub fn apply_single_key_remappings(state: &RemapState, remappings: &[RemapBufferItem]) -> usize {
    let applied = state.with_remappings_disabled(|| {
        state.clear_single_key_remaps();
        let mut applied = 0;
        for item in remappings.iter().filter(|item| item.is_valid()) {
            let RemapTarget::Key(original) = item.original else {
                continue;
            };
            match split_common_modifier(original) {
                Some((left, right)) => {
                    state.add_single_key_remap(left, item.remap);
                    state.add_single_key_remap(right, item.remap);
                }
                None => {
                    state.add_single_key_remap(original, item.remap);
                }
            }
            applied += 1;
        }
        applied
    });
    info!(applied, total = remappings.len(), "single key remaps committed");
    applied
}

/// Replaces both shortcut tables with the valid rows of `remappings`.
/// Returns the number of rows committed.
pub fn apply_shortcut_remappings(state: &RemapState, remappings: &[RemapBufferItem]) -> usize {
    let applied = state.with_remappings_disabled(|| {
        state.clear_os_level_shortcuts();
        state.clear_app_specific_shortcuts();
        let mut applied = 0;
        for item in remappings.iter().filter(|item| item.is_valid()) {
            let RemapTarget::Shortcut(original) = item.original else {
                continue;
            };
            if item.target_app.is_empty() {
                state.add_os_level_shortcut(original, item.remap);
            } else {
                state.add_app_specific_shortcut(&item.target_app, original, item.remap);
            }
            applied += 1;
        }
        applied
    });
    info!(applied, total = remappings.len(), "shortcut remaps committed");
    applied
}
