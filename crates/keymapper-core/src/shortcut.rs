use crate::input::Input;
use crate::keys::{ModifierFamily, ModifierSide, VirtualKey};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of keys a shortcut can hold, modifiers included.
pub const MAX_SHORTCUT_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutError {
    #[error("null key cannot be part of a shortcut")]
    NullKey,
    #[error("shortcut already has action key {existing}, cannot add {rejected}")]
    SecondActionKey {
        existing: VirtualKey,
        rejected: VirtualKey,
    },
    #[error("shortcut already has 3 keys, cannot add {0}")]
    TooManyKeys(VirtualKey),
    #[error("invalid key code {0:?}")]
    Parse(String),
}

/// Up to three keys: modifiers from each family at most once, plus one action key.
///
/// Modifier sides are stored exactly as set, so `LCtrl+A` and `Ctrl+A` are
/// different table entries. The side expansion only happens when comparing
/// against live key state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Shortcut {
    win: Option<ModifierSide>,
    ctrl: Option<ModifierSide>,
    alt: Option<ModifierSide>,
    shift: Option<ModifierSide>,
    action: Option<VirtualKey>,
}

impl Shortcut {
    pub const fn new() -> Self {
        Self {
            win: None,
            ctrl: None,
            alt: None,
            shift: None,
            action: None,
        }
    }

    pub fn from_keys(keys: &[VirtualKey]) -> Result<Self, ShortcutError> {
        let mut shortcut = Self::new();
        for &vk in keys {
            shortcut.set_key(vk)?;
        }
        Ok(shortcut)
    }

    fn slot(&self, family: ModifierFamily) -> Option<ModifierSide> {
        match family {
            ModifierFamily::Win => self.win,
            ModifierFamily::Ctrl => self.ctrl,
            ModifierFamily::Alt => self.alt,
            ModifierFamily::Shift => self.shift,
        }
    }

    fn slot_mut(&mut self, family: ModifierFamily) -> &mut Option<ModifierSide> {
        match family {
            ModifierFamily::Win => &mut self.win,
            ModifierFamily::Ctrl => &mut self.ctrl,
            ModifierFamily::Alt => &mut self.alt,
            ModifierFamily::Shift => &mut self.shift,
        }
    }

    /// Adds a key. Returns `Ok(false)` when the key was already present.
    /// A different side of a family already in the shortcut replaces it.
    pub fn set_key(&mut self, vk: VirtualKey) -> Result<bool, ShortcutError> {
        if vk.is_none() {
            return Err(ShortcutError::NullKey);
        }

        if let Some((family, side)) = ModifierFamily::classify(vk) {
            let current = self.slot(family);
            if current == Some(side) {
                return Ok(false);
            }
            if current.is_none() && self.size() >= MAX_SHORTCUT_SIZE {
                return Err(ShortcutError::TooManyKeys(vk));
            }
            *self.slot_mut(family) = Some(side);
            return Ok(true);
        }

        match self.action {
            Some(existing) if existing == vk => Ok(false),
            Some(existing) => Err(ShortcutError::SecondActionKey {
                existing,
                rejected: vk,
            }),
            None if self.size() >= MAX_SHORTCUT_SIZE => Err(ShortcutError::TooManyKeys(vk)),
            None => {
                self.action = Some(vk);
                Ok(true)
            }
        }
    }

    /// Removes a key. Any side of a modifier family clears the whole family.
    pub fn reset_key(&mut self, vk: VirtualKey) {
        if let Some((family, _)) = ModifierFamily::classify(vk) {
            *self.slot_mut(family) = None;
        } else if self.action == Some(vk) {
            self.action = None;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn size(&self) -> usize {
        ModifierFamily::ALL
            .iter()
            .filter(|&&f| self.slot(f).is_some())
            .count()
            + usize::from(self.action.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Modifiers stored without a side, matched by either physical key.
    pub fn side_neutral_modifier_count(&self) -> usize {
        ModifierFamily::ALL
            .iter()
            .filter(|&&f| self.slot(f) == Some(ModifierSide::Common))
            .count()
    }

    /// A shortcut needs an action key and at least one modifier.
    pub fn is_valid(&self) -> bool {
        self.action.is_some() && self.size() > 1
    }

    pub fn action_key(&self) -> VirtualKey {
        self.action.unwrap_or(VirtualKey::NONE)
    }

    pub fn has_action_key(&self) -> bool {
        self.action.is_some()
    }

    pub fn modifier(&self, family: ModifierFamily) -> Option<ModifierSide> {
        self.slot(family)
    }

    /// Code to send for a modifier family. A common Win entry has no code of
    /// its own, so it becomes the side that was actually pressed, or left Win.
    pub fn modifier_key(
        &self,
        family: ModifierFamily,
        win_key_invoked: Option<ModifierSide>,
    ) -> Option<VirtualKey> {
        let side = self.slot(family)?;
        Some(match (family, side) {
            (ModifierFamily::Win, ModifierSide::Common) => match win_key_invoked {
                Some(ModifierSide::Right) => VirtualKey::RWIN,
                _ => VirtualKey::LWIN,
            },
            _ => family.code(side),
        })
    }

    /// Stored codes in Win, Ctrl, Alt, Shift, action order.
    pub fn key_codes(&self) -> Vec<VirtualKey> {
        ModifierFamily::ALL
            .iter()
            .filter_map(|&f| self.slot(f).map(|side| f.code(side)))
            .chain(self.action)
            .collect()
    }

    /// Whether `vk` is one of this shortcut's modifiers, after side expansion.
    pub fn check_modifier(&self, vk: VirtualKey) -> bool {
        match ModifierFamily::classify(vk) {
            Some((family, key_side)) => match self.slot(family) {
                Some(side) => side.accepts(family, vk) || key_side == ModifierSide::Common,
                None => false,
            },
            None => false,
        }
    }

    /// True when exactly this shortcut's modifiers are held: every family in
    /// the shortcut is down on an accepted side and no other family is down.
    pub fn check_modifiers_keyboard_state(&self, input: &dyn Input) -> bool {
        ModifierFamily::ALL.iter().all(|&family| {
            let left = input.get_virtual_key_state(family.left());
            let right = input.get_virtual_key_state(family.right());
            match self.slot(family) {
                Some(ModifierSide::Left) => left,
                Some(ModifierSide::Right) => right,
                Some(ModifierSide::Common) => left || right,
                None => !left && !right,
            }
        })
    }

    /// True when no key outside this shortcut is held. Mouse buttons are ignored.
    pub fn is_keyboard_state_clear_except_shortcut(&self, input: &dyn Input) -> bool {
        (1u32..0xFF).map(VirtualKey).all(|vk| {
            vk.is_mouse_button()
                || Some(vk) == self.action
                || self.check_modifier(vk)
                || !input.get_virtual_key_state(vk)
        })
    }

    /// Families that both shortcuts hold on the same side.
    pub fn common_modifiers_count(&self, other: &Shortcut) -> usize {
        ModifierFamily::ALL
            .iter()
            .filter(|&&f| self.slot(f).is_some() && self.slot(f) == other.slot(f))
            .count()
    }

    /// `;`-separated decimal codes, as stored in configuration files.
    pub fn to_config_string(&self) -> String {
        self.key_codes()
            .iter()
            .map(|vk| vk.code().to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    fn sort_key(&self) -> [u32; 5] {
        let code = |f: ModifierFamily| self.slot(f).map_or(0, |side| f.code(side).code());
        [
            code(ModifierFamily::Win),
            code(ModifierFamily::Ctrl),
            code(ModifierFamily::Alt),
            code(ModifierFamily::Shift),
            self.action.map_or(0, VirtualKey::code),
        ]
    }
}

impl Ord for Shortcut {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Shortcut {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Shortcut {
    type Err = ShortcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map(VirtualKey)
                    .map_err(|_| ShortcutError::Parse(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_keys(&keys)
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.key_codes().iter().map(|vk| vk.name()).collect();
        f.write_str(&names.join(" + "))
    }
}
