use serde::{Deserialize, Serialize};
use std::fmt;

/// OS virtual-key code. Left/right modifier variants and their common form
/// are distinct codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualKey(pub u32);

impl VirtualKey {
    pub const NONE: Self = Self(0x00);
    pub const LBUTTON: Self = Self(0x01);
    pub const RBUTTON: Self = Self(0x02);
    pub const MBUTTON: Self = Self(0x04);
    pub const XBUTTON1: Self = Self(0x05);
    pub const XBUTTON2: Self = Self(0x06);
    pub const BACK: Self = Self(0x08);
    pub const TAB: Self = Self(0x09);
    pub const RETURN: Self = Self(0x0D);
    pub const SHIFT: Self = Self(0x10);
    pub const CONTROL: Self = Self(0x11);
    pub const MENU: Self = Self(0x12);
    pub const PAUSE: Self = Self(0x13);
    pub const CAPITAL: Self = Self(0x14);
    pub const ESCAPE: Self = Self(0x1B);
    pub const SPACE: Self = Self(0x20);
    pub const PRIOR: Self = Self(0x21);
    pub const NEXT: Self = Self(0x22);
    pub const END: Self = Self(0x23);
    pub const HOME: Self = Self(0x24);
    pub const LEFT: Self = Self(0x25);
    pub const UP: Self = Self(0x26);
    pub const RIGHT: Self = Self(0x27);
    pub const DOWN: Self = Self(0x28);
    pub const SNAPSHOT: Self = Self(0x2C);
    pub const INSERT: Self = Self(0x2D);
    pub const DELETE: Self = Self(0x2E);
    pub const LWIN: Self = Self(0x5B);
    pub const RWIN: Self = Self(0x5C);
    pub const APPS: Self = Self(0x5D);
    pub const NUMPAD0: Self = Self(0x60);
    pub const F1: Self = Self(0x70);
    pub const F24: Self = Self(0x87);
    pub const NUMLOCK: Self = Self(0x90);
    pub const SCROLL: Self = Self(0x91);
    pub const LSHIFT: Self = Self(0xA0);
    pub const RSHIFT: Self = Self(0xA1);
    pub const LCONTROL: Self = Self(0xA2);
    pub const RCONTROL: Self = Self(0xA3);
    pub const LMENU: Self = Self(0xA4);
    pub const RMENU: Self = Self(0xA5);
    /// Sent between a suppressed press/release pair so the OS does not treat
    /// an isolated Win or Alt release as its menu gesture.
    pub const DUMMY: Self = Self(0xFF);
    /// Remap target that swallows the key.
    pub const DISABLED: Self = Self(0x100);
    /// Either Win key. The OS has no code for this one.
    pub const WIN_BOTH: Self = Self(0x104);

    /// Letter or digit key from its ASCII character.
    pub const fn from_ascii(c: u8) -> Self {
        Self(c.to_ascii_uppercase() as u32)
    }

    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_modifier(self) -> bool {
        ModifierFamily::classify(self).is_some()
    }

    pub fn is_mouse_button(self) -> bool {
        matches!(
            self,
            Self::LBUTTON | Self::RBUTTON | Self::MBUTTON | Self::XBUTTON1 | Self::XBUTTON2
        )
    }

    /// Replaces codes the OS cannot synthesize with one it can.
    pub fn filter_artificial(self) -> Self {
        if self == Self::WIN_BOTH {
            Self::LWIN
        } else {
            self
        }
    }

    pub fn name(self) -> String {
        match key_name(self) {
            Some(name) => name.to_string(),
            None => match self.0 {
                0x30..=0x39 | 0x41..=0x5A => char::from(self.0 as u8).to_string(),
                0x60..=0x69 => format!("Num {}", self.0 - 0x60),
                0x70..=0x87 => format!("F{}", self.0 - 0x6F),
                _ => format!("VK 0x{:02X}", self.0),
            },
        }
    }
}

impl From<u32> for VirtualKey {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// The four modifier families, in the order their key-down events are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModifierFamily {
    Win,
    Ctrl,
    Alt,
    Shift,
}

/// Which physical key of a modifier family a stored shortcut refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierSide {
    Left,
    Right,
    Common,
}

impl ModifierFamily {
    pub const ALL: [ModifierFamily; 4] = [
        ModifierFamily::Win,
        ModifierFamily::Ctrl,
        ModifierFamily::Alt,
        ModifierFamily::Shift,
    ];

    pub const fn left(self) -> VirtualKey {
        match self {
            ModifierFamily::Win => VirtualKey::LWIN,
            ModifierFamily::Ctrl => VirtualKey::LCONTROL,
            ModifierFamily::Alt => VirtualKey::LMENU,
            ModifierFamily::Shift => VirtualKey::LSHIFT,
        }
    }

    pub const fn right(self) -> VirtualKey {
        match self {
            ModifierFamily::Win => VirtualKey::RWIN,
            ModifierFamily::Ctrl => VirtualKey::RCONTROL,
            ModifierFamily::Alt => VirtualKey::RMENU,
            ModifierFamily::Shift => VirtualKey::RSHIFT,
        }
    }

    pub const fn common(self) -> VirtualKey {
        match self {
            ModifierFamily::Win => VirtualKey::WIN_BOTH,
            ModifierFamily::Ctrl => VirtualKey::CONTROL,
            ModifierFamily::Alt => VirtualKey::MENU,
            ModifierFamily::Shift => VirtualKey::SHIFT,
        }
    }

    pub const fn code(self, side: ModifierSide) -> VirtualKey {
        match side {
            ModifierSide::Left => self.left(),
            ModifierSide::Right => self.right(),
            ModifierSide::Common => self.common(),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ModifierFamily::Win => "Win",
            ModifierFamily::Ctrl => "Ctrl",
            ModifierFamily::Alt => "Alt",
            ModifierFamily::Shift => "Shift",
        }
    }

    pub fn classify(vk: VirtualKey) -> Option<(ModifierFamily, ModifierSide)> {
        Self::ALL.iter().find_map(|&family| {
            if vk == family.left() {
                Some((family, ModifierSide::Left))
            } else if vk == family.right() {
                Some((family, ModifierSide::Right))
            } else if vk == family.common() {
                Some((family, ModifierSide::Common))
            } else {
                None
            }
        })
    }
}

impl ModifierSide {
    /// Codes that count as "this modifier is down" when matching live key
    /// state. A common entry accepts either side, a sided entry only itself.
    pub fn expand(self, family: ModifierFamily) -> &'static [VirtualKey] {
        static WIN_ALL: [VirtualKey; 3] = [VirtualKey::WIN_BOTH, VirtualKey::LWIN, VirtualKey::RWIN];
        static CTRL_ALL: [VirtualKey; 3] =
            [VirtualKey::CONTROL, VirtualKey::LCONTROL, VirtualKey::RCONTROL];
        static ALT_ALL: [VirtualKey; 3] = [VirtualKey::MENU, VirtualKey::LMENU, VirtualKey::RMENU];
        static SHIFT_ALL: [VirtualKey; 3] =
            [VirtualKey::SHIFT, VirtualKey::LSHIFT, VirtualKey::RSHIFT];
        static LEFT: [[VirtualKey; 1]; 4] = [
            [VirtualKey::LWIN],
            [VirtualKey::LCONTROL],
            [VirtualKey::LMENU],
            [VirtualKey::LSHIFT],
        ];
        static RIGHT: [[VirtualKey; 1]; 4] = [
            [VirtualKey::RWIN],
            [VirtualKey::RCONTROL],
            [VirtualKey::RMENU],
            [VirtualKey::RSHIFT],
        ];

        let idx = family as usize;
        match self {
            ModifierSide::Left => &LEFT[idx],
            ModifierSide::Right => &RIGHT[idx],
            ModifierSide::Common => match family {
                ModifierFamily::Win => &WIN_ALL,
                ModifierFamily::Ctrl => &CTRL_ALL,
                ModifierFamily::Alt => &ALT_ALL,
                ModifierFamily::Shift => &SHIFT_ALL,
            },
        }
    }

    pub fn accepts(self, family: ModifierFamily, vk: VirtualKey) -> bool {
        self.expand(family).contains(&vk)
    }
}

/// Left and right codes for a common modifier code, used when a table entry
/// keyed on the common form has to be split for live matching.
pub fn split_common_modifier(vk: VirtualKey) -> Option<(VirtualKey, VirtualKey)> {
    match ModifierFamily::classify(vk) {
        Some((family, ModifierSide::Common)) => Some((family.left(), family.right())),
        _ => None,
    }
}

fn key_name(vk: VirtualKey) -> Option<&'static str> {
    match vk.0 {
        0x08 => Some("Backspace"),
        0x09 => Some("Tab"),
        0x0D => Some("Enter"),
        0x10 => Some("Shift"),
        0x11 => Some("Ctrl"),
        0x12 => Some("Alt"),
        0x13 => Some("Pause"),
        0x14 => Some("Caps Lock"),
        0x1B => Some("Esc"),
        0x20 => Some("Space"),
        0x21 => Some("PgUp"),
        0x22 => Some("PgDn"),
        0x23 => Some("End"),
        0x24 => Some("Home"),
        0x25 => Some("Left"),
        0x26 => Some("Up"),
        0x27 => Some("Right"),
        0x28 => Some("Down"),
        0x2C => Some("PrtScn"),
        0x2D => Some("Insert"),
        0x2E => Some("Delete"),
        0x5B => Some("Win (Left)"),
        0x5C => Some("Win (Right)"),
        0x5D => Some("Apps/Menu"),
        0x90 => Some("Num Lock"),
        0x91 => Some("Scroll Lock"),
        0xA0 => Some("Shift (Left)"),
        0xA1 => Some("Shift (Right)"),
        0xA2 => Some("Ctrl (Left)"),
        0xA3 => Some("Ctrl (Right)"),
        0xA4 => Some("Alt (Left)"),
        0xA5 => Some("Alt (Right)"),
        0xBA => Some(";"),
        0xBB => Some("="),
        0xBC => Some(","),
        0xBD => Some("-"),
        0xBE => Some("."),
        0xBF => Some("/"),
        0xC0 => Some("`"),
        0xDB => Some("["),
        0xDC => Some("\\"),
        0xDD => Some("]"),
        0xDE => Some("'"),
        0x100 => Some("Disable"),
        0x104 => Some("Win"),
        _ => None,
    }
}
