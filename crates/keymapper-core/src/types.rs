use crate::keys::VirtualKey;
use crate::shortcut::{Shortcut, ShortcutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Marker on events sent by the single-key remap handler.
pub const SINGLE_KEY_FLAG: usize = 0x11;
/// Marker on events sent by the shortcut remap handlers.
pub const SHORTCUT_FLAG: usize = 0x101;
/// Marker on events the pipeline must suppress on sight.
pub const SUPPRESS_FLAG: usize = 0x111;

/// How long a registered key must be held to count as a long press.
pub const LONG_PRESS_DELAY: Duration = Duration::from_millis(900);

/// Name of the configuration used when none has been selected.
pub const DEFAULT_CONFIGURATION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyEdge {
    Down,
    Up,
}

/// A key event as delivered by the OS hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk: VirtualKey,
    pub edge: KeyEdge,
    /// Caller-supplied tag. Our own synthesized events carry one of the flags above.
    pub extra_info: usize,
    /// Set by the OS for synthesized input, ours or anyone else's.
    pub injected: bool,
}

impl KeyEvent {
    pub const fn new(vk: VirtualKey, edge: KeyEdge) -> Self {
        Self {
            vk,
            edge,
            extra_info: 0,
            injected: false,
        }
    }

    pub const fn down(vk: VirtualKey) -> Self {
        Self::new(vk, KeyEdge::Down)
    }

    pub const fn up(vk: VirtualKey) -> Self {
        Self::new(vk, KeyEdge::Up)
    }

    pub fn is_down(&self) -> bool {
        self.edge == KeyEdge::Down
    }

    pub fn is_up(&self) -> bool {
        self.edge == KeyEdge::Up
    }

    /// Synthesized by some other program rather than by this one.
    pub fn is_foreign_injected(&self) -> bool {
        self.injected
            && !matches!(
                self.extra_info,
                SINGLE_KEY_FLAG | SHORTCUT_FLAG | SUPPRESS_FLAG
            )
    }
}

/// A key event to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub vk: VirtualKey,
    pub edge: KeyEdge,
    pub extra_info: usize,
}

impl KeyInput {
    pub const fn new(vk: VirtualKey, edge: KeyEdge, extra_info: usize) -> Self {
        Self {
            vk,
            edge,
            extra_info,
        }
    }
}

impl From<KeyInput> for KeyEvent {
    fn from(input: KeyInput) -> Self {
        Self {
            vk: input.vk,
            edge: input.edge,
            extra_info: input.extra_info,
            injected: true,
        }
    }
}

/// What the hook tells the OS to do with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    PassThrough,
    Suppress,
}

/// Result of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Not decided here, try the next stage.
    Continue,
    Suppress,
    PassThrough,
}

/// Opaque top-level window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: Self = Self(0);
}

/// What a key or shortcut is remapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemapTarget {
    Key(VirtualKey),
    Shortcut(Shortcut),
}

impl RemapTarget {
    /// A key target must be non-null, a shortcut target must be complete.
    pub fn is_valid(&self) -> bool {
        match self {
            RemapTarget::Key(vk) => !vk.is_none(),
            RemapTarget::Shortcut(s) => s.is_valid(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, RemapTarget::Key(vk) if *vk == VirtualKey::DISABLED)
    }

    pub fn to_config_string(&self) -> String {
        match self {
            RemapTarget::Key(vk) => vk.code().to_string(),
            RemapTarget::Shortcut(s) => s.to_config_string(),
        }
    }
}

impl Default for RemapTarget {
    fn default() -> Self {
        RemapTarget::Key(VirtualKey::NONE)
    }
}

impl From<VirtualKey> for RemapTarget {
    fn from(vk: VirtualKey) -> Self {
        RemapTarget::Key(vk)
    }
}

impl From<Shortcut> for RemapTarget {
    fn from(s: Shortcut) -> Self {
        RemapTarget::Shortcut(s)
    }
}

impl FromStr for RemapTarget {
    type Err = ShortcutError;

    /// A value containing `;` is a shortcut, anything else a single key code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(';') {
            return s.parse().map(RemapTarget::Shortcut);
        }
        s.trim()
            .parse::<u32>()
            .map(|code| RemapTarget::Key(VirtualKey(code)))
            .map_err(|_| ShortcutError::Parse(s.to_string()))
    }
}

impl fmt::Display for RemapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemapTarget::Key(vk) => write!(f, "{}", vk),
            RemapTarget::Shortcut(s) => write!(f, "{}", s),
        }
    }
}
