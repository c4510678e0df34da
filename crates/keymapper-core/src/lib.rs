pub mod config;
pub mod handlers;
pub mod input;
pub mod key_delay;
#[cfg(windows)]
pub mod keyboard_hook;
pub mod keys;
pub mod module;
pub mod pipeline;
pub mod remap_helper;
pub mod remap_table;
pub mod shortcut;
pub mod state;
pub mod types;

pub use input::{Input, MockInput};
pub use keys::{ModifierFamily, ModifierSide, VirtualKey};
pub use module::{HookError, KeyboardManagerModule};
pub use remap_helper::{RemapBufferItem, ValidationOutcome};
pub use shortcut::{Shortcut, ShortcutError};
pub use state::{RemapState, UiEvent, UiState};
pub use types::{HookDecision, KeyEdge, KeyEvent, KeyInput, RemapTarget};
