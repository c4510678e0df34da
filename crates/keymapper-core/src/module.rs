use crate::config::{ConfigError, ConfigStore, LoadSummary};
use crate::state::RemapState;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("keyboard interception is only available on Windows")]
    Unsupported,
    #[error("keyboard hook is already running")]
    AlreadyRunning,
    #[error("failed to register keyboard hook: {0}")]
    Registration(String),
}

/// The keyboard manager as a whole: the shared state, where its
/// configuration lives, and the hook while interception is enabled.
pub struct KeyboardManagerModule {
    state: Arc<RemapState>,
    store: ConfigStore,
    #[cfg(windows)]
    hook: Option<crate::keyboard_hook::HookThread>,
}

impl KeyboardManagerModule {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(RemapState::new()),
            store: ConfigStore::new(config_dir),
            #[cfg(windows)]
            hook: None,
        }
    }

    pub fn state(&self) -> &Arc<RemapState> {
        &self.state
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Loads whichever configuration `settings.json` names.
    pub fn load_config(&self) -> Result<LoadSummary, ConfigError> {
        let name = self.store.active_configuration()?;
        self.store.load(&self.state, &name)
    }

    /// Re-reads the current configuration from disk.
    pub fn reload(&self) -> Result<LoadSummary, ConfigError> {
        let name = self.state.get_current_config_name();
        self.store.load(&self.state, &name)
    }

    /// Loads configuration `name` and records it as the active one.
    pub fn switch_configuration(&self, name: &str) -> Result<LoadSummary, ConfigError> {
        let summary = self.store.load(&self.state, name)?;
        self.store.set_active_configuration(name)?;
        info!(config = name, "switched configuration");
        Ok(summary)
    }

    pub fn save_config(&self) -> Result<(), ConfigError> {
        let name = self.state.get_current_config_name();
        self.store.save(&self.state, &name)
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(windows)]
        {
            self.hook.is_some()
        }
        #[cfg(not(windows))]
        {
            false
        }
    }

    /// Starts intercepting keyboard input. On failure the module stays usable
    /// and the keyboard behaves as if nothing were installed.
    pub fn enable(&mut self) -> Result<(), HookError> {
        #[cfg(windows)]
        {
            if self.hook.is_some() {
                return Err(HookError::AlreadyRunning);
            }
            let hook = crate::keyboard_hook::HookThread::start(Arc::clone(&self.state))
                .map_err(|err| {
                    error!(error = %err, "keyboard hook registration failed");
                    HookError::Registration(err.to_string())
                })?;
            self.hook = Some(hook);
            info!("keyboard manager enabled");
            Ok(())
        }
        #[cfg(not(windows))]
        {
            error!("keyboard interception is not supported on this platform");
            Err(HookError::Unsupported)
        }
    }

    pub fn disable(&mut self) {
        #[cfg(windows)]
        if let Some(hook) = self.hook.take() {
            hook.stop();
            info!("keyboard manager disabled");
        }
        self.state.clear_registered_key_delays();
        self.state.reset_ui_state();
    }
}

impl Drop for KeyboardManagerModule {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_enable_is_unsupported_off_windows() {
        let dir = tempfile::tempdir().unwrap();
        let mut module = KeyboardManagerModule::new(dir.path());
        assert!(matches!(module.enable(), Err(HookError::Unsupported)));
        assert!(!module.is_enabled());
    }

    #[test]
    fn test_switch_configuration_records_active_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("work.json"),
            r#"{"remapKeys":{"inProcess":[{"originalKeys":"65","newRemapKeys":"66"}]}}"#,
        )
        .unwrap();
        let module = KeyboardManagerModule::new(dir.path());

        let summary = module.switch_configuration("work").unwrap();
        assert_eq!(summary.single_key_rows, 1);
        assert_eq!(module.state().get_current_config_name(), "work");
        assert_eq!(module.store().active_configuration().unwrap(), "work");

        let reloaded = module.reload().unwrap();
        assert_eq!(reloaded, summary);
    }
}
