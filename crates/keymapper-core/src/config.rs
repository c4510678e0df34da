//! Reading and writing remap configurations.
//!
//! A config directory holds `settings.json`, naming the active configuration,
//! and one `<name>.json` per configuration. Parsing is forgiving: a bad row or
//! section is logged and skipped, only an unreadable file or a document that
//! is not JSON fails the load.

use crate::remap_helper::{
    apply_shortcut_remappings, apply_single_key_remappings, pre_process_remap_table,
    RemapBuffer, RemapBufferItem,
};
use crate::shortcut::Shortcut;
use crate::state::RemapState;
use crate::types::{RemapTarget, DEFAULT_CONFIGURATION};
use crate::keys::VirtualKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} does not name an active configuration", path.display())]
    MissingActiveConfiguration { path: PathBuf },
}

/// Outcome of one parse step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Present(T),
    Absent,
    Malformed(String),
}

impl<T> Parsed<T> {
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Parsed<U>) -> Parsed<U> {
        match self {
            Parsed::Present(v) => f(v),
            Parsed::Absent => Parsed::Absent,
            Parsed::Malformed(reason) => Parsed::Malformed(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        self.and_then(|v| Parsed::Present(f(v)))
    }

    /// Absent becomes malformed, for fields a row cannot do without.
    pub fn required(self, what: &str) -> Parsed<T> {
        match self {
            Parsed::Absent => Parsed::Malformed(format!("missing {}", what)),
            other => other,
        }
    }

    pub fn present(self) -> Option<T> {
        match self {
            Parsed::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Parsed<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Parsed::Present(v),
            Err(err) => Parsed::Malformed(err.to_string()),
        }
    }
}

/// Keeps the rows that parsed, logging the ones that did not.
pub fn skip_malformed_rows<T>(
    section: &str,
    rows: impl IntoIterator<Item = Parsed<T>>,
) -> Vec<T> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(idx, row)| match row {
            Parsed::Present(v) => Some(v),
            Parsed::Absent => None,
            Parsed::Malformed(reason) => {
                warn!(section, row = idx, %reason, "skipping malformed remap row");
                None
            }
        })
        .collect()
}

fn field<'a>(value: &'a Value, name: &str) -> Parsed<&'a Value> {
    match value.get(name) {
        Some(Value::Null) | None => Parsed::Absent,
        Some(v) => Parsed::Present(v),
    }
}

fn string_field<'a>(value: &'a Value, name: &str) -> Parsed<&'a str> {
    field(value, name).and_then(|v| match v.as_str() {
        Some(s) => Parsed::Present(s),
        None => Parsed::Malformed(format!("{} is not a string", name)),
    })
}

fn array_at<'a>(doc: &'a Value, path: &[&str]) -> Parsed<&'a Vec<Value>> {
    let mut current = Parsed::Present(doc);
    for name in path {
        current = current.and_then(|v| field(v, name));
    }
    current.and_then(|v| match v.as_array() {
        Some(rows) => Parsed::Present(rows),
        None => Parsed::Malformed(format!("{} is not an array", path.join("."))),
    })
}

fn section_rows<T>(
    doc: &Value,
    path: &[&str],
    parse_row: impl Fn(&Value) -> Parsed<T>,
) -> Vec<T> {
    let section = path.join(".");
    match array_at(doc, path) {
        Parsed::Present(rows) => skip_malformed_rows(&section, rows.iter().map(parse_row)),
        Parsed::Absent => {
            debug!(section = %section, "section absent");
            Vec::new()
        }
        Parsed::Malformed(reason) => {
            warn!(section = %section, %reason, "skipping malformed section");
            Vec::new()
        }
    }
}

fn parse_single_key_row(row: &Value) -> Parsed<RemapBufferItem> {
    let original = string_field(row, "originalKeys")
        .required("originalKeys")
        .and_then(|s| Parsed::from(s.trim().parse::<u32>().map(VirtualKey)));
    let remap = string_field(row, "newRemapKeys")
        .required("newRemapKeys")
        .and_then(|s| Parsed::from(s.parse::<RemapTarget>()));
    original.and_then(|original| remap.map(|remap| RemapBufferItem::new(original, remap)))
}

fn parse_shortcut_row(row: &Value, with_app: bool) -> Parsed<RemapBufferItem> {
    let original = string_field(row, "originalKeys")
        .required("originalKeys")
        .and_then(|s| Parsed::from(s.parse::<Shortcut>()));
    let remap = string_field(row, "newRemapKeys")
        .required("newRemapKeys")
        .and_then(|s| Parsed::from(s.parse::<RemapTarget>()));
    let app = if with_app {
        string_field(row, "targetApp").required("targetApp")
    } else {
        Parsed::Present("")
    };
    original.and_then(|original| {
        remap.and_then(|remap| app.map(|app| RemapBufferItem::for_app(original, remap, app)))
    })
}

/// Rows of one configuration file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRows {
    pub single_key: RemapBuffer,
    pub shortcuts: RemapBuffer,
}

impl ConfigRows {
    pub fn from_json(doc: &Value) -> Self {
        let single_key = section_rows(doc, &["remapKeys", "inProcess"], parse_single_key_row);
        let mut shortcuts = section_rows(doc, &["remapShortcuts", "global"], |row| {
            parse_shortcut_row(row, false)
        });
        shortcuts.extend(section_rows(doc, &["remapShortcuts", "appSpecific"], |row| {
            parse_shortcut_row(row, true)
        }));
        Self {
            single_key,
            shortcuts,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RemapRow {
    #[serde(rename = "originalKeys")]
    original_keys: String,
    #[serde(rename = "newRemapKeys")]
    new_remap_keys: String,
    #[serde(rename = "targetApp", skip_serializing_if = "Option::is_none", default)]
    target_app: Option<String>,
}

/// Builds the on-disk document from the committed tables. Left/right pairs
/// with the same target are written once, as the common modifier.
pub fn state_to_json(state: &RemapState) -> Value {
    let mut single_key = state.single_key_remaps();
    pre_process_remap_table(&mut single_key);
    let in_process: Vec<RemapRow> = single_key
        .iter()
        .map(|(original, target)| RemapRow {
            original_keys: original.code().to_string(),
            new_remap_keys: target.to_config_string(),
            target_app: None,
        })
        .collect();

    let global: Vec<RemapRow> = state
        .get_shortcut_remap_table(None)
        .iter()
        .map(|(original, remap)| RemapRow {
            original_keys: original.to_config_string(),
            new_remap_keys: remap.target.to_config_string(),
            target_app: None,
        })
        .collect();

    let app_specific: Vec<RemapRow> = state
        .app_specific_shortcut_remaps()
        .iter()
        .flat_map(|(app, table)| {
            table.iter().map(move |(original, remap)| RemapRow {
                original_keys: original.to_config_string(),
                new_remap_keys: remap.target.to_config_string(),
                target_app: Some(app.clone()),
            })
        })
        .collect();

    json!({
        "remapKeys": { "inProcess": in_process },
        "remapShortcuts": { "global": global, "appSpecific": app_specific },
    })
}

/// Decodes a config file, honoring a UTF-8 or UTF-16 byte order mark.
pub fn decode_config_bytes(raw: &[u8]) -> Cow<'_, str> {
    if let Some((enc, bom_len)) = encoding_rs::Encoding::for_bom(raw) {
        debug!("Decoded using BOM: {}", enc.name());
        let (cow, had_errors) = enc.decode_without_bom_handling(&raw[bom_len..]);
        if had_errors {
            warn!("Decode had errors (replacement characters used)");
        }
        return cow;
    }

    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            warn!("config is not valid UTF-8, decoding lossily");
            let (cow, _) = encoding_rs::UTF_8.decode_without_bom_handling(raw);
            cow
        }
    }
}

fn read_json(path: &Path) -> Result<Option<Value>, ConfigError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let text = decode_config_bytes(&raw);
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, text).map_err(io_err)
}

/// Counts of what a load committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub single_key_rows: usize,
    pub shortcut_rows: usize,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Name from `settings.json`, or the default when there is no settings file.
    pub fn active_configuration(&self) -> Result<String, ConfigError> {
        let path = self.settings_path();
        let Some(doc) = read_json(&path)? else {
            debug!(path = %path.display(), "no settings file, using default configuration");
            return Ok(DEFAULT_CONFIGURATION.to_string());
        };
        doc.pointer("/properties/activeConfiguration/value")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingActiveConfiguration { path })
    }

    /// Records `name` as active, keeping any other settings in the file.
    pub fn set_active_configuration(&self, name: &str) -> Result<(), ConfigError> {
        let path = self.settings_path();
        let mut doc = read_json(&path)?.unwrap_or_else(|| Value::Object(Map::new()));
        if !doc.is_object() {
            doc = Value::Object(Map::new());
        }
        let properties = doc
            .as_object_mut()
            .map(|root| root.entry("properties").or_insert_with(|| json!({})));
        match properties {
            Some(Value::Object(props)) => {
                props.insert("activeConfiguration".to_string(), json!({ "value": name }));
            }
            Some(other) => *other = json!({ "activeConfiguration": { "value": name } }),
            None => {}
        }
        write_json(&path, &doc)
    }

    /// Rows of configuration `name`. A missing file has no rows.
    pub fn read_rows(&self, name: &str) -> Result<ConfigRows, ConfigError> {
        let path = self.config_path(name);
        match read_json(&path)? {
            Some(doc) => Ok(ConfigRows::from_json(&doc)),
            None => {
                warn!(path = %path.display(), "configuration file not found, starting empty");
                Ok(ConfigRows::default())
            }
        }
    }

    /// Reads configuration `name` and commits it to `state`. Remapping is
    /// paused for the whole replacement.
    pub fn load(&self, state: &RemapState, name: &str) -> Result<LoadSummary, ConfigError> {
        let rows = self.read_rows(name)?;
        let summary = state.with_remappings_disabled(|| LoadSummary {
            single_key_rows: apply_single_key_remappings(state, &rows.single_key),
            shortcut_rows: apply_shortcut_remappings(state, &rows.shortcuts),
        });
        state.set_current_config_name(name);
        info!(
            config = name,
            single_key = summary.single_key_rows,
            shortcuts = summary.shortcut_rows,
            "configuration loaded"
        );
        Ok(summary)
    }

    /// Writes the committed tables as configuration `name` and makes it active.
    pub fn save(&self, state: &RemapState, name: &str) -> Result<(), ConfigError> {
        write_json(&self.config_path(name), &state_to_json(state))?;
        self.set_active_configuration(name)?;
        state.set_current_config_name(name);
        info!(config = name, "configuration saved");
        Ok(())
    }
}
