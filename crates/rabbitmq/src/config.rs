//! Layered configuration management for the broker's native config file.
//!
//! The effective configuration is composed from three layers: the base
//! document saved verbatim at provisioning time, a user override layer, and
//! a system override layer. When the same key appears in multiple layers the
//! system layer wins over the user layer, which wins over the base document.
//! Each override layer is persisted as its own file in a revision
//! subdirectory so it can be reapplied or rolled back independently.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

/// Key whose pairs accumulate across override patches instead of being
/// replaced wholesale.
pub const RENAME_COMMAND_KEY: &str = "rename-command";

/// Subdirectory of the config directory holding the override layer files.
const OVERRIDES_SUB_DIR: &str = "overrides";

const SYSTEM_LAYER_FILE: &str = "system.json";
const USER_LAYER_FILE: &str = "user.json";

/// A single configuration value.
///
/// The broker's file format is line-oriented with whitespace-separated
/// tokens. Boolean-like and empty tokens are normalized during parse and
/// denormalized on serialize; the mapping is fixed and round-trips exactly:
/// `yes`/`no` become booleans and the quoted empty string `''` becomes null.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A boolean setting, written as `yes` or `no`.
    Bool(bool),

    /// A bare string token.
    Str(String),

    /// An ordered list of tokens (or, for accumulating keys, of pairs).
    List(Vec<ConfigValue>),

    /// The quoted empty string `''`.
    Null,
}

impl ConfigValue {
    fn from_token(token: &str) -> Self {
        match token {
            "yes" => Self::Bool(true),
            "no" => Self::Bool(false),
            "''" => Self::Null,
            _ => Self::Str(token.to_string()),
        }
    }

    fn push_tokens(&self, tokens: &mut Vec<String>) {
        match self {
            Self::Bool(true) => tokens.push("yes".to_string()),
            Self::Bool(false) => tokens.push("no".to_string()),
            Self::Null => tokens.push("''".to_string()),
            Self::Str(s) => tokens.push(s.clone()),
            Self::List(items) => {
                for item in items {
                    item.push_tokens(tokens);
                }
            }
        }
    }

    /// Unwraps a single-element list to its element; any other value is
    /// returned unchanged.
    #[must_use]
    pub fn unpack_singleton(self) -> Self {
        match self {
            Self::List(mut items) if items.len() == 1 => items.remove(0),
            other => other,
        }
    }

    /// Whether this value is a list of lists, e.g. accumulated
    /// `rename-command` pairs.
    fn is_nested_list(&self) -> bool {
        match self {
            Self::List(items) => {
                !items.is_empty() && items.iter().all(|i| matches!(i, Self::List(_)))
            }
            _ => false,
        }
    }
}

/// A patch of key/value settings applied to one override layer.
pub type ConfigPatch = BTreeMap<String, ConfigValue>;

/// An ordered configuration document.
///
/// Duplicate keys are permitted; `rename-command` legitimately repeats, one
/// line per renamed command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDocument {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigDocument {
    /// Parses a document from the broker's native file format.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };

            let values: Vec<ConfigValue> = tokens.map(ConfigValue::from_token).collect();
            let value = match values.len() {
                1 => {
                    let mut values = values;
                    values.remove(0)
                }
                _ => ConfigValue::List(values),
            };

            entries.push((key.to_string(), value));
        }

        Self { entries }
    }

    /// Serializes the document back to the native file format.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();

        for (key, value) in &self.entries {
            if value.is_nested_list() {
                // One line per inner list, all under the same key.
                if let ConfigValue::List(items) = value {
                    for item in items {
                        out.push_str(&Self::line(key, item));
                    }
                }
            } else {
                out.push_str(&Self::line(key, value));
            }
        }

        out
    }

    fn line(key: &str, value: &ConfigValue) -> String {
        let mut tokens = vec![key.to_string()];
        value.push_tokens(&mut tokens);
        let mut line = tokens.join(" ");
        line.push('\n');
        line
    }

    /// Returns the value for `key`.
    ///
    /// A key occurring once yields its value directly; a key occurring on
    /// multiple lines yields the list of per-line values; an absent key
    /// yields `None` (not an error).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let mut values: Vec<ConfigValue> = self
            .entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect();

        match values.len() {
            0 => None,
            1 => Some(values.remove(0)),
            _ => Some(ConfigValue::List(values)),
        }
    }

    /// Replaces all occurrences of `key` with the entries expanded from
    /// `value`, preserving the position of the first occurrence.
    pub fn replace_key(&mut self, key: &str, value: &ConfigValue) {
        let position = self.entries.iter().position(|(k, _)| k == key);
        self.entries.retain(|(k, _)| k != key);

        let expanded: Vec<(String, ConfigValue)> = if value.is_nested_list() {
            match value {
                ConfigValue::List(items) => items
                    .iter()
                    .map(|item| (key.to_string(), item.clone()))
                    .collect(),
                _ => unreachable!(),
            }
        } else {
            vec![(key.to_string(), value.clone())]
        };

        match position {
            Some(index) if index <= self.entries.len() => {
                self.entries.splice(index..index, expanded);
            }
            _ => self.entries.extend(expanded),
        }
    }

    /// Applies a patch, key-wise replacing existing entries.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        for (key, value) in patch {
            self.replace_key(key, value);
        }
    }

    /// Whether the document has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The named override layers.
#[derive(Clone, Copy, Debug)]
enum Layer {
    System,
    User,
}

impl Layer {
    const fn file_name(self) -> &'static str {
        match self {
            Self::System => SYSTEM_LAYER_FILE,
            Self::User => USER_LAYER_FILE,
        }
    }
}

/// Manages the broker's base configuration file and its override layers.
pub struct ConfigurationManager {
    base_path: PathBuf,
    owner: Option<String>,
    revision_dir: PathBuf,
}

impl ConfigurationManager {
    /// Creates a manager for the given base config path.
    ///
    /// Override layers live in `revision_dir` when given, otherwise in an
    /// `overrides` subdirectory next to the base file. When `owner` is set,
    /// the base file is chowned to that account on save.
    #[must_use]
    pub fn new(base_path: PathBuf, revision_dir: Option<PathBuf>, owner: Option<String>) -> Self {
        let revision_dir = revision_dir.unwrap_or_else(|| {
            base_path
                .parent()
                .map_or_else(|| PathBuf::from(OVERRIDES_SUB_DIR), Path::to_path_buf)
                .join(OVERRIDES_SUB_DIR)
        });

        Self {
            base_path,
            owner,
            revision_dir,
        }
    }

    /// Reads the base document plus all override layers and composes the
    /// effective configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigUnreadable`] if the base file is missing or
    /// corrupt after provisioning. Before first provisioning (no base file,
    /// no override layers) an empty document is returned instead.
    pub fn load_effective(&self) -> Result<ConfigDocument> {
        let mut document = match std::fs::read(&self.base_path) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| Error::ConfigUnreadable)?;
                ConfigDocument::parse(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.has_layer(Layer::System) || self.has_layer(Layer::User) {
                    return Err(Error::ConfigUnreadable);
                }

                return Ok(ConfigDocument::default());
            }
            Err(_) => return Err(Error::ConfigUnreadable),
        };

        // User layer first so the system layer wins on colliding keys.
        document.apply_patch(&self.load_layer(Layer::User)?);
        document.apply_patch(&self.load_layer(Layer::System)?);

        Ok(document)
    }

    /// Writes the base configuration verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the file cannot be written
    /// with the required ownership, or [`Error::Io`] for other I/O failures.
    pub fn save_base(&self, content: &[u8]) -> Result<()> {
        debug!("saving base configuration to {}", self.base_path.display());

        self.write_atomic(&self.base_path, content)?;
        self.apply_ownership(&self.base_path)
    }

    /// Merges `patch` into the system override layer and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer file cannot be read or written.
    pub fn apply_system_override(&self, patch: &ConfigPatch) -> Result<()> {
        self.apply_override(Layer::System, patch)
    }

    /// Merges `patch` into the user override layer and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer file cannot be read or written.
    pub fn apply_user_override(&self, patch: &ConfigPatch) -> Result<()> {
        self.apply_override(Layer::User, patch)
    }

    /// Removes the system override layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer file cannot be removed.
    pub fn remove_system_override(&self) -> Result<()> {
        self.remove_layer(Layer::System)
    }

    /// Removes the user override layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer file cannot be removed.
    pub fn remove_user_override(&self) -> Result<()> {
        self.remove_layer(Layer::User)
    }

    /// Looks up `key` in the effective configuration, unwrapping
    /// single-element lists to their value.
    ///
    /// # Errors
    ///
    /// Returns an error if the effective configuration cannot be read.
    pub fn get_value(&self, key: &str) -> Result<Option<ConfigValue>> {
        Ok(self
            .load_effective()?
            .get(key)
            .map(ConfigValue::unpack_singleton))
    }

    fn apply_override(&self, layer: Layer, patch: &ConfigPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut current = self.load_layer(layer)?;

        for (key, value) in patch {
            if key == RENAME_COMMAND_KEY {
                accumulate_rename_pair(&mut current, value);
            } else {
                current.insert(key.clone(), value.clone());
            }
        }

        let json =
            serde_json::to_vec_pretty(&current).map_err(|e| Error::Io("layer encode", e.into()))?;
        self.write_atomic(&self.layer_path(layer), &json)
    }

    fn layer_path(&self, layer: Layer) -> PathBuf {
        self.revision_dir.join(layer.file_name())
    }

    fn has_layer(&self, layer: Layer) -> bool {
        self.layer_path(layer).exists()
    }

    fn load_layer(&self, layer: Layer) -> Result<ConfigPatch> {
        match std::fs::read(self.layer_path(layer)) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::Io("layer decode", e.into()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigPatch::new()),
            Err(e) => Err(Error::Io("failed to read override layer", e)),
        }
    }

    fn remove_layer(&self, layer: Layer) -> Result<()> {
        match std::fs::remove_file(self.layer_path(layer)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io("failed to remove override layer", e)),
        }
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(map_write_error)?;

        let mut temp = NamedTempFile::new_in(dir).map_err(map_write_error)?;
        temp.write_all(content).map_err(map_write_error)?;
        temp.persist(path)
            .map_err(|e| map_write_error(e.error))
            .map(|_| ())
    }

    fn apply_ownership(&self, path: &Path) -> Result<()> {
        let Some(owner) = &self.owner else {
            return Ok(());
        };

        let user = nix::unistd::User::from_name(owner)
            .map_err(|e| Error::Io("failed to look up config owner", e.into()))?
            .ok_or(Error::PermissionDenied)?;

        nix::unistd::chown(path, Some(user.uid), Some(user.gid)).map_err(|e| match e {
            nix::errno::Errno::EPERM | nix::errno::Errno::EACCES => Error::PermissionDenied,
            other => Error::Io("failed to chown config file", other.into()),
        })
    }
}

/// Merges one `[old, new]` pair into the accumulated `rename-command` value.
///
/// Pairs accumulate rather than replace, with one exception that keeps the
/// history bounded: a pair whose canonical name matches an existing pair
/// supersedes that pair.
fn accumulate_rename_pair(layer: &mut ConfigPatch, pair: &ConfigValue) {
    let mut pairs: Vec<ConfigValue> = match layer.remove(RENAME_COMMAND_KEY) {
        Some(existing) if existing.is_nested_list() => match existing {
            ConfigValue::List(items) => items,
            _ => unreachable!(),
        },
        Some(existing) => vec![existing],
        None => Vec::new(),
    };

    let canonical = |value: &ConfigValue| -> Option<ConfigValue> {
        match value {
            ConfigValue::List(items) => items.first().cloned(),
            _ => None,
        }
    };

    if let Some(name) = canonical(pair) {
        pairs.retain(|existing| canonical(existing) != Some(name.clone()));
    }

    pairs.push(pair.clone());
    layer.insert(
        RENAME_COMMAND_KEY.to_string(),
        ConfigValue::List(pairs),
    );
}

fn map_write_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::PermissionDenied
    } else {
        Error::Io("failed to write configuration", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ConfigurationManager {
        ConfigurationManager::new(dir.path().join("rabbitmq.conf"), None, None)
    }

    #[test]
    fn token_mapping_round_trips() {
        let text = "daemonize yes\nsupervised no\nrequirepass ''\nmaxmemory 2gb\n";
        let document = ConfigDocument::parse(text);

        assert_eq!(document.get("daemonize"), Some(ConfigValue::Bool(true)));
        assert_eq!(document.get("supervised"), Some(ConfigValue::Bool(false)));
        assert_eq!(document.get("requirepass"), Some(ConfigValue::Null));
        assert_eq!(document.serialize(), text);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let document = ConfigDocument::parse("# a comment\n\nport 5672\n");
        assert_eq!(
            document.get("port"),
            Some(ConfigValue::Str("5672".to_string()))
        );
    }

    #[test]
    fn multi_token_lines_parse_to_lists() {
        let document = ConfigDocument::parse("save 900 1\n");
        assert_eq!(
            document.get("save"),
            Some(ConfigValue::List(vec![
                ConfigValue::Str("900".to_string()),
                ConfigValue::Str("1".to_string()),
            ]))
        );
        assert_eq!(document.serialize(), "save 900 1\n");
    }

    #[test]
    fn absent_key_is_none_not_an_error() {
        let document = ConfigDocument::parse("port 5672\n");
        assert_eq!(document.get("missing"), None);
    }

    #[test]
    fn load_effective_is_empty_before_provisioning() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        assert!(manager.load_effective().unwrap().is_empty());
    }

    #[test]
    fn missing_base_after_provisioning_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let mut patch = ConfigPatch::new();
        patch.insert("daemonize".to_string(), ConfigValue::Bool(true));
        manager.apply_system_override(&patch).unwrap();

        assert!(matches!(
            manager.load_effective(),
            Err(Error::ConfigUnreadable)
        ));
    }

    #[test]
    fn save_base_round_trips_through_load_effective() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let content = "daemonize yes\nsupervised no\nrequirepass ''\n";
        manager.save_base(content.as_bytes()).unwrap();

        assert_eq!(manager.load_effective().unwrap().serialize(), content);
    }

    #[test]
    fn system_override_wins_over_user_override_and_base() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"maxmemory 1gb\n").unwrap();

        let mut user = ConfigPatch::new();
        user.insert(
            "maxmemory".to_string(),
            ConfigValue::Str("2gb".to_string()),
        );
        manager.apply_user_override(&user).unwrap();

        let mut system = ConfigPatch::new();
        system.insert(
            "maxmemory".to_string(),
            ConfigValue::Str("4gb".to_string()),
        );
        manager.apply_system_override(&system).unwrap();

        assert_eq!(
            manager.get_value("maxmemory").unwrap(),
            Some(ConfigValue::Str("4gb".to_string()))
        );
    }

    #[test]
    fn repeated_identical_patches_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"port 5672\n").unwrap();

        let mut patch = ConfigPatch::new();
        patch.insert("daemonize".to_string(), ConfigValue::Bool(true));
        manager.apply_system_override(&patch).unwrap();
        let first = manager.load_effective().unwrap();

        manager.apply_system_override(&patch).unwrap();
        assert_eq!(manager.load_effective().unwrap(), first);
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"port 5672\n").unwrap();

        manager.apply_user_override(&ConfigPatch::new()).unwrap();
        assert!(!dir.path().join("overrides").join("user.json").exists());
    }

    #[test]
    fn rename_command_pairs_accumulate() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"port 5672\n").unwrap();

        let pair = |old: &str, new: &str| {
            let mut patch = ConfigPatch::new();
            patch.insert(
                RENAME_COMMAND_KEY.to_string(),
                ConfigValue::List(vec![
                    ConfigValue::Str(old.to_string()),
                    ConfigValue::Str(new.to_string()),
                ]),
            );
            patch
        };

        manager.apply_system_override(&pair("CONFIG", "abc123")).unwrap();
        manager.apply_system_override(&pair("SHUTDOWN", "xyz789")).unwrap();

        let value = manager.get_value(RENAME_COMMAND_KEY).unwrap().unwrap();
        let ConfigValue::List(pairs) = value else {
            panic!("expected accumulated pairs");
        };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn rename_pair_for_same_command_supersedes_previous() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"port 5672\n").unwrap();

        let pair = |new: &str| {
            let mut patch = ConfigPatch::new();
            patch.insert(
                RENAME_COMMAND_KEY.to_string(),
                ConfigValue::List(vec![
                    ConfigValue::Str("CONFIG".to_string()),
                    ConfigValue::Str(new.to_string()),
                ]),
            );
            patch
        };

        manager.apply_system_override(&pair("first")).unwrap();
        manager.apply_system_override(&pair("second")).unwrap();

        let value = manager.get_value(RENAME_COMMAND_KEY).unwrap().unwrap();
        assert_eq!(
            value,
            ConfigValue::List(vec![
                ConfigValue::Str("CONFIG".to_string()),
                ConfigValue::Str("second".to_string()),
            ])
        );
    }

    #[test]
    fn get_value_unpacks_single_element_lists() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"appendonly yes\nsave 900 1\n").unwrap();

        assert_eq!(
            manager.get_value("appendonly").unwrap(),
            Some(ConfigValue::Bool(true))
        );
        assert_eq!(
            manager.get_value("save").unwrap(),
            Some(ConfigValue::List(vec![
                ConfigValue::Str("900".to_string()),
                ConfigValue::Str("1".to_string()),
            ]))
        );
    }

    #[test]
    fn removed_layer_no_longer_contributes() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_base(b"maxmemory 1gb\n").unwrap();

        let mut patch = ConfigPatch::new();
        patch.insert(
            "maxmemory".to_string(),
            ConfigValue::Str("4gb".to_string()),
        );
        manager.apply_system_override(&patch).unwrap();
        manager.remove_system_override().unwrap();

        assert_eq!(
            manager.get_value("maxmemory").unwrap(),
            Some(ConfigValue::Str("1gb".to_string()))
        );
    }
}
