//! # rwsconfig - settings of the Relatics webservice client
//!
//! Settings live in `config.yaml` inside a configuration directory. On
//! load, the file is layered over the defaults embedded in the crate,
//! `RELATICS_CONFIG__SECTION__KEY` environment variables are applied on
//! top, and the result is written back so the file always lists every
//! known setting.
//!
//! Keys are case-insensitive: they are stored lowercased and every lookup
//! lowercases the requested path.
//!
//! ```no_run
//! use rwsconfig::get_config;
//!
//! let config = get_config();
//! if !config.get_keep_zip_file()? {
//!     config.set_keep_zip_file(true)?;
//! }
//! println!("log level {}", config.get_log_min_level()?);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

pub mod encryption;

const EMBEDDED_DEFAULTS: &str = include_str!("relatics.yaml");
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Environment variable naming the configuration directory
pub const DIRECTORY_VAR: &str = "RELATICS_CONFIG";
/// Prefix of the per-key environment overrides, path segments split on `__`
pub const OVERRIDE_PREFIX: &str = "RELATICS_CONFIG__";
const DEFAULT_DIRECTORY: &str = ".relatics";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_IMPORT_BASENAME: &str = "relatics_webservice";

lazy_static! {
    static ref SHARED: Arc<Config> = Arc::new(
        Config::load_config("").expect("Relatics configuration could not be loaded")
    );
}

// Boolean setting; anything but a YAML bool reads as the default.
macro_rules! bool_setting {
    ($get:ident, $set:ident, [$($key:literal),+], $default:expr) => {
        pub fn $get(&self) -> Result<bool> {
            Ok(self.get_value(&[$($key),+]).ok().and_then(|v| v.as_bool()).unwrap_or($default))
        }

        pub fn $set(&self, enabled: bool) -> Result<()> {
            self.set_value(&[$($key),+], Value::Bool(enabled))
        }
    };
}

// String setting; a missing or empty value reads as the default.
macro_rules! string_setting {
    ($get:ident, $set:ident, [$($key:literal),+], $default:expr) => {
        pub fn $get(&self) -> Result<String> {
            Ok(self.get_scalar_string(&[$($key),+]).unwrap_or_else(|| $default.to_string()))
        }

        pub fn $set(&self, text: &str) -> Result<()> {
            self.set_value(&[$($key),+], Value::String(text.to_string()))
        }
    };
}

/// A loaded configuration, persisted to `config.yaml` on every change
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Picks and prepares the configuration directory
    ///
    /// In order of preference: `directory` when not empty, the
    /// `RELATICS_CONFIG` variable, an existing `.relatics` in the working
    /// directory, an existing `~/.relatics`. When none applies, `.relatics`
    /// is created in the working directory.
    ///
    /// The chosen directory must be readable and writable.
    pub fn config_dir(directory: &str) -> Result<String> {
        let chosen = Self::choose_directory(directory);
        Self::ensure_usable(Path::new(&chosen))
            .with_context(|| format!("configuration directory {} is not usable", chosen))?;
        Ok(chosen)
    }

    fn choose_directory(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }
        if let Ok(from_env) = env::var(DIRECTORY_VAR) {
            debug!(path = %from_env, "configuration directory taken from {}", DIRECTORY_VAR);
            return from_env;
        }

        let local = PathBuf::from(DEFAULT_DIRECTORY);
        let in_home = dirs::home_dir().map(|home| home.join(DEFAULT_DIRECTORY));
        std::iter::once(local)
            .chain(in_home)
            .find(|candidate| candidate.exists())
            .map(|found| found.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_DIRECTORY.to_string())
    }

    fn ensure_usable(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(anyhow!("{} exists but is not a directory", dir.display()));
        }

        let marker = dir.join(".rwsconfig_write_check");
        fs::write(&marker, b"")?;
        fs::remove_file(&marker)?;
        fs::read_dir(dir)?;
        Ok(())
    }

    /// Loads `config.yaml` from the configuration directory
    ///
    /// Pass an empty `directory` to let [`Config::config_dir`] pick one.
    /// A missing file is not an error: the embedded defaults are used and
    /// written out.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        let path = Path::new(&config_dir).join(CONFIG_FILE_NAME);
        info!(directory = %config_dir, "Loading Relatics configuration");

        let mut tree = lowercase_keys(serde_yaml::from_str(EMBEDDED_DEFAULTS)?);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let user: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("invalid YAML in {}", path.display()))?;
                overlay(&mut tree, lowercase_keys(user));
                debug!(file = %path.display(), "user settings merged");
            }
            Err(_) => info!(file = %path.display(), "No configuration file yet, using defaults"),
        }

        for (name, raw) in env::vars() {
            let Some(rest) = name.strip_prefix(OVERRIDE_PREFIX) else {
                continue;
            };
            let keys: Vec<&str> = rest.split("__").collect();
            // "42" becomes a number, "true" a bool, anything unparsable stays text
            let value = serde_yaml::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
            if let Err(e) = insert_at(&mut tree, &keys, value) {
                warn!(variable = %name, "environment override skipped: {}", e);
            }
        }

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(tree),
        };
        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`; relative managed dirs resolve against it
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    fn tree(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("configuration mutex poisoned"))
    }

    /// Writes the whole tree back to `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.tree()?)?;
        fs::write(&self.path, yaml)
            .with_context(|| format!("cannot write {}", self.path.display()))
    }

    /// Stores `value` under `path`, creating intermediate sections, then saves
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        insert_at(&mut *self.tree()?, path, value)?;
        self.save()
    }

    /// Reads the value under `path`; a missing key is an error
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let tree = self.tree()?;
        lookup(&*tree, path).cloned()
    }

    /// Text of the scalar under `path`, `None` when missing or empty
    ///
    /// Numbers and booleans are rendered as written: an unquoted
    /// `workspace_id: 12345` reads as `"12345"`.
    pub fn get_scalar_string(&self, path: &[&str]) -> Option<String> {
        self.get_value(path)
            .ok()
            .as_ref()
            .and_then(scalar_text)
            .filter(|s| !s.is_empty())
    }

    /// Returns a directory configured under `path`, creating it on disk
    ///
    /// When nothing is configured, `default` is stored first. Relative
    /// values are taken from the configuration directory.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let configured = match self.get_scalar_string(path) {
            Some(dir) => dir,
            None => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let resolved = Path::new(&self.config_dir).join(&configured);
        if !resolved.is_dir() {
            fs::create_dir_all(&resolved)?;
            info!(directory = %resolved.display(), "Created managed directory");
        }
        Ok(resolved.to_string_lossy().into_owned())
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// User agent sent with every request, `None` when left empty
    pub fn get_user_agent(&self) -> Result<Option<String>> {
        Ok(self.get_scalar_string(&["relatics", "user_agent"]))
    }

    pub fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.set_value(
            &["relatics", "user_agent"],
            Value::String(user_agent.to_string()),
        )
    }

    bool_setting!(get_keep_zip_file, set_keep_zip_file, ["import", "keep_zip_file"], false);

    string_setting!(
        get_import_basename,
        set_import_basename,
        ["import", "basename"],
        DEFAULT_IMPORT_BASENAME
    );

    string_setting!(
        get_log_min_level,
        set_log_min_level,
        ["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );
}

/// Shared configuration, loaded from the default location on first use
pub fn get_config() -> Arc<Config> {
    Arc::clone(&SHARED)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn key(segment: &str) -> Value {
    Value::String(segment.to_lowercase())
}

fn lookup<'a>(tree: &'a Value, path: &[&str]) -> Result<&'a Value> {
    path.iter().enumerate().try_fold(tree, |node, (depth, segment)| {
        let section = node
            .as_mapping()
            .ok_or_else(|| anyhow!("{} is a value, not a section", path[..depth].join(".")))?;
        section
            .get(key(segment))
            .ok_or_else(|| anyhow!("no setting at {}", path[..=depth].join(".")))
    })
}

fn insert_at(tree: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *tree = value;
        return Ok(());
    };

    let mut node = tree;
    for segment in parents {
        let section = node
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("cannot create {}: parent is a value", segment))?;
        node = section
            .entry(key(segment))
            .or_insert(Value::Mapping(Mapping::new()));
    }
    node.as_mapping_mut()
        .ok_or_else(|| anyhow!("cannot set {}: parent is a value", last))?
        .insert(key(last), value);
    Ok(())
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(name) => Value::String(name.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Layers `upper` over `base`: sections merge key by key, anything else replaces
fn overlay(base: &mut Value, upper: Value) {
    match (base, upper) {
        (Value::Mapping(below), Value::Mapping(above)) => {
            for (k, v) in above {
                match below.get_mut(&k) {
                    Some(existing) => overlay(existing, v),
                    None => {
                        below.insert(k, v);
                    }
                }
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_overlay_merges_sections() {
        let mut base = yaml("a:\n  b: 1\n  c: 2\nd: [1, 2]\n");
        overlay(&mut base, yaml("a:\n  c: 3\nd: [4]\ne: x\n"));

        assert_eq!(base["a"]["b"].as_i64(), Some(1));
        assert_eq!(base["a"]["c"].as_i64(), Some(3));
        assert_eq!(base["d"], yaml("[4]"));
        assert_eq!(base["e"].as_str(), Some("x"));
    }

    #[test]
    fn test_lowercase_keys() {
        let lowered = lowercase_keys(yaml("Relatics:\n  Workspace_ID: abc\n"));
        assert_eq!(lowered["relatics"]["workspace_id"].as_str(), Some("abc"));
    }

    #[test]
    fn test_insert_then_lookup_ignores_case() {
        let mut tree = Value::Mapping(Mapping::new());
        insert_at(&mut tree, &["A", "b"], Value::Bool(true)).unwrap();

        assert_eq!(lookup(&tree, &["a", "B"]).unwrap(), &Value::Bool(true));
        assert!(lookup(&tree, &["a", "missing"]).is_err());
        assert!(lookup(&tree, &["a", "b", "deeper"]).is_err());
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&yaml("12345")).as_deref(), Some("12345"));
        assert_eq!(scalar_text(&yaml("4.5")).as_deref(), Some("4.5"));
        assert_eq!(scalar_text(&yaml("true")).as_deref(), Some("true"));
        assert_eq!(scalar_text(&yaml("abc")).as_deref(), Some("abc"));
        assert_eq!(scalar_text(&yaml("[1, 2]")), None);
        assert_eq!(scalar_text(&Value::Null), None);
    }

    #[test]
    fn test_insert_below_scalar_fails() {
        let mut tree = yaml("a: 1\n");
        assert!(insert_at(&mut tree, &["a", "b"], Value::Bool(true)).is_err());
    }
}
