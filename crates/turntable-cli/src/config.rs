//! Study configuration – reads/writes `~/.turntable/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use turntable_runtime::{BudgetPolicy, FoilRule, RecallConfig, RecorderConfig, RunnerConfig, TrialConfig};

/// Persisted study configuration stored in `~/.turntable/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging endpoint.  Records go to the tracing log when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_endpoint: Option<String>,

    /// Directory scanned for `.glb` / `.gltf` models.  A built-in demo
    /// catalog is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,

    /// Substrings marking a model as a recall-only foil.
    #[serde(default = "default_foil_markers")]
    pub foil_markers: Vec<String>,

    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,

    /// Model loads after which the viewing phase ends.
    #[serde(default = "default_max_models")]
    pub max_models: usize,

    /// Unlocks `/next` at any time.
    #[serde(default)]
    pub diagnostic_mode: bool,

    /// Rotation per directional step, in degrees.
    #[serde(default = "default_step_degrees")]
    pub step_degrees: f32,

    /// Delay between applying a rotation and the "after" snapshot.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Start every model at the pose derived from its name.
    #[serde(default = "default_true")]
    pub seeded_initial_pose: bool,

    /// SQLite file holding the seen history.  Kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_store_path: Option<PathBuf>,

    /// Fixed shuffle seed for reproducible sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default = "default_budget")]
    pub budget: BudgetPolicy,

    #[serde(default)]
    pub recall: RecallConfig,
}

fn default_foil_markers() -> Vec<String> {
    FoilRule::default().markers().to_vec()
}
fn default_sequence_length() -> usize {
    10
}
fn default_max_models() -> usize {
    10
}
fn default_step_degrees() -> f32 {
    5.0
}
fn default_settle_delay_ms() -> u64 {
    50
}
fn default_true() -> bool {
    true
}
fn default_budget() -> BudgetPolicy {
    BudgetPolicy::Countdown { seconds: 10 }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_endpoint: None,
            catalog_dir: None,
            foil_markers: default_foil_markers(),
            sequence_length: default_sequence_length(),
            max_models: default_max_models(),
            diagnostic_mode: false,
            step_degrees: default_step_degrees(),
            settle_delay_ms: default_settle_delay_ms(),
            seeded_initial_pose: true,
            seen_store_path: None,
            seed: None,
            budget: default_budget(),
            recall: RecallConfig::default(),
        }
    }
}

impl Config {
    /// Runner settings derived from this configuration.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            trial: TrialConfig {
                sequence_length: self.sequence_length,
                max_models: self.max_models,
                budget: self.budget,
                diagnostic_mode: self.diagnostic_mode,
            },
            recorder: RecorderConfig {
                step_degrees: self.step_degrees,
                settle_delay: Duration::from_millis(self.settle_delay_ms),
                ..RecorderConfig::default()
            },
            recall: self.recall.clone(),
            seeded_initial_pose: self.seeded_initial_pose,
            seed: self.seed,
        }
    }

    pub fn foil_rule(&self) -> FoilRule {
        FoilRule::new(self.foil_markers.iter().cloned())
    }

    /// Settings that load fine but cannot produce a complete session.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.sequence_length < self.max_models {
            warnings.push(format!(
                "sequence_length ({}) is below max_models ({}): every session runs out of models before recall",
                self.sequence_length, self.max_models
            ));
        }
        if self.max_models == 0 {
            warnings.push("max_models is 0: the viewing phase ends before any model is shown".to_string());
        }
        warnings
    }
}

/// Return the path to `~/.turntable/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".turntable").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TURNTABLE_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `TURNTABLE_LOG_ENDPOINT` | `log_endpoint` |
/// | `TURNTABLE_CATALOG_DIR` | `catalog_dir` |
/// | `TURNTABLE_SEED` | `seed` |
/// | `TURNTABLE_DIAGNOSTIC` | `diagnostic_mode` (`1`/`true` or `0`/`false`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TURNTABLE_LOG_ENDPOINT") {
        cfg.log_endpoint = if v.trim().is_empty() { None } else { Some(v) };
    }
    if let Ok(v) = std::env::var("TURNTABLE_CATALOG_DIR") {
        cfg.catalog_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("TURNTABLE_SEED")
        && let Ok(seed) = v.trim().parse::<u64>() {
            cfg.seed = Some(seed);
        }
    if let Ok(v) = std::env::var("TURNTABLE_DIAGNOSTIC") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => cfg.diagnostic_mode = true,
            "0" | "false" | "no" => cfg.diagnostic_mode = false,
            _ => {}
        }
    }
}

/// Save the config to disk, creating `~/.turntable/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
