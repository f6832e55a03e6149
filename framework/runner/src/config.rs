use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use truapi_client::prelude::LinkPolicy;
use truapi_core::prelude::{LaunchError, LaunchResult};

/// Default location of the local configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "truapi.json";

/// Weights are percentages, so they have to add up to this.
const DISTRIBUTION_TOTAL: f64 = 100.0;

fn default_vusers() -> u32 {
    LinkPolicy::default().vusers
}

/// Load policy pushed onto the script-test link.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Seconds.
    pub duration: u64,
    pub pacing: f64,
    /// Seconds.
    pub ramp_up: u64,
    /// Seconds.
    pub tear_down: u64,
    #[serde(default = "default_vusers")]
    pub vusers: u32,
}

impl Policy {
    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            duration: self.duration,
            pacing: self.pacing,
            ramp_up: self.ramp_up,
            tear_down: self.tear_down,
            vusers: self.vusers,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    remote: RemoteSection,
}

#[derive(Debug, Deserialize)]
struct RemoteSection {
    policy: Policy,
    distribution: BTreeMap<String, f64>,
}

/// The `remote` section of the local configuration file, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    /// The file this was loaded from, for error reporting.
    pub source: PathBuf,
    pub policy: Policy,
    /// Region name to percentage of virtual users.
    pub distribution: BTreeMap<String, f64>,
}

/// Load and validate the configuration file. TOML is used for `.toml` files, JSON otherwise.
pub fn load_config(path: &Path) -> LaunchResult<RemoteConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LaunchError::config(path, format!("cannot read file: {e}")))?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let file: ConfigFile = if is_toml {
        toml::from_str(&content).map_err(|e| LaunchError::config(path, e.to_string()))?
    } else {
        serde_json::from_str(&content).map_err(|e| LaunchError::config(path, e.to_string()))?
    };

    let config = RemoteConfig {
        source: path.to_path_buf(),
        policy: file.remote.policy,
        distribution: file.remote.distribution,
    };
    validate(&config)?;

    log::debug!("loaded configuration from {}: {:?}", path.display(), config);

    Ok(config)
}

fn validate(config: &RemoteConfig) -> LaunchResult<()> {
    let fail = |reason: String| Err(LaunchError::config(&config.source, reason));

    if config.distribution.is_empty() {
        return fail("remote.distribution must name at least one region".to_string());
    }

    for (region, weight) in &config.distribution {
        if !(0.0..=DISTRIBUTION_TOTAL).contains(weight) {
            return fail(format!(
                "remote.distribution.{region} must be between 0 and 100, got {weight}"
            ));
        }
    }

    let total = config.distribution.values().sum::<f64>();
    if (total - DISTRIBUTION_TOTAL).abs() > 0.01 {
        return fail(format!(
            "remote.distribution weights must add up to 100, got {total}"
        ));
    }

    if config.policy.pacing < 0.0 {
        return fail("remote.policy.pacing must not be negative".to_string());
    }

    Ok(())
}
