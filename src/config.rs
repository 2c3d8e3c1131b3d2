// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capability ceilings of the hardware generations and the scheduler
//! tunables.
//!
//! Generations are described as data: a [`HardwareProfile`] names the number
//! of IPU units and the resolution ceilings, and every code path reads the
//! ceilings from it. Profiles can be picked by name or loaded from JSON:
//!
//! ```json
//! {
//!     "profile": "imx6q",
//!     "workers": 4,
//!     "default_timeout_ms": 1000,
//!     "capabilities": { "max_out_width": 1024, "max_out_height": 1024 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Default budget of a task when the caller sets none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeouts below this are replaced by the default.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(40);

/// Kept back from the remaining budget when blocking on a hardware slot so
/// the task still has time to report.
pub const RESOURCE_MARGIN: Duration = Duration::from_millis(20);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown hardware profile '{0}'")]
    UnknownProfile(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resolution ceilings of one hardware generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub max_in_width: u32,
    pub max_in_height: u32,
    /// Largest output one resizer pass can produce; larger outputs are split.
    pub max_out_width: u32,
    pub max_out_height: u32,
    /// Widest input line the deinterlacer can buffer.
    pub max_vdi_in_width: u32,
    /// Largest input/output ratio of the resizer along one axis.
    pub max_downsize: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            max_in_width: 4096,
            max_in_height: 4096,
            max_out_width: 1024,
            max_out_height: 1024,
            max_vdi_in_width: 968,
            max_downsize: 8,
        }
    }
}

/// A hardware generation: how many IPU units it has and what they can do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub name: String,
    /// Each unit offers two execution slots.
    pub units: u8,
    pub capabilities: Capabilities,
}

impl HardwareProfile {
    pub const PRESETS: [&'static str; 4] = ["imx51", "imx53", "imx6dl", "imx6q"];

    pub fn preset(name: &str) -> Option<Self> {
        let legacy = Capabilities {
            max_in_width: 2048,
            max_in_height: 2048,
            max_vdi_in_width: 720,
            ..Capabilities::default()
        };
        let (units, capabilities) = match name {
            "imx51" | "imx53" => (1, legacy),
            "imx6dl" => (1, Capabilities::default()),
            "imx6q" => (2, Capabilities::default()),
            _ => return None,
        };
        Some(HardwareProfile {
            name: name.to_string(),
            units,
            capabilities,
        })
    }

    pub fn slots(&self) -> usize {
        self.units as usize * 2
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        HardwareProfile {
            name: "imx6q".to_string(),
            units: 2,
            capabilities: Capabilities::default(),
        }
    }
}

/// Everything the scheduler needs to start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub profile: HardwareProfile,
    /// Worker threads; one per hardware slot when `None`.
    pub workers: Option<usize>,
    pub default_timeout: Duration,
    pub min_timeout: Duration,
    pub resource_margin: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig::new(HardwareProfile::default())
    }
}

/// Ceilings named in a config file; absent keys keep the profile's value.
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct CapabilityOverrides {
    max_in_width: Option<u32>,
    max_in_height: Option<u32>,
    max_out_width: Option<u32>,
    max_out_height: Option<u32>,
    max_vdi_in_width: Option<u32>,
    max_downsize: Option<u32>,
}

impl CapabilityOverrides {
    fn apply(self, caps: &mut Capabilities) {
        let fields = [
            (self.max_in_width, &mut caps.max_in_width),
            (self.max_in_height, &mut caps.max_in_height),
            (self.max_out_width, &mut caps.max_out_width),
            (self.max_out_height, &mut caps.max_out_height),
            (self.max_vdi_in_width, &mut caps.max_vdi_in_width),
            (self.max_downsize, &mut caps.max_downsize),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    profile: Option<String>,
    units: Option<u8>,
    capabilities: CapabilityOverrides,
    workers: Option<usize>,
    default_timeout_ms: Option<u64>,
    min_timeout_ms: Option<u64>,
    resource_margin_ms: Option<u64>,
}

impl SchedulerConfig {
    pub fn new(profile: HardwareProfile) -> Self {
        SchedulerConfig {
            profile,
            workers: None,
            default_timeout: DEFAULT_TIMEOUT,
            min_timeout: MIN_TIMEOUT,
            resource_margin: RESOURCE_MARGIN,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.profile.capabilities = capabilities;
        self
    }

    pub fn with_units(mut self, units: u8) -> Self {
        self.profile.units = units;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.profile.capabilities
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| self.profile.slots()).max(1)
    }

    /// Budget of a task given the caller's requested timeout.
    pub fn timeout_for(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(t) if t >= self.min_timeout => t,
            _ => self.default_timeout,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)?;
        let mut profile = match file.profile {
            Some(name) => {
                HardwareProfile::preset(&name).ok_or(ConfigError::UnknownProfile(name))?
            }
            None => HardwareProfile::default(),
        };
        if let Some(units) = file.units {
            profile.units = units;
        }
        file.capabilities.apply(&mut profile.capabilities);
        let config = SchedulerConfig {
            profile,
            workers: file.workers,
            default_timeout: file
                .default_timeout_ms
                .map_or(DEFAULT_TIMEOUT, Duration::from_millis),
            min_timeout: file.min_timeout_ms.map_or(MIN_TIMEOUT, Duration::from_millis),
            resource_margin: file
                .resource_margin_ms
                .map_or(RESOURCE_MARGIN, Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.units == 0 {
            return Err(ConfigError::Invalid("at least one unit is required".into()));
        }
        let caps = &self.profile.capabilities;
        if caps.max_out_width < 8 || caps.max_out_height < 8 || caps.max_downsize == 0 {
            return Err(ConfigError::Invalid("capability ceilings too small".into()));
        }
        if self.default_timeout < self.min_timeout {
            return Err(ConfigError::Invalid(
                "default timeout is below the minimum timeout".into(),
            ));
        }
        Ok(())
    }
}
