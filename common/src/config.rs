// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub engine: EngineSettings,
    pub gateway: GatewaySettings,
    pub dispatcher: DispatcherSettings,
    pub store: StoreSettings,
    pub observability: ObservabilitySettings,
    #[serde(default)]
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Target the gateway invokes when a registration fires
    pub target: String,
    /// Identity the gateway delivers invocations under
    pub trusted_scheduler_id: Uuid,
    /// Resource units booked per registration
    pub resource_cost: u64,
    /// Backoff candidates per placement probe
    pub max_probe_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Resource budget per one-second slot of the in-process gateway
    pub capacity_per_slot: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Optional JSON snapshot restored on start and written on shutdown
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub metrics_port: u16,
}

/// Demo chain started by the daemon so a local run has something to fire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    pub enabled: bool,
    pub interval_seconds: i64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 5,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.target.is_empty() {
            return Err("Engine target cannot be empty".to_string());
        }
        if self.engine.resource_cost == 0 {
            return Err("Engine resource_cost must be greater than 0".to_string());
        }
        if self.engine.max_probe_attempts == 0 {
            return Err("Engine max_probe_attempts must be greater than 0".to_string());
        }
        // Jitter is drawn from 16 bits; wider windows would stop spreading.
        if self.engine.max_probe_attempts > 16 {
            return Err("Engine max_probe_attempts must be at most 16".to_string());
        }

        if self.gateway.capacity_per_slot < self.engine.resource_cost {
            return Err(
                "Gateway capacity_per_slot must cover at least one registration".to_string(),
            );
        }

        if self.dispatcher.poll_interval_seconds == 0 {
            return Err("Dispatcher poll_interval_seconds must be greater than 0".to_string());
        }

        if self.demo.enabled && self.demo.interval_seconds <= 0 {
            return Err("Demo interval_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineSettings {
                target: "rebook-engine".to_string(),
                trusted_scheduler_id: Uuid::nil(),
                resource_cost: 1,
                max_probe_attempts: crate::probe::DEFAULT_MAX_PROBE_ATTEMPTS,
            },
            gateway: GatewaySettings {
                capacity_per_slot: 8,
            },
            dispatcher: DispatcherSettings {
                poll_interval_seconds: 1,
            },
            store: StoreSettings {
                snapshot_path: None,
            },
            observability: ObservabilitySettings {
                log_level: "info".to_string(),
                metrics_port: 9090,
            },
            demo: DemoSettings::default(),
        }
    }
}
