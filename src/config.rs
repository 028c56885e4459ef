use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::scripts::{DodoScriptKind, ScriptDelays};
use crate::map::diff::DropZonePolicy;
use crate::map::terrain::{
    DROP_AREA_HEIGHT, DROP_AREA_WIDTH, FIELD_TILES_PER_SIDE, SPAWN_EDGE_MARGIN,
};

/// Bot configuration, loaded wholesale from a YAML file. Validation failures
/// here are fatal: the worker never enters its loop on a bad config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    /// Device command channel, host:port.
    pub device_addr: String,
    /// Optional admin socket bind address.
    pub admin_bind_addr: Option<String>,
    /// Directory for logs and persisted state files.
    pub data_dir: PathBuf,
    /// Optional map layer file loaded at startup.
    pub layer_path: Option<PathBuf>,
    pub dodo_script: DodoScriptKind,
    pub delays: ScriptDelays,
    /// How long a visitor has to arrive after the code is issued.
    pub arrival_window_secs: u64,
    /// The visitor's pickup time budget once present.
    pub pickup_window_secs: u64,
    /// Requester warning this long before the pickup budget runs out.
    pub pickup_warning_secs: u64,
    /// Estimated per-order setup time, used for queue ETA only.
    pub setup_budget_secs: u64,
    pub poll_interval_ms: u64,
    pub anchor_wait_ms: u64,
    pub max_queue: usize,
    pub allow_drops: bool,
    pub drop_zone_policy: DropZonePolicy,
    pub freeze_map: bool,
    pub refresh_terrain_on_edge: bool,
    /// Run the crash-recovery loop while idle.
    pub auto_recover: bool,
    /// A stuck overworld return longer than this is a hard crash.
    pub hard_crash_timeout_secs: u64,
    pub reinject_villagers: bool,
    /// Visitor names turned away on arrival.
    pub rejected_visitors: Vec<String>,
    pub spawn_x: u8,
    pub spawn_y: u8,
    pub skip_pocket_validation: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            device_addr: "192.168.0.2:6000".to_string(),
            admin_bind_addr: None,
            data_dir: PathBuf::from("airlift-data"),
            layer_path: None,
            dodo_script: DodoScriptKind::default(),
            delays: ScriptDelays::default(),
            arrival_window_secs: 90,
            pickup_window_secs: 300,
            pickup_warning_secs: 60,
            setup_budget_secs: 120,
            poll_interval_ms: 1_000,
            anchor_wait_ms: 15_000,
            max_queue: 50,
            allow_drops: true,
            drop_zone_policy: DropZonePolicy::default(),
            freeze_map: false,
            refresh_terrain_on_edge: false,
            auto_recover: true,
            hard_crash_timeout_secs: 180,
            reinject_villagers: false,
            rejected_visitors: Vec::new(),
            spawn_x: 16,
            spawn_y: 16,
            skip_pocket_validation: false,
        }
    }
}

impl BotConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: airlift <config.yaml>".to_string());
        }
        let config = Self::load(Path::new(&args[1]))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("config read {} failed: {}", path.display(), err))?;
        serde_yaml::from_str(&text)
            .map_err(|err| format!("config parse {} failed: {}", path.display(), err))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.spawn_x < SPAWN_EDGE_MARGIN
            || self.spawn_y < SPAWN_EDGE_MARGIN
            || self.spawn_x as usize + DROP_AREA_WIDTH > FIELD_TILES_PER_SIDE
            || self.spawn_y as usize + DROP_AREA_HEIGHT > FIELD_TILES_PER_SIDE
        {
            return Err(format!(
                "spawn coordinates ({}, {}) outside usable grid",
                self.spawn_x, self.spawn_y
            ));
        }
        if self.freeze_map && self.refresh_terrain_on_edge {
            return Err(
                "freeze_map and refresh_terrain_on_edge cannot both be set".to_string(),
            );
        }
        if self.freeze_map && self.allow_drops {
            return Err("freeze_map and allow_drops cannot both be set".to_string());
        }
        if self.arrival_window_secs == 0
            || self.pickup_window_secs == 0
            || self.poll_interval_ms == 0
            || self.anchor_wait_ms == 0
        {
            return Err("windows and poll intervals must be nonzero".to_string());
        }
        if self.max_queue == 0 {
            return Err("max_queue must be nonzero".to_string());
        }
        Ok(())
    }

    /// Total time budget one queued order may consume, used for ETA math.
    pub fn order_budget_secs(&self) -> u64 {
        self.setup_budget_secs + self.arrival_window_secs + self.pickup_window_secs
    }
}
