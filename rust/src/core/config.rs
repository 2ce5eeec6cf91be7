use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Loaded from `aircast_config.json` in the data dir. Every field has a
/// default so a missing or partial file never fails startup. The scheduler
/// timing values are empirically tuned, not derived; treat them as knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tick_interval_ms: u64,
    pub generation_window_min_secs: f64,
    pub generation_window_max_secs: f64,
    pub play_threshold_secs: f64,
    pub seek_tolerance_secs: f64,
    pub cooldown_secs: f64,

    pub music_volume: f32,
    pub ducked_volume: f32,

    pub relay_url: Option<String>,
    /// Fixed pairing code; generated per session when absent.
    pub pairing_code: Option<String>,

    pub style: String,
    pub voice: String,
    pub language: String,
    pub persona: Option<String>,

    pub dj_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            generation_window_min_secs: 10.0,
            generation_window_max_secs: 45.0,
            play_threshold_secs: 12.0,
            seek_tolerance_secs: 3.0,
            cooldown_secs: 5.0,
            music_volume: 1.0,
            ducked_volume: 0.2,
            relay_url: None,
            pairing_code: None,
            style: "late-night".to_string(),
            voice: "ember".to_string(),
            language: "en".to_string(),
            persona: None,
            dj_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(100))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs.max(0.0))
    }
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("aircast_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}
