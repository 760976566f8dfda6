use anyhow::{anyhow, Result};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::publish::{parse_mqtt_endpoint, DEFAULT_TOPIC};
use crate::recognize::{RecognitionSettings, DEFAULT_MIN_PLATE_CHARS};
use crate::trigger::{TriggerSettings, DEFAULT_AREA_THRESHOLD, DEFAULT_BINARY_THRESHOLD};

const DEFAULT_STREAM_ID: &str = "lane-1";
const DEFAULT_VIDEO_PATH: &str = "stub://lane-1";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_OCR_COMMAND: &str = "tesseract {crop} stdout --psm 7";

#[derive(Debug, Deserialize, Default)]
struct VehicledConfigFile {
    streams: Option<Vec<StreamConfigFile>>,
    models: Option<ModelsConfigFile>,
    trigger: Option<TriggerConfigFile>,
    recognition: Option<RecognitionConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    id: Option<String>,
    video_path: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelsConfigFile {
    detector: Option<PathBuf>,
    nationality: Option<PathBuf>,
    color: Option<PathBuf>,
    ocr_command: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TriggerConfigFile {
    area_threshold: Option<u64>,
    binary_threshold: Option<u8>,
    reset_background_on_fire: Option<bool>,
    history: Option<u32>,
    var_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognitionConfigFile {
    crop_dir: Option<PathBuf>,
    min_plate_chars: Option<usize>,
    parallel_stages: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    tls_ca: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VehicledConfig {
    pub streams: Vec<StreamSettings>,
    pub models: ModelSettings,
    pub trigger: TriggerSettings,
    pub recognition: RecognitionSettings,
    pub mqtt: MqttSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub id: String,
    pub video_path: String,
    pub target_fps: u32,
}

/// Model locations. A missing model path selects the stub or
/// non-model alternative for that stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub detector: Option<PathBuf>,
    pub nationality: Option<PathBuf>,
    pub color: Option<PathBuf>,
    pub ocr_command: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub broker_addr: String,
    pub topic: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls_ca: Option<PathBuf>,
}

impl VehicledConfig {
    /// Load from the file named by `VEHICLE_CONFIG` (if set), then apply env
    /// overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEHICLE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VehicledConfigFile) -> Self {
        let streams = match file.streams {
            Some(streams) => streams
                .into_iter()
                .enumerate()
                .map(|(idx, stream)| StreamSettings {
                    id: stream.id.unwrap_or_else(|| format!("lane-{}", idx + 1)),
                    video_path: stream.video_path.unwrap_or_default(),
                    target_fps: stream.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                })
                .collect(),
            None => vec![StreamSettings {
                id: DEFAULT_STREAM_ID.to_string(),
                video_path: DEFAULT_VIDEO_PATH.to_string(),
                target_fps: DEFAULT_TARGET_FPS,
            }],
        };

        let models = file.models.unwrap_or_default();
        let models = ModelSettings {
            detector: models.detector,
            nationality: models.nationality,
            color: models.color,
            ocr_command: models
                .ocr_command
                .unwrap_or_else(|| DEFAULT_OCR_COMMAND.to_string()),
        };

        let trigger_file = file.trigger.unwrap_or_default();
        let defaults = TriggerSettings::default();
        let trigger = TriggerSettings {
            area_threshold: trigger_file
                .area_threshold
                .unwrap_or(DEFAULT_AREA_THRESHOLD),
            binary_threshold: trigger_file
                .binary_threshold
                .unwrap_or(DEFAULT_BINARY_THRESHOLD),
            reset_background_on_fire: trigger_file
                .reset_background_on_fire
                .unwrap_or(defaults.reset_background_on_fire),
            history: trigger_file.history.unwrap_or(defaults.history),
            var_threshold: trigger_file.var_threshold.unwrap_or(defaults.var_threshold),
        };

        let recognition_file = file.recognition.unwrap_or_default();
        let recognition = RecognitionSettings {
            crop_dir: recognition_file.crop_dir,
            min_plate_chars: recognition_file
                .min_plate_chars
                .unwrap_or(DEFAULT_MIN_PLATE_CHARS),
            parallel_stages: recognition_file.parallel_stages.unwrap_or(true),
        };

        let mqtt_file = file.mqtt.unwrap_or_default();
        let mqtt = MqttSettings {
            broker_addr: mqtt_file
                .broker_addr
                .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
            topic: mqtt_file.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            client_id: mqtt_file.client_id.unwrap_or_else(default_client_id),
            username: mqtt_file.username,
            password: mqtt_file.password,
            tls_ca: mqtt_file.tls_ca,
        };

        Self {
            streams,
            models,
            trigger,
            recognition,
            mqtt,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("VEHICLE_VIDEO_PATH") {
            if !path.trim().is_empty() {
                match self.streams.first_mut() {
                    Some(stream) => stream.video_path = path,
                    None => self.streams.push(StreamSettings {
                        id: DEFAULT_STREAM_ID.to_string(),
                        video_path: path,
                        target_fps: DEFAULT_TARGET_FPS,
                    }),
                }
            }
        }
        if let Ok(addr) = std::env::var("VEHICLE_MQTT_BROKER") {
            if !addr.trim().is_empty() {
                self.mqtt.broker_addr = addr;
            }
        }
        if let Ok(topic) = std::env::var("VEHICLE_MQTT_TOPIC") {
            if !topic.trim().is_empty() {
                self.mqtt.topic = topic;
            }
        }
        if let Ok(area) = std::env::var("VEHICLE_AREA_THRESHOLD") {
            self.trigger.area_threshold = area.trim().parse().map_err(|_| {
                anyhow!("VEHICLE_AREA_THRESHOLD must be an integer number of square pixels")
            })?;
        }
        if let Ok(dir) = std::env::var("VEHICLE_CROP_DIR") {
            if !dir.trim().is_empty() {
                self.recognition.crop_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(anyhow!("at least one stream must be configured"));
        }
        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.id.trim().is_empty() {
                return Err(anyhow!("stream id must not be empty"));
            }
            if !seen.insert(stream.id.as_str()) {
                return Err(anyhow!("duplicate stream id {}", stream.id));
            }
            if stream.video_path.trim().is_empty() {
                return Err(anyhow!("stream {} has no video_path", stream.id));
            }
        }

        if self.trigger.area_threshold == 0 {
            return Err(anyhow!("trigger.area_threshold must be greater than zero"));
        }
        if self.trigger.history == 0 {
            return Err(anyhow!("trigger.history must be greater than zero"));
        }
        if !(self.trigger.var_threshold.is_finite() && self.trigger.var_threshold > 0.0) {
            return Err(anyhow!("trigger.var_threshold must be a positive number"));
        }
        if self.recognition.min_plate_chars == 0 {
            return Err(anyhow!("recognition.min_plate_chars must be greater than zero"));
        }
        if self.models.ocr_command.trim().is_empty() {
            return Err(anyhow!("models.ocr_command must not be empty"));
        }

        let topic = self.mqtt.topic.trim();
        if topic.is_empty() {
            return Err(anyhow!("mqtt.topic must not be empty"));
        }
        if topic.contains(['+', '#']) {
            return Err(anyhow!("mqtt.topic must not contain wildcards: {}", topic));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(anyhow!("mqtt.client_id must not be empty"));
        }
        parse_mqtt_endpoint(&self.mqtt.broker_addr)?;
        Ok(())
    }
}

fn default_client_id() -> String {
    format!("publish-{}", rand::thread_rng().gen_range(0..=1000))
}

fn read_config_file(path: &Path) -> Result<VehicledConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = VehicledConfig::from_file(VehicledConfigFile::default());
        assert_eq!(cfg.streams.len(), 1);
        assert_eq!(cfg.streams[0].video_path, DEFAULT_VIDEO_PATH);
        assert_eq!(cfg.trigger, TriggerSettings::default());
        assert_eq!(cfg.recognition, RecognitionSettings::default());
        assert_eq!(cfg.mqtt.topic, "features_message");
        assert_eq!(cfg.mqtt.broker_addr, "127.0.0.1:1883");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn generated_client_id_matches_publish_pattern() {
        let id = default_client_id();
        let n: u32 = id.strip_prefix("publish-").unwrap().parse().unwrap();
        assert!(n <= 1000);
    }

    #[test]
    fn unnamed_streams_get_positional_ids() {
        let file = VehicledConfigFile {
            streams: Some(vec![
                StreamConfigFile {
                    video_path: Some("a.mp4".into()),
                    ..Default::default()
                },
                StreamConfigFile {
                    video_path: Some("b.mp4".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let cfg = VehicledConfig::from_file(file);
        assert_eq!(cfg.streams[0].id, "lane-1");
        assert_eq!(cfg.streams[1].id, "lane-2");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = VehicledConfig::from_file(VehicledConfigFile::default());

        let mut cfg = base.clone();
        cfg.streams.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.streams.push(cfg.streams[0].clone());
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.trigger.area_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.recognition.min_plate_chars = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.mqtt.topic = "features/#".into();
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.mqtt.broker_addr = "no-port".into();
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.trigger.var_threshold = f32::NAN;
        assert!(cfg.validate().is_err());
    }
}
