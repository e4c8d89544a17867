use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::types::Language;

const DEFAULT_CAMERA_COMMAND: &str =
    "ffmpeg -hide_banner -loglevel error -f v4l2 -i /dev/video0 -f image2pipe -vcodec mjpeg -q:v 3 -";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_image_model: String,
    pub gemini_safety_settings: String,
    pub output_dir: PathBuf,
    pub default_language: Language,
    pub camera_command: Vec<String>,
    pub camera_max_frame_bytes: usize,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_words(name: &str, default: &str) -> Vec<String> {
    let raw = env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    raw.split_whitespace().map(|word| word.to_string()).collect()
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn parse_language(value: String) -> Language {
    value.parse().unwrap_or_else(|_| {
        warn!("Unknown POSE_LANGUAGE value '{}'; defaulting to vi.", value);
        Language::default()
    })
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| env::var("API_KEY").ok())
            .unwrap_or_default();

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            gemini_api_key: gemini_api_key.trim().to_string(),
            gemini_base_url: env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            )
            .trim_end_matches('/')
            .to_string(),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            output_dir: PathBuf::from(env_string("POSE_OUTPUT_DIR", "pose-output")),
            default_language: parse_language(env_string("POSE_LANGUAGE", "vi")),
            camera_command: env_words("POSE_CAMERA_COMMAND", DEFAULT_CAMERA_COMMAND),
            camera_max_frame_bytes: env_usize("POSE_CAMERA_MAX_FRAME_BYTES", 16 * 1024 * 1024),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}
