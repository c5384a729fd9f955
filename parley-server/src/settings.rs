//! Persistent server settings (JSON file in the data directory) plus
//! `PARLEY_*` environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use parley_core::{BargeInTrigger, ReplyMode, SessionConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub input_sample_rate: u32,
    pub frame_ms: u32,
    pub vad_threshold: f32,
    pub onset_ms: u32,
    pub offset_ms: u32,
    pub max_utterance_ms: u32,
    pub barge_in: BargeInTrigger,
    pub reply_mode: ReplyMode,
    pub output_sample_rate: u32,
    pub playback_frame_ms: u32,
    pub pacing: bool,
    pub pacing_lead_frames: u32,
    pub collaborator_timeout_ms: u64,
    pub default_voice: String,
    /// Send playback as base64 `ttsChunk` events instead of binary frames.
    pub inline_audio: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            bind_addr: "127.0.0.1:8765".into(),
            input_sample_rate: session.input_sample_rate,
            frame_ms: session.frame_ms,
            vad_threshold: session.vad_threshold,
            onset_ms: session.onset_ms,
            offset_ms: session.offset_ms,
            max_utterance_ms: session.max_utterance_ms,
            barge_in: session.barge_in,
            reply_mode: session.reply_mode,
            output_sample_rate: session.output_sample_rate,
            playback_frame_ms: session.playback_frame_ms,
            pacing: session.pacing,
            pacing_lead_frames: session.pacing_lead_frames,
            collaborator_timeout_ms: session.collaborator_timeout_ms,
            default_voice: session.default_voice,
            inline_audio: false,
        }
    }
}

impl ServerSettings {
    pub fn normalize(&mut self) {
        self.bind_addr = self.bind_addr.trim().to_string();
        if self.bind_addr.is_empty() {
            self.bind_addr = "127.0.0.1:8765".into();
        }
        self.input_sample_rate = self.input_sample_rate.clamp(8_000, 96_000);
        self.output_sample_rate = self.output_sample_rate.clamp(8_000, 96_000);
        self.frame_ms = self.frame_ms.clamp(10, 30);
        self.vad_threshold = if self.vad_threshold.is_finite() {
            self.vad_threshold.clamp(0.000_5, 0.5)
        } else {
            0.01
        };
        self.onset_ms = self.onset_ms.clamp(self.frame_ms, 2_000);
        self.offset_ms = self.offset_ms.clamp(100, 5_000);
        if self.max_utterance_ms != 0 {
            self.max_utterance_ms = self.max_utterance_ms.clamp(1_000, 120_000);
        }
        self.playback_frame_ms = self.playback_frame_ms.clamp(10, 60);
        self.pacing_lead_frames = self.pacing_lead_frames.min(50);
        self.collaborator_timeout_ms = self.collaborator_timeout_ms.clamp(500, 120_000);
        self.default_voice = self.default_voice.trim().to_string();
        if self.default_voice.is_empty() {
            self.default_voice = "default".into();
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_sample_rate: self.input_sample_rate,
            frame_ms: self.frame_ms,
            vad_threshold: self.vad_threshold,
            onset_ms: self.onset_ms,
            offset_ms: self.offset_ms,
            max_utterance_ms: self.max_utterance_ms,
            barge_in: self.barge_in,
            reply_mode: self.reply_mode,
            output_sample_rate: self.output_sample_rate,
            playback_frame_ms: self.playback_frame_ms,
            pacing: self.pacing,
            pacing_lead_frames: self.pacing_lead_frames,
            collaborator_timeout_ms: self.collaborator_timeout_ms,
            default_voice: self.default_voice.clone(),
            ..SessionConfig::default()
        }
    }
}

pub fn normalize_reply_mode(raw: &str) -> Option<ReplyMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "full" | "whole" => Some(ReplyMode::Full),
        "streamed" | "stream" | "streaming" => Some(ReplyMode::Streamed),
        _ => None,
    }
}

/// Apply `PARLEY_BIND`, `PARLEY_ONSET_MS`, `PARLEY_OFFSET_MS`,
/// `PARLEY_VAD_THRESHOLD` and `PARLEY_REPLY_MODE` on top of the file settings.
/// Unparseable values are ignored.
pub fn apply_env_overrides(settings: &mut ServerSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

pub fn apply_overrides_from(
    settings: &mut ServerSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(bind) = lookup("PARLEY_BIND") {
        settings.bind_addr = bind;
    }
    if let Some(ms) = lookup("PARLEY_ONSET_MS").and_then(|v| v.trim().parse().ok()) {
        settings.onset_ms = ms;
    }
    if let Some(ms) = lookup("PARLEY_OFFSET_MS").and_then(|v| v.trim().parse().ok()) {
        settings.offset_ms = ms;
    }
    if let Some(th) = lookup("PARLEY_VAD_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
        settings.vad_threshold = th;
    }
    if let Some(mode) = lookup("PARLEY_REPLY_MODE").and_then(|v| normalize_reply_mode(&v)) {
        settings.reply_mode = mode;
    }
    settings.normalize();
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Parley")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> ServerSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<ServerSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &ServerSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("parley-settings-{}-{name}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let s: ServerSettings =
            serde_json::from_str(r#"{"onsetMs": 300, "replyMode": "full"}"#).unwrap();
        assert_eq!(s.onset_ms, 300);
        assert_eq!(s.reply_mode, ReplyMode::Full);
        assert_eq!(s.offset_ms, 800);
        assert_eq!(s.barge_in, BargeInTrigger::OnConfirmedSpeech);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut s = ServerSettings {
            bind_addr: "   ".into(),
            frame_ms: 5,
            vad_threshold: f32::NAN,
            onset_ms: 0,
            offset_ms: 60_000,
            max_utterance_ms: 10,
            collaborator_timeout_ms: 1,
            default_voice: " ".into(),
            ..ServerSettings::default()
        };
        s.normalize();
        assert_eq!(s.bind_addr, "127.0.0.1:8765");
        assert_eq!(s.frame_ms, 10);
        assert_eq!(s.vad_threshold, 0.01);
        assert_eq!(s.onset_ms, 10);
        assert_eq!(s.offset_ms, 5_000);
        assert_eq!(s.max_utterance_ms, 1_000);
        assert_eq!(s.collaborator_timeout_ms, 500);
        assert_eq!(s.default_voice, "default");
    }

    #[test]
    fn zero_max_utterance_stays_disabled() {
        let mut s = ServerSettings {
            max_utterance_ms: 0,
            ..ServerSettings::default()
        };
        s.normalize();
        assert_eq!(s.max_utterance_ms, 0);
        assert_eq!(s.session_config().endpointer().max_utterance_frames, None);
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("PARLEY_BIND", "0.0.0.0:9000"),
            ("PARLEY_ONSET_MS", "240"),
            ("PARLEY_OFFSET_MS", "soon"),
            ("PARLEY_REPLY_MODE", "Full"),
        ]
        .into_iter()
        .collect();
        let mut s = ServerSettings::default();
        apply_overrides_from(&mut s, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.bind_addr, "0.0.0.0:9000");
        assert_eq!(s.onset_ms, 240);
        assert_eq!(s.offset_ms, 800);
        assert_eq!(s.reply_mode, ReplyMode::Full);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let path = temp_path("roundtrip");
        let mut s = ServerSettings::default();
        s.default_voice = "alto".into();
        s.inline_audio = true;
        save_settings(&path, &s).unwrap();
        assert_eq!(load_settings(&path), s);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), ServerSettings::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn session_config_carries_tunables() {
        let s = ServerSettings {
            onset_ms: 200,
            pacing: false,
            ..ServerSettings::default()
        };
        let cfg = s.session_config();
        assert_eq!(cfg.onset_ms, 200);
        assert!(!cfg.pacing);
        assert_eq!(cfg.analysis_sample_rate, 16_000);
    }
}
