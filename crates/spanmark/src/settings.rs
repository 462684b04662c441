use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::media::PipelineOptions;

pub const MAX_RECENT_VIDEOS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub version: u32,
    /// Most recent first.
    pub recent_videos: Vec<PathBuf>,
    pub dark_mode: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Jump used by Shift+Left/Right.
    pub seek_step_secs: f64,
    /// Decode straight into GPU textures instead of uploading from host memory.
    pub gpu_upload: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version: 1,
            recent_videos: Vec::new(),
            dark_mode: true,
            window_width: 1280,
            window_height: 720,
            seek_step_secs: 1.0,
            gpu_upload: false,
        }
    }
}

impl SettingsConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("spanmark").join("settings.json"))
    }

    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to save settings to {}: {e}", path.display());
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Move `path` to the front of the recent list.
    pub fn add_recent_video(&mut self, path: &Path) {
        self.recent_videos.retain(|p| p != path);
        self.recent_videos.insert(0, path.to_path_buf());
        self.recent_videos.truncate(MAX_RECENT_VIDEOS);
    }

    pub fn recent_video(&self, index: usize) -> Option<&Path> {
        self.recent_videos.get(index).map(PathBuf::as_path)
    }

    pub fn most_recent_video(&self) -> Option<&Path> {
        self.recent_videos.first().map(PathBuf::as_path)
    }

    pub fn seek_step(&self) -> f64 {
        if self.seek_step_secs.is_finite() && self.seek_step_secs > 0.0 {
            self.seek_step_secs
        } else {
            1.0
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            gpu_upload: self.gpu_upload,
            ..PipelineOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = SettingsConfig::default();
        settings.dark_mode = false;
        settings.window_width = 1600;
        settings.add_recent_video(Path::new("/videos/a.mp4"));
        settings.save_to(&path).unwrap();

        let loaded = SettingsConfig::load_from(&path);
        assert!(!loaded.dark_mode);
        assert_eq!(loaded.window_width, 1600);
        assert_eq!(loaded.most_recent_video(), Some(Path::new("/videos/a.mp4")));
    }

    #[test]
    fn missing_and_malformed_files_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SettingsConfig::load_from(&dir.path().join("nope.json"));
        assert!(missing.recent_videos.is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let loaded = SettingsConfig::load_from(&bad);
        assert!((loaded.seek_step_secs - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn older_files_gain_new_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "version": 1, "dark_mode": false }"#).unwrap();
        let loaded = SettingsConfig::load_from(&path);
        assert!(!loaded.dark_mode);
        assert!(!loaded.gpu_upload);
        assert_eq!(loaded.window_height, 720);
    }

    #[test]
    fn reopening_a_recent_video_moves_it_to_the_front() {
        let mut settings = SettingsConfig::default();
        for name in ["a", "b", "c"] {
            settings.add_recent_video(Path::new(&format!("/v/{name}.mp4")));
        }
        assert_eq!(settings.recent_video(2), Some(Path::new("/v/a.mp4")));
        assert_eq!(settings.recent_video(3), None);

        let picked = settings.recent_video(2).map(Path::to_path_buf);
        settings.add_recent_video(picked.as_deref().unwrap());
        assert_eq!(settings.recent_video(0), Some(Path::new("/v/a.mp4")));
        assert_eq!(settings.recent_video(1), Some(Path::new("/v/c.mp4")));
        assert_eq!(settings.recent_videos.len(), 3);
    }

    #[test]
    fn recent_videos_are_deduplicated_and_capped() {
        let mut settings = SettingsConfig::default();
        for i in 0..15 {
            settings.add_recent_video(Path::new(&format!("/v/{i}.mp4")));
        }
        assert_eq!(settings.recent_videos.len(), MAX_RECENT_VIDEOS);
        assert_eq!(settings.most_recent_video(), Some(Path::new("/v/14.mp4")));

        settings.add_recent_video(Path::new("/v/10.mp4"));
        assert_eq!(settings.recent_videos.len(), MAX_RECENT_VIDEOS);
        assert_eq!(settings.most_recent_video(), Some(Path::new("/v/10.mp4")));
        assert_eq!(
            settings.recent_videos.iter().filter(|p| p.ends_with("10.mp4")).count(),
            1
        );
    }

    #[test]
    fn invalid_seek_step_falls_back() {
        let settings = SettingsConfig {
            seek_step_secs: -2.0,
            ..SettingsConfig::default()
        };
        assert!((settings.seek_step() - 1.0).abs() < f64::EPSILON);
        assert!(settings.pipeline_options().reverse_chunk > std::time::Duration::ZERO);
    }
}
