use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AmblerConfig {
    pub session: SessionSection,
    pub browser: BrowserSection,
    pub identity: IdentitySection,
    pub proxy: ProxySection,
}

impl AmblerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.instances == 0 {
            return Err(ConfigError::Invalid(
                "session.instances must be at least 1".into(),
            ));
        }
        if self.session.pages[0] == 0 || self.session.pages[0] > self.session.pages[1] {
            return Err(ConfigError::Invalid(
                "session.pages must be a non-empty [min, max] range".into(),
            ));
        }
        if self.session.duration_seconds[0] > self.session.duration_seconds[1] {
            return Err(ConfigError::Invalid(
                "session.duration_seconds min exceeds max".into(),
            ));
        }
        if self.session.actions_per_page[0] > self.session.actions_per_page[1] {
            return Err(ConfigError::Invalid(
                "session.actions_per_page min exceeds max".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub instances: u32,
    /// Target page count range, drawn once per session.
    pub pages: [u32; 2],
    /// Target wall-time range in seconds, drawn once per session.
    pub duration_seconds: [u64; 2],
    pub actions_per_page: [u32; 2],
    /// Fixed launch offset between instance starts.
    pub stagger_seconds: u64,
    /// "Thinking" pause between page cycles.
    pub page_pause_ms: [u64; 2],
    pub action_pause_ms: [u64; 2],
    pub navigation_timeout_seconds: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            instances: 1,
            pages: [4, 9],
            duration_seconds: [90, 240],
            actions_per_page: [3, 8],
            stagger_seconds: 5,
            page_pause_ms: [2_000, 6_000],
            action_pause_ms: [400, 1_600],
            navigation_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub mute_audio: bool,
    pub profiles_dir: String,
    pub profile_ttl_hours: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            mute_audio: true,
            profiles_dir: "/tmp/ambler/profiles".into(),
            profile_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    pub user_agents: Vec<String>,
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
    pub device_scale_factor: [f32; 2],
    pub locales: Vec<String>,
    pub timezones: Vec<String>,
    /// Share of launches that present a touch-capable viewport.
    pub touch_ratio: f64,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            user_agents: Vec::new(),
            resolutions: vec![[1366, 768], [1440, 900], [1536, 864], [1920, 1080]],
            jitter_pixels: 12,
            device_scale_factor: [1.0, 2.0],
            locales: vec!["en-US".into(), "en-GB".into(), "de-DE".into()],
            timezones: vec![
                "America/New_York".into(),
                "Europe/London".into(),
                "Europe/Berlin".into(),
            ],
            touch_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    pub list_file: Option<String>,
    pub check_url: String,
    pub check_timeout_seconds: u64,
    pub check_concurrency: usize,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            list_file: None,
            check_url: "https://www.gstatic.com/generate_204".into(),
            check_timeout_seconds: 10,
            check_concurrency: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_document() {
        let config: AmblerConfig = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.session.instances, 1);
        assert!(config.session.pages[0] <= config.session.pages[1]);
        assert!(config.proxy.list_file.is_none());
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/ambler.toml");
        let config = AmblerConfig::load(path).expect("fixture config should parse");
        assert_eq!(config.session.instances, 3);
        assert!(config.identity.user_agents.len() >= 2);
        assert_eq!(config.proxy.list_file.as_deref(), Some("proxies.txt"));
        config.validate().expect("fixture should validate");
    }

    #[test]
    fn validate_rejects_inverted_ranges() {
        let mut config = AmblerConfig::default();
        config.session.pages = [6, 2];
        assert!(config.validate().is_err());
    }
}
