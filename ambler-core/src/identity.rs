use crate::config::IdentitySection;
use crate::timing::Jitter;

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// One randomized device/locale presentation, drawn per browser launch.
#[derive(Debug, Clone)]
pub struct IdentityBundle {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub has_touch: bool,
    pub locale: String,
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct IdentityPool {
    config: IdentitySection,
}

impl IdentityPool {
    pub fn new(config: IdentitySection) -> Self {
        Self { config }
    }

    pub fn sample(&self, jitter: &mut Jitter) -> IdentityBundle {
        let base = jitter
            .pick(&self.config.resolutions)
            .copied()
            .unwrap_or([1366, 768]);
        let spread = self.config.jitter_pixels as f64;
        let width = ((base[0] as f64 + jitter.offset(spread)) as i64).clamp(640, 2560) as u32;
        let height = ((base[1] as f64 + jitter.offset(spread)) as i64).clamp(480, 1600) as u32;
        let scale = jitter.range_f64((
            self.config.device_scale_factor[0] as f64,
            self.config.device_scale_factor[1] as f64,
        ));
        let user_agent = jitter
            .pick(&self.config.user_agents)
            .cloned()
            .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string());
        let locale = jitter
            .pick(&self.config.locales)
            .cloned()
            .unwrap_or_else(|| "en-US".to_string());
        let timezone = jitter
            .pick(&self.config.timezones)
            .cloned()
            .unwrap_or_else(|| "America/New_York".to_string());
        IdentityBundle {
            user_agent,
            viewport_width: width,
            viewport_height: height,
            device_scale_factor: scale,
            has_touch: jitter.chance(self.config.touch_ratio),
            locale,
            timezone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stays_within_configured_envelope() {
        let config = IdentitySection::default();
        let pool = IdentityPool::new(config.clone());
        let mut jitter = Jitter::seeded(5);
        for _ in 0..200 {
            let bundle = pool.sample(&mut jitter);
            assert!((640..=2560).contains(&bundle.viewport_width));
            assert!((480..=1600).contains(&bundle.viewport_height));
            assert!(bundle.device_scale_factor >= config.device_scale_factor[0] as f64);
            assert!(bundle.device_scale_factor <= config.device_scale_factor[1] as f64);
            assert!(config.locales.contains(&bundle.locale));
        }
    }

    #[test]
    fn empty_pools_fall_back_to_defaults() {
        let config = IdentitySection {
            user_agents: Vec::new(),
            locales: Vec::new(),
            timezones: Vec::new(),
            ..IdentitySection::default()
        };
        let pool = IdentityPool::new(config);
        let mut jitter = Jitter::seeded(1);
        let bundle = pool.sample(&mut jitter);
        assert!(bundle.user_agent.contains("Mozilla/5.0"));
        assert_eq!(bundle.locale, "en-US");
    }
}
