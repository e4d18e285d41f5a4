use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrowserSection;
use crate::identity::IdentityBundle;
use crate::proxy::ProxyEndpoint;

use super::drive::CdpDrive;
use super::error::{SessionError, SessionResult};

/// Launches one Chromium instance per session with a throwaway profile and
/// the session's identity applied before the first navigation.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserSection>,
    nav_timeout: Duration,
}

impl BrowserLauncher {
    pub fn new(config: BrowserSection, nav_timeout: Duration) -> Self {
        Self {
            config: Arc::new(config),
            nav_timeout,
        }
    }

    pub async fn launch(
        &self,
        identity: &IdentityBundle,
        proxy: Option<&ProxyEndpoint>,
    ) -> SessionResult<CdpDrive> {
        let profile_dir = self.allocate_profile()?;
        let chromium_config = self.build_chromium_config(identity, proxy, &profile_dir)?;
        info!(
            ua = %identity.user_agent,
            width = identity.viewport_width,
            height = identity.viewport_height,
            proxy = proxy.map(|p| p.address()).as_deref().unwrap_or("none"),
            "launching chromium instance"
        );
        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        let handle = BrowserHandle {
            browser,
            handler_task: Some(handler_task),
            profile_dir,
            proxy: proxy.map(|p| p.address()),
        };
        let page = handle
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        self.configure_page(&page, identity).await?;
        Ok(CdpDrive::new(page, handle, self.nav_timeout))
    }

    fn allocate_profile(&self) -> SessionResult<PathBuf> {
        let base = PathBuf::from(&self.config.profiles_dir);
        cleanup_expired_profiles(
            &base,
            Duration::from_secs(self.config.profile_ttl_hours * 3600),
        );
        let dir = base.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir)
            .map_err(|err| SessionError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(dir)
    }

    fn build_chromium_config(
        &self,
        identity: &IdentityBundle,
        proxy: Option<&ProxyEndpoint>,
        profile_dir: &Path,
    ) -> SessionResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile_dir)
            .viewport(ChromiumViewport {
                width: identity.viewport_width,
                height: identity.viewport_height,
                device_scale_factor: Some(identity.device_scale_factor),
                emulating_mobile: false,
                is_landscape: identity.viewport_width >= identity.viewport_height,
                has_touch: identity.has_touch,
            });
        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--user-agent={}", identity.user_agent),
            format!(
                "--window-size={},{}",
                identity.viewport_width, identity.viewport_height
            ),
            format!("--lang={}", identity.locale),
            format!("--accept-lang={}", identity.locale),
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if self.config.mute_audio {
            args.push("--mute-audio".into());
        }
        if let Some(proxy) = proxy {
            args.push(format!("--proxy-server={}", proxy.server_arg()));
        }
        builder = builder.args(args);
        builder.build().map_err(SessionError::Configuration)
    }

    async fn configure_page(&self, page: &Page, identity: &IdentityBundle) -> SessionResult<()> {
        page.enable_stealth_mode_with_agent(&identity.user_agent)
            .await?;
        let ua_params = SetUserAgentOverrideParams::builder()
            .user_agent(identity.user_agent.clone())
            .accept_language(identity.locale.clone())
            .build()
            .map_err(SessionError::Configuration)?;
        page.set_user_agent(ua_params).await?;

        let locale = &identity.locale;
        let languages_script = format!(
            "Object.defineProperty(navigator, 'language', {{ get: () => '{locale}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{locale}', 'en-US'] }});"
        );
        page.evaluate_on_new_document(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(languages_script)
                .build()
                .map_err(SessionError::Configuration)?,
        )
        .await?;

        let tz_params = SetTimezoneOverrideParams::builder()
            .timezone_id(identity.timezone.clone())
            .build()
            .map_err(SessionError::Configuration)?;
        page.execute(tz_params).await?;
        Ok(())
    }
}

/// Owns the running browser and its event-drain task for one session.
#[derive(Debug)]
pub struct BrowserHandle {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    profile_dir: PathBuf,
    proxy: Option<String>,
}

impl BrowserHandle {
    pub fn proxy_address(&self) -> Option<String> {
        self.proxy.clone()
    }

    pub async fn shutdown(mut self) -> SessionResult<()> {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        if let Err(err) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!(path = %self.profile_dir.display(), error = %err, "profile dir not removed");
        }
        Ok(())
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile_dir.display(),
                    "browser handle dropped without explicit shutdown"
                );
            }
        }
    }
}

fn cleanup_expired_profiles(base: &Path, ttl: Duration) {
    let now = SystemTime::now();
    let Ok(entries) = std::fs::read_dir(base) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if let Ok(modified) = metadata.modified() {
            if now.duration_since(modified).unwrap_or(Duration::ZERO) > ttl {
                if let Err(err) = std::fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %err, "failed to remove expired profile");
                }
            }
        }
    }
}
