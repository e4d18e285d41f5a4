use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::config::AmblerConfig;
use crate::identity::{IdentityBundle, IdentityPool};
use crate::proxy::{ProxyEndpoint, SharedProxyPool};
use crate::report::{SessionOutcome, SessionReport};
use crate::timing::Jitter;

use super::drive::PageDrive;
use super::error::SessionResult;
use super::explorer::{Explorer, LoopEnd};
use super::launcher::BrowserLauncher;

/// Seam for launching automation handles; tests substitute scripted drives.
#[async_trait]
pub trait DriveFactory: Send + Sync {
    async fn launch(
        &self,
        identity: &IdentityBundle,
        proxy: Option<&ProxyEndpoint>,
    ) -> SessionResult<Box<dyn PageDrive>>;
}

pub struct CdpDriveFactory {
    launcher: BrowserLauncher,
}

impl CdpDriveFactory {
    pub fn new(launcher: BrowserLauncher) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl DriveFactory for CdpDriveFactory {
    async fn launch(
        &self,
        identity: &IdentityBundle,
        proxy: Option<&ProxyEndpoint>,
    ) -> SessionResult<Box<dyn PageDrive>> {
        let drive = self.launcher.launch(identity, proxy).await?;
        Ok(Box::new(drive))
    }
}

/// Fans independent sessions out with staggered starts and runs each one
/// through launch, exploration, and at most one recovery.
#[derive(Clone)]
pub struct SessionRunner {
    config: Arc<AmblerConfig>,
    pool: SharedProxyPool,
    identities: IdentityPool,
    factory: Arc<dyn DriveFactory>,
}

impl SessionRunner {
    pub fn new(config: AmblerConfig, pool: SharedProxyPool, factory: Arc<dyn DriveFactory>) -> Self {
        let identities = IdentityPool::new(config.identity.clone());
        Self {
            config: Arc::new(config),
            pool,
            identities,
            factory,
        }
    }

    /// One task per requested instance; a session failure never aborts its
    /// siblings.
    pub async fn run_all(&self, target: Url) -> Vec<SessionReport> {
        let mut tasks = Vec::new();
        for instance in 0..self.config.session.instances {
            let runner = self.clone();
            let target = target.clone();
            let offset = Duration::from_secs(
                self.config.session.stagger_seconds * u64::from(instance),
            );
            tasks.push(tokio::spawn(async move {
                sleep(offset).await;
                runner.run_session(instance, target).await
            }));
        }
        let mut reports = Vec::new();
        for task in tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(error = %err, "session task aborted"),
            }
        }
        reports
    }

    pub async fn run_session(&self, instance: u32, target: Url) -> SessionReport {
        let mut jitter = Jitter::new();
        let identity = self.identities.sample(&mut jitter);
        let proxy = self.pool.next();
        let mut explorer = Explorer::new(
            instance,
            target.clone(),
            self.config.session.clone(),
            jitter,
        );
        info!(
            session = %explorer.session_id(),
            instance,
            target = %target,
            pages = explorer.budget().target_pages,
            duration = ?explorer.budget().target_duration,
            proxy = proxy.as_ref().map(ProxyEndpoint::address).as_deref().unwrap_or("none"),
            "session starting"
        );

        let first = self
            .attempt(&identity, proxy.as_ref(), &mut explorer, &target)
            .await;
        let (outcome, proxy_used) = match first {
            Ok(end) => (
                SessionOutcome::Completed(end.reason().to_string()),
                proxy.clone(),
            ),
            Err(err) => {
                warn!(
                    session = %explorer.session_id(),
                    error = %err,
                    "fatal transport failure, entering recovery"
                );
                self.recover(&identity, proxy, &mut explorer, &target).await
            }
        };

        let report = explorer.report(proxy_used.map(|p| p.address()), outcome);
        info!("{}", report.summary());
        report
    }

    /// The one-shot recovery protocol: retire the failed proxy, allocate a
    /// replacement, relaunch, and resume the same loop state. A second fatal
    /// error ends the session failed.
    async fn recover(
        &self,
        identity: &IdentityBundle,
        failed_proxy: Option<ProxyEndpoint>,
        explorer: &mut Explorer,
        target: &Url,
    ) -> (SessionOutcome, Option<ProxyEndpoint>) {
        let proxied_run = failed_proxy.is_some();
        if let Some(failed) = &failed_proxy {
            if self.pool.count() > 1 {
                self.pool.mark_dead(&failed.address());
                info!(
                    session = %explorer.session_id(),
                    proxy = %failed.address(),
                    remaining = self.pool.count(),
                    "proxy retired"
                );
            }
        }

        let replacement = if proxied_run {
            match self.pool.next() {
                Some(proxy) => Some(proxy),
                None => {
                    warn!(session = %explorer.session_id(), "no healthy proxies remain");
                    return (
                        SessionOutcome::Failed("proxy pool exhausted during recovery".into()),
                        None,
                    );
                }
            }
        } else {
            None
        };

        match self
            .attempt(identity, replacement.as_ref(), explorer, target)
            .await
        {
            Ok(end) => (
                SessionOutcome::Completed(format!("{} after recovery", end.reason())),
                replacement,
            ),
            Err(err) => {
                warn!(
                    session = %explorer.session_id(),
                    error = %err,
                    "second fatal failure, session failed"
                );
                (
                    SessionOutcome::Failed(format!("fatal after recovery: {err}")),
                    replacement,
                )
            }
        }
    }

    async fn attempt(
        &self,
        identity: &IdentityBundle,
        proxy: Option<&ProxyEndpoint>,
        explorer: &mut Explorer,
        target: &Url,
    ) -> SessionResult<LoopEnd> {
        let mut drive = self.factory.launch(identity, proxy).await?;
        let result = {
            let drive = drive.as_mut();
            match drive.goto(target.as_str()).await {
                Ok(()) => explorer.run(drive).await,
                Err(err) => Err(err),
            }
        };
        drive.close().await;
        result
    }
}
