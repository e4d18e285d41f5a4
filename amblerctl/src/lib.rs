use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use url::Url;

use ambler_core::{
    AmblerConfig, BrowserLauncher, CdpDriveFactory, HttpProbe, SessionOutcome, SessionReport,
    SessionRunner, SharedProxyPool,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ambler_core::ConfigError),
    #[error("no target URL resolvable; pass one as the first argument, e.g. `amblerctl https://example.com`")]
    MissingTarget,
    #[error("invalid target URL '{url}': {source}")]
    InvalidTarget {
        url: String,
        source: url::ParseError,
    },
    #[error("proxy error: {0}")]
    Proxy(#[from] ambler_core::ProxyError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Drives organic-looking browsing sessions against a target site", long_about = None)]
pub struct Cli {
    /// Target URL the sessions explore
    pub target: Option<String>,
    /// Path to an ambler.toml run profile (defaults apply when absent)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Override the number of concurrent sessions
    #[arg(long)]
    pub instances: Option<u32>,
    /// Override the proxy list file
    #[arg(long)]
    pub proxies: Option<PathBuf>,
    /// Run browsers with a visible window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
    /// Output format for the run report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn run(cli: Cli) -> Result<()> {
    let target = resolve_target(cli.target.as_deref())?;
    let mut config = match &cli.config {
        Some(path) => AmblerConfig::load(path)?,
        None => AmblerConfig::default(),
    };
    if let Some(instances) = cli.instances {
        config.session.instances = instances;
    }
    if let Some(proxies) = &cli.proxies {
        config.proxy.list_file = Some(proxies.display().to_string());
    }
    if cli.headed {
        config.browser.headless = false;
    }
    config.validate()?;

    let probe = HttpProbe::from_config(&config.proxy);
    let list_file = config.proxy.list_file.clone().map(PathBuf::from);
    let pool = SharedProxyPool::initialize(
        list_file.as_deref(),
        config.proxy.check_concurrency,
        &probe,
    )
    .await?;

    let launcher = BrowserLauncher::new(
        config.browser.clone(),
        Duration::from_secs(config.session.navigation_timeout_seconds),
    );
    let factory = Arc::new(CdpDriveFactory::new(launcher));
    let runner = SessionRunner::new(config, pool, factory);
    let reports = runner.run_all(target).await;
    render(&reports, cli.format)?;
    Ok(())
}

pub fn resolve_target(raw: Option<&str>) -> Result<Url> {
    let Some(raw) = raw else {
        return Err(AppError::MissingTarget);
    };
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate).map_err(|source| AppError::InvalidTarget {
        url: raw.to_string(),
        source,
    })
}

fn render(reports: &[SessionReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Text => {
            for report in reports {
                println!("{}", report.summary());
            }
            println!("{}", totals_line(reports));
        }
    }
    Ok(())
}

pub fn totals_line(reports: &[SessionReport]) -> String {
    let completed = reports
        .iter()
        .filter(|report| matches!(report.outcome, SessionOutcome::Completed(_)))
        .count();
    let pages: usize = reports.iter().map(|report| report.pages_visited).sum();
    let actions: usize = reports.iter().map(|report| report.action_count).sum();
    format!(
        "total: {} sessions ({} completed), {} pages, {} actions",
        reports.len(),
        completed,
        pages,
        actions
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_target_is_a_usage_error() {
        assert!(matches!(resolve_target(None), Err(AppError::MissingTarget)));
    }

    #[test]
    fn bare_hosts_get_a_scheme() {
        let url = resolve_target(Some("example.com")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn explicit_scheme_is_preserved() {
        let url = resolve_target(Some("http://example.com/landing")).unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn garbage_targets_are_rejected() {
        assert!(matches!(
            resolve_target(Some("http://")),
            Err(AppError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn totals_line_counts_outcomes() {
        use chrono::Utc;
        let report = |outcome: SessionOutcome, pages: usize| SessionReport {
            session_id: "s".into(),
            instance: 0,
            target_url: "https://example.com/".into(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            duration_seconds: 1,
            pages_visited: pages,
            visited_urls: Vec::new(),
            action_count: pages * 2,
            actions: Vec::new(),
            proxy: None,
            outcome,
        };
        let reports = vec![
            report(SessionOutcome::Completed("page budget reached".into()), 4),
            report(SessionOutcome::Failed("fatal after recovery".into()), 1),
        ];
        let line = totals_line(&reports);
        assert!(line.contains("2 sessions (1 completed)"));
        assert!(line.contains("5 pages"));
        assert!(line.contains("10 actions"));
    }
}
