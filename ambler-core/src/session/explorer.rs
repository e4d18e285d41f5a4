use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::SessionSection;
use crate::report::{ActionRecord, SessionOutcome, SessionReport};
use crate::timing::Jitter;

use super::actions::ActionScheduler;
use super::consent::ConsentHandler;
use super::drive::{is_navigable, PageDrive};
use super::error::SessionResult;

/// Page and wall-time targets, drawn once at session creation.
#[derive(Debug, Clone, Copy)]
pub struct SessionBudget {
    pub target_pages: usize,
    pub target_duration: Duration,
}

impl SessionBudget {
    pub fn draw(config: &SessionSection, jitter: &mut Jitter) -> Self {
        let pages = jitter.range_u32((config.pages[0], config.pages[1])) as usize;
        let seconds = jitter.range_u64((config.duration_seconds[0], config.duration_seconds[1]));
        Self {
            target_pages: pages.max(1),
            target_duration: Duration::from_secs(seconds),
        }
    }
}

/// The distinguishable ways an exploration loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    PageBudget,
    TimeExhausted,
    LinksExhausted,
    NavigationFailed,
}

impl LoopEnd {
    pub fn reason(&self) -> &'static str {
        match self {
            LoopEnd::PageBudget => "page budget reached",
            LoopEnd::TimeExhausted => "time budget exhausted",
            LoopEnd::LinksExhausted => "link exhaustion",
            LoopEnd::NavigationFailed => "unrecoverable navigation failure",
        }
    }
}

impl fmt::Display for LoopEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// One session's state machine. Owns the visited set and action log; budgets
/// are recomputed on demand, never cached. Survives a recovery relaunch so a
/// resumed loop keeps the same budget clock and visited pages.
pub struct Explorer {
    session_id: String,
    instance: u32,
    target_url: Url,
    config: SessionSection,
    budget: SessionBudget,
    started_at: DateTime<Utc>,
    clock: Instant,
    visited: HashSet<String>,
    actions: Vec<ActionRecord>,
    jitter: Jitter,
}

impl Explorer {
    pub fn new(instance: u32, target_url: Url, config: SessionSection, mut jitter: Jitter) -> Self {
        let budget = SessionBudget::draw(&config, &mut jitter);
        Self {
            session_id: Uuid::new_v4().to_string(),
            instance,
            target_url,
            config,
            budget,
            started_at: Utc::now(),
            clock: Instant::now(),
            visited: HashSet::new(),
            actions: Vec::new(),
            jitter,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn budget(&self) -> SessionBudget {
        self.budget
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    fn timed_out(&self) -> bool {
        self.clock.elapsed() >= self.budget.target_duration
    }

    fn pages_remaining(&self) -> bool {
        self.visited.len() < self.budget.target_pages
    }

    fn note_visit(&mut self, url: &str) {
        if let Some(normalized) = normalize_url(url) {
            self.visited.insert(normalized);
        }
    }

    fn record(&mut self, kind: &str, detail: impl Into<String>, page_url: &str) {
        self.actions.push(ActionRecord::now(kind, detail, page_url));
    }

    /// Runs page cycles until a budget is exhausted, links run dry, or the
    /// context cannot be recovered. Fatal transport errors escape to the
    /// caller's recovery protocol.
    pub async fn run(&mut self, drive: &mut dyn PageDrive) -> SessionResult<LoopEnd> {
        if let Some(url) = drive.current_url().await? {
            if is_navigable(Some(&url)) {
                self.note_visit(&url);
            }
        }

        loop {
            if !self.pages_remaining() {
                info!(session = %self.session_id, pages = self.visited.len(), "exploration ended: {}", LoopEnd::PageBudget);
                return Ok(LoopEnd::PageBudget);
            }
            if self.timed_out() {
                info!(session = %self.session_id, elapsed = ?self.clock.elapsed(), "exploration ended: {}", LoopEnd::TimeExhausted);
                return Ok(LoopEnd::TimeExhausted);
            }

            let mut current = drive.current_url().await?;
            if !is_navigable(current.as_deref()) {
                warn!(session = %self.session_id, "context not navigable, renavigating to target");
                drive.goto(self.target_url.as_str()).await?;
                current = drive.current_url().await?;
                if !is_navigable(current.as_deref()) {
                    warn!(session = %self.session_id, "exploration ended: {}", LoopEnd::NavigationFailed);
                    return Ok(LoopEnd::NavigationFailed);
                }
            }
            let page_url = current.unwrap_or_default();
            self.note_visit(&page_url);

            if ConsentHandler::dismiss(drive, &mut self.jitter).await? {
                self.record("consent", "overlay dismissed", &page_url);
            }

            let planned = self.jitter.range_u32((
                self.config.actions_per_page[0],
                self.config.actions_per_page[1],
            ));
            let mut navigated = false;
            for _ in 0..planned {
                if self.timed_out() {
                    break;
                }
                let tick = ActionScheduler::tick(drive, &mut self.jitter).await?;
                self.record(tick.kind.label(), tick.detail.clone(), &page_url);
                if tick.navigated {
                    navigated = true;
                    break;
                }
                let pause = (self.config.action_pause_ms[0], self.config.action_pause_ms[1]);
                self.jitter.pause_ms(pause).await;
            }

            let after = drive.current_url().await?;
            let unchanged = after.as_deref() == Some(page_url.as_str());
            if unchanged && !navigated {
                if self.pages_remaining() && !self.timed_out() {
                    match self.follow_link(drive, &page_url).await? {
                        Some(next) => {
                            self.note_visit(&next);
                            self.record("navigate", format!("followed link to {next}"), &page_url);
                        }
                        None => {
                            info!(session = %self.session_id, "exploration ended: {}", LoopEnd::LinksExhausted);
                            return Ok(LoopEnd::LinksExhausted);
                        }
                    }
                }
            } else if let Some(after_url) = after {
                if !unchanged {
                    self.note_visit(&after_url);
                    self.record("navigate", format!("action led to {after_url}"), &page_url);
                }
            }

            let pause = (self.config.page_pause_ms[0], self.config.page_pause_ms[1]);
            self.jitter.pause_ms(pause).await;
        }
    }

    async fn follow_link(
        &mut self,
        drive: &mut dyn PageDrive,
        page_url: &str,
    ) -> SessionResult<Option<String>> {
        let value = match drive.eval(COLLECT_LINKS_SCRIPT).await {
            Ok(value) => value,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(session = %self.session_id, error = %err, "link collection failed");
                return Ok(None);
            }
        };
        let hrefs: Vec<String> = serde_json::from_value(value).unwrap_or_default();
        let Ok(base) = Url::parse(page_url) else {
            return Ok(None);
        };
        let candidates: Vec<String> = normalize_links(&base, &hrefs)
            .into_iter()
            .filter(|link| !self.visited.contains(link))
            .collect();
        let Some(next) = self.jitter.pick(&candidates).cloned() else {
            return Ok(None);
        };
        debug!(session = %self.session_id, url = %next, unvisited = candidates.len(), "following link");
        drive.goto(&next).await?;
        Ok(Some(next))
    }

    pub fn report(&self, proxy: Option<String>, outcome: SessionOutcome) -> SessionReport {
        let mut visited_urls: Vec<String> = self.visited.iter().cloned().collect();
        visited_urls.sort();
        SessionReport {
            session_id: self.session_id.clone(),
            instance: self.instance,
            target_url: self.target_url.to_string(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration_seconds: self.clock.elapsed().as_secs(),
            pages_visited: self.visited.len(),
            visited_urls,
            action_count: self.actions.len(),
            actions: self.actions.clone(),
            proxy,
            outcome,
        }
    }
}

/// Resolves hrefs against the page, keeps same-origin http(s) targets,
/// strips fragments, and dedups. Calling it twice on the same input yields
/// the same set.
pub fn normalize_links(base: &Url, hrefs: &[String]) -> BTreeSet<String> {
    let mut links = BTreeSet::new();
    for href in hrefs {
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if resolved.origin() != base.origin() {
            continue;
        }
        resolved.set_fragment(None);
        links.insert(resolved.to_string());
    }
    links
}

fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

const COLLECT_LINKS_SCRIPT: &str = r#"
(() => { // __amblerCollectLinks
    const out = [];
    for (const a of document.querySelectorAll('a[href]')) {
        const href = a.getAttribute('href');
        if (!href) continue;
        const lower = href.toLowerCase();
        if (lower.startsWith('javascript:') || lower.startsWith('mailto:') || lower.startsWith('tel:')) continue;
        out.push(href);
    }
    return out;
})()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://shop.example.com/catalog/page?view=grid").unwrap()
    }

    #[test]
    fn normalize_links_keeps_same_origin_only() {
        let hrefs = vec![
            "/about".to_string(),
            "https://shop.example.com/cart".to_string(),
            "https://other.example.com/elsewhere".to_string(),
            "http://shop.example.com/downgraded".to_string(),
            "mailto:sales@example.com".to_string(),
        ];
        let links = normalize_links(&base(), &hrefs);
        assert!(links.contains("https://shop.example.com/about"));
        assert!(links.contains("https://shop.example.com/cart"));
        // different origin (host or scheme) is excluded
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn normalize_links_strips_fragments_and_dedups() {
        let hrefs = vec![
            "/item#reviews".to_string(),
            "/item#specs".to_string(),
            "/item".to_string(),
        ];
        let links = normalize_links(&base(), &hrefs);
        assert_eq!(links.len(), 1);
        assert!(links.contains("https://shop.example.com/item"));
    }

    #[test]
    fn normalize_links_is_idempotent() {
        let hrefs = vec![
            "/a".to_string(),
            "/b#x".to_string(),
            "relative/path".to_string(),
        ];
        let first = normalize_links(&base(), &hrefs);
        let second = normalize_links(&base(), &hrefs);
        assert_eq!(first, second);
    }

    #[test]
    fn budget_draw_stays_inside_configured_ranges() {
        let config = SessionSection::default();
        let mut jitter = Jitter::seeded(8);
        for _ in 0..100 {
            let budget = SessionBudget::draw(&config, &mut jitter);
            assert!(budget.target_pages >= config.pages[0] as usize);
            assert!(budget.target_pages <= config.pages[1] as usize);
            let secs = budget.target_duration.as_secs();
            assert!(secs >= config.duration_seconds[0] && secs <= config.duration_seconds[1]);
        }
    }
}
