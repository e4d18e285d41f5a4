use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;

use ambler_core::proxy::{ProxyEndpoint, ProxyPool, SharedProxyPool};
use ambler_core::report::SessionOutcome;
use ambler_core::session::{
    DriveFactory, Explorer, LoopEnd, PageDrive, SessionError, SessionResult, SessionRunner,
};
use ambler_core::{AmblerConfig, IdentityBundle, Jitter, SessionSection};

fn tight_session() -> SessionSection {
    SessionSection {
        pages: [3, 3],
        duration_seconds: [3_600, 3_600],
        actions_per_page: [2, 3],
        page_pause_ms: [1, 2],
        action_pause_ms: [1, 2],
        ..SessionSection::default()
    }
}

/// Scripted page driver: a site map of url -> outgoing hrefs, optional
/// consent hits, optional goto failures. Action discovery scripts find
/// nothing so every scheduler tick degrades to no-effect.
#[derive(Default)]
struct MockDrive {
    pages: HashMap<String, Vec<String>>,
    consent_hits: HashMap<String, Value>,
    current: Option<String>,
    fail_on_goto: bool,
    goto_log: Vec<String>,
    consent_clicks: usize,
}

impl MockDrive {
    fn with_pages(pages: &[(&str, &[&str])]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, links)| {
                    (
                        (*url).to_string(),
                        links.iter().map(|link| (*link).to_string()).collect(),
                    )
                })
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PageDrive for MockDrive {
    async fn goto(&mut self, url: &str) -> SessionResult<()> {
        if self.fail_on_goto {
            return Err(SessionError::Transport("socket closed".into()));
        }
        self.goto_log.push(url.to_string());
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> SessionResult<Option<String>> {
        Ok(self.current.clone())
    }

    async fn eval(&mut self, script: &str) -> SessionResult<Value> {
        if script.contains("__amblerCollectLinks") {
            let links = self
                .current
                .as_ref()
                .and_then(|url| self.pages.get(url))
                .cloned()
                .unwrap_or_default();
            return Ok(json!(links));
        }
        if script.contains("__amblerConsentKnown") {
            if let Some(url) = &self.current {
                if let Some(hit) = self.consent_hits.remove(url) {
                    return Ok(hit);
                }
            }
            return Ok(Value::Null);
        }
        if script.contains("__amblerMediaProbe") {
            return Ok(json!({ "videos": 0, "audios": 0 }));
        }
        if script.contains("window.history.length") {
            return Ok(json!(1));
        }
        if script.contains("ontouchstart") {
            return Ok(json!(false));
        }
        if script.contains("window.innerWidth") {
            return Ok(json!({ "w": 1280.0, "h": 720.0 }));
        }
        // Spot discovery and the remaining consent tiers find nothing.
        if script.contains("Spots") || script.contains("__amblerSearchInput") {
            return Ok(json!([]));
        }
        Ok(Value::Null)
    }

    async fn move_mouse(&mut self, _x: f64, _y: f64) -> SessionResult<()> {
        Ok(())
    }

    async fn click_at(&mut self, _x: f64, _y: f64, _press_ms: u64) -> SessionResult<()> {
        self.consent_clicks += 1;
        Ok(())
    }

    async fn press_key(&mut self, _key: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn type_char(&mut self, _ch: char) -> SessionResult<()> {
        Ok(())
    }

    async fn scroll_by(&mut self, _dx: f64, _dy: f64) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

#[tokio::test(start_paused = true)]
async fn zero_unvisited_links_terminates_with_link_exhaustion() {
    let target = Url::parse("https://site.test/").unwrap();
    let mut drive = MockDrive::with_pages(&[("https://site.test/", &[])]);
    drive.goto(target.as_str()).await.unwrap();

    let mut explorer = Explorer::new(0, target, tight_session(), Jitter::seeded(21));
    let end = explorer.run(&mut drive).await.unwrap();

    assert_eq!(end, LoopEnd::LinksExhausted);
    assert_eq!(explorer.visited().len(), 1, "budget of 3 pages left unmet");
    assert!(explorer.visited().contains("https://site.test/"));
}

#[tokio::test(start_paused = true)]
async fn page_budget_reached_through_link_following() {
    let target = Url::parse("https://site.test/").unwrap();
    let mut drive = MockDrive::with_pages(&[
        ("https://site.test/", &["/a", "/b", "/c"]),
        ("https://site.test/a", &["/b", "/c"]),
        ("https://site.test/b", &["/a", "/c"]),
        ("https://site.test/c", &["/a", "/b"]),
    ]);
    drive.goto(target.as_str()).await.unwrap();

    let mut explorer = Explorer::new(0, target, tight_session(), Jitter::seeded(22));
    let end = explorer.run(&mut drive).await.unwrap();

    assert_eq!(end, LoopEnd::PageBudget);
    assert_eq!(explorer.visited().len(), 3);
    assert_eq!(drive.goto_log.len(), 3, "initial entry plus two followed links");
    for url in explorer.visited() {
        assert!(url.starts_with("https://site.test/"), "same-origin only: {url}");
    }
}

#[tokio::test(start_paused = true)]
async fn visited_set_never_shrinks_or_duplicates() {
    let target = Url::parse("https://site.test/").unwrap();
    let mut drive = MockDrive::with_pages(&[
        ("https://site.test/", &["/a", "/a#top", "/a#bottom"]),
        ("https://site.test/a", &["/", "/#main"]),
    ]);
    drive.goto(target.as_str()).await.unwrap();

    let mut explorer = Explorer::new(0, target, tight_session(), Jitter::seeded(23));
    let end = explorer.run(&mut drive).await.unwrap();

    // Fragment variants collapse onto two real pages; nothing else remains.
    assert_eq!(end, LoopEnd::LinksExhausted);
    assert_eq!(explorer.visited().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_context_ends_with_navigation_failure() {
    let target = Url::parse("https://site.test/").unwrap();
    let mut drive = MockDrive::default();
    drive.current = Some("chrome-error://chromewebdata/".into());
    // Renavigation "succeeds" but never reaches a web context.
    drive
        .pages
        .insert("https://site.test/".into(), Vec::new());

    let mut explorer = Explorer::new(0, target, tight_session(), Jitter::seeded(24));
    // goto() would normally reset current; force it to stay broken.
    struct BrokenDrive(MockDrive);
    #[async_trait]
    impl PageDrive for BrokenDrive {
        async fn goto(&mut self, _url: &str) -> SessionResult<()> {
            self.0.current = Some("chrome-error://chromewebdata/".into());
            Ok(())
        }
        async fn current_url(&mut self) -> SessionResult<Option<String>> {
            self.0.current_url().await
        }
        async fn eval(&mut self, script: &str) -> SessionResult<Value> {
            self.0.eval(script).await
        }
        async fn move_mouse(&mut self, x: f64, y: f64) -> SessionResult<()> {
            self.0.move_mouse(x, y).await
        }
        async fn click_at(&mut self, x: f64, y: f64, press_ms: u64) -> SessionResult<()> {
            self.0.click_at(x, y, press_ms).await
        }
        async fn press_key(&mut self, key: &str) -> SessionResult<()> {
            self.0.press_key(key).await
        }
        async fn type_char(&mut self, ch: char) -> SessionResult<()> {
            self.0.type_char(ch).await
        }
        async fn scroll_by(&mut self, dx: f64, dy: f64) -> SessionResult<()> {
            self.0.scroll_by(dx, dy).await
        }
        async fn close(&mut self) {}
    }
    let mut broken = BrokenDrive(drive);

    let end = explorer.run(&mut broken).await.unwrap();
    assert_eq!(end, LoopEnd::NavigationFailed);
}

#[tokio::test(start_paused = true)]
async fn consent_dismissal_is_recorded_once_per_page() {
    let target = Url::parse("https://site.test/").unwrap();
    let mut drive = MockDrive::with_pages(&[("https://site.test/", &[])]);
    drive.consent_hits.insert(
        "https://site.test/".into(),
        json!({ "x": 100.0, "y": 200.0, "via": "#onetrust-accept-btn-handler" }),
    );
    drive.goto(target.as_str()).await.unwrap();

    let mut explorer = Explorer::new(0, target, tight_session(), Jitter::seeded(25));
    explorer.run(&mut drive).await.unwrap();

    let report = explorer.report(None, SessionOutcome::Completed("link exhaustion".into()));
    let consent_records = report
        .actions
        .iter()
        .filter(|record| record.kind == "consent")
        .count();
    assert_eq!(consent_records, 1);
    assert_eq!(drive.consent_clicks, 1);
}

/// Factory that replays a fixed sequence of drives, one per launch.
struct SequenceFactory {
    scripts: Mutex<VecDeque<MockDrive>>,
}

impl SequenceFactory {
    fn new(drives: Vec<MockDrive>) -> Self {
        Self {
            scripts: Mutex::new(drives.into()),
        }
    }
}

#[async_trait]
impl DriveFactory for SequenceFactory {
    async fn launch(
        &self,
        _identity: &IdentityBundle,
        _proxy: Option<&ProxyEndpoint>,
    ) -> SessionResult<Box<dyn PageDrive>> {
        let mut scripts = self.scripts.lock().await;
        let drive = scripts.pop_front().unwrap_or_else(|| MockDrive {
            fail_on_goto: true,
            ..MockDrive::default()
        });
        Ok(Box::new(drive))
    }
}

fn two_proxy_pool() -> SharedProxyPool {
    SharedProxyPool::new(ProxyPool::from_entries(vec![
        ProxyEndpoint::parse("http://proxy-a.test:3128").unwrap(),
        ProxyEndpoint::parse("http://proxy-b.test:3128").unwrap(),
    ]))
}

fn runner_config() -> AmblerConfig {
    let mut config = AmblerConfig::default();
    config.session = tight_session();
    config
}

#[tokio::test(start_paused = true)]
async fn recovery_retires_failed_proxy_and_resumes_on_survivor() {
    let pool = two_proxy_pool();
    let failing = MockDrive {
        fail_on_goto: true,
        ..MockDrive::default()
    };
    let healthy = MockDrive::with_pages(&[("https://site.test/", &[])]);
    let factory = Arc::new(SequenceFactory::new(vec![failing, healthy]));
    let runner = SessionRunner::new(runner_config(), pool.clone(), factory);

    let report = runner
        .run_session(0, Url::parse("https://site.test/").unwrap())
        .await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed("link exhaustion after recovery".into())
    );
    assert_eq!(report.proxy.as_deref(), Some("http://proxy-b.test:3128"));
    // Entry A is gone for good; rotation now only ever yields B.
    assert_eq!(pool.count(), 1);
    for _ in 0..4 {
        assert_eq!(
            pool.next().unwrap().address(),
            "http://proxy-b.test:3128"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn second_fatal_error_fails_the_session_without_retry() {
    let pool = two_proxy_pool();
    let factory = Arc::new(SequenceFactory::new(vec![
        MockDrive {
            fail_on_goto: true,
            ..MockDrive::default()
        },
        MockDrive {
            fail_on_goto: true,
            ..MockDrive::default()
        },
    ]));
    let runner = SessionRunner::new(runner_config(), pool.clone(), factory);

    let report = runner
        .run_session(0, Url::parse("https://site.test/").unwrap())
        .await;

    assert!(matches!(report.outcome, SessionOutcome::Failed(_)));
    assert_eq!(report.pages_visited, 0);
}

#[tokio::test(start_paused = true)]
async fn proxyless_session_recovers_without_a_proxy() {
    let pool = SharedProxyPool::default();
    let failing = MockDrive {
        fail_on_goto: true,
        ..MockDrive::default()
    };
    let healthy = MockDrive::with_pages(&[("https://site.test/", &[])]);
    let factory = Arc::new(SequenceFactory::new(vec![failing, healthy]));
    let runner = SessionRunner::new(runner_config(), pool, factory);

    let report = runner
        .run_session(0, Url::parse("https://site.test/").unwrap())
        .await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed("link exhaustion after recovery".into())
    );
    assert!(report.proxy.is_none());
}
