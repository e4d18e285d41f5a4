use serde_json::Value;
use tracing::debug;

use crate::patterns::{
    ACCEPT_PHRASES, CONSENT_CONTAINER_HINTS, CONSENT_FRAME_KEYWORDS, CONSENT_SELECTORS,
};
use crate::timing::Jitter;

use super::drive::PageDrive;
use super::error::SessionResult;

/// Best-effort cookie/privacy overlay dismissal. Three tiers fall through in
/// order; each runs only when the prior tier found nothing. Finding nothing
/// at all is the expected outcome on most pages and stays silent.
pub struct ConsentHandler;

struct ConsentHit {
    x: f64,
    y: f64,
    via: String,
}

impl ConsentHandler {
    pub async fn dismiss(drive: &mut dyn PageDrive, jitter: &mut Jitter) -> SessionResult<bool> {
        let tiers = [
            ("known", known_patterns_script()),
            ("text", text_patterns_script()),
            ("frame", frame_patterns_script()),
        ];
        for (tier, script) in tiers {
            let value = match drive.eval(&script).await {
                Ok(value) => value,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(tier, error = %err, "consent tier evaluation failed");
                    continue;
                }
            };
            if let Some(blocked) = value.get("blocked").and_then(Value::as_u64) {
                debug!(tier, blocked, "consent frames not scriptable, skipped");
                continue;
            }
            let Some(hit) = parse_hit(&value) else {
                continue;
            };
            jitter.pause_ms((200, 600)).await;
            let press = jitter.range_u64((40, 120));
            let click = drive
                .click_at(hit.x + jitter.offset(3.0), hit.y + jitter.offset(2.0), press)
                .await;
            match click {
                Ok(()) => {
                    jitter.pause_ms((500, 1_200)).await;
                    debug!(tier, via = %hit.via, "consent overlay dismissed");
                    return Ok(true);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(tier, error = %err, "consent click failed");
                }
            }
        }
        debug!("no consent overlay found");
        Ok(false)
    }
}

fn parse_hit(value: &Value) -> Option<ConsentHit> {
    let x = value.get("x")?.as_f64()?;
    let y = value.get("y")?.as_f64()?;
    let via = value
        .get("via")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    Some(ConsentHit { x, y, via })
}

fn json_list(items: &[&str]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn known_patterns_script() -> String {
    format!(
        r#"
(() => {{ // __amblerConsentKnown
    const selectors = {selectors};
    const visible = (el) => {{
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 4 && r.height > 4 && s.visibility !== 'hidden' && s.display !== 'none';
    }};
    for (const sel of selectors) {{
        let el = null;
        try {{ el = document.querySelector(sel); }} catch (_) {{ continue; }}
        if (el && visible(el)) {{
            el.scrollIntoView({{ block: 'center' }});
            const r = el.getBoundingClientRect();
            return {{ x: r.x + r.width / 2, y: r.y + r.height / 2, via: sel }};
        }}
    }}
    return null;
}})()
"#,
        selectors = json_list(CONSENT_SELECTORS)
    )
}

fn text_patterns_script() -> String {
    format!(
        r#"
(() => {{ // __amblerConsentText
    const phrases = {phrases};
    const hints = {hints};
    const visible = (el) => {{
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 4 && r.height > 4 && s.visibility !== 'hidden' && s.display !== 'none';
    }};
    const accepts = (el) => {{
        const text = (el.innerText || el.textContent || '').trim().toLowerCase();
        return text.length > 0 && text.length < 80 && phrases.some(p => text.includes(p));
    }};
    for (const sel of ['button', "[role='button']", 'a']) {{
        for (const el of document.querySelectorAll(sel)) {{
            if (visible(el) && accepts(el)) {{
                el.scrollIntoView({{ block: 'center' }});
                const r = el.getBoundingClientRect();
                return {{ x: r.x + r.width / 2, y: r.y + r.height / 2, via: 'text:' + sel }};
            }}
        }}
    }}
    const hintSelector = hints.map(h => `[class*='${{h}}'],[id*='${{h}}']`).join(',');
    for (const container of document.querySelectorAll(hintSelector)) {{
        if (!visible(container)) continue;
        const child = container.querySelector("button, [role='button'], a");
        if (child && visible(child)) {{
            child.scrollIntoView({{ block: 'center' }});
            const r = child.getBoundingClientRect();
            return {{ x: r.x + r.width / 2, y: r.y + r.height / 2, via: 'container' }};
        }}
    }}
    return null;
}})()
"#,
        phrases = json_list(ACCEPT_PHRASES),
        hints = json_list(CONSENT_CONTAINER_HINTS)
    )
}

fn frame_patterns_script() -> String {
    format!(
        r#"
(() => {{ // __amblerConsentFrames
    const selectors = {selectors};
    const phrases = {phrases};
    const keywords = {keywords};
    let blocked = 0;
    for (const frame of document.querySelectorAll('iframe')) {{
        const src = (frame.src || '').toLowerCase();
        if (!keywords.some(k => src.includes(k))) continue;
        let doc = null;
        try {{ doc = frame.contentDocument; }} catch (_) {{ doc = null; }}
        if (!doc || !doc.body) {{ blocked += 1; continue; }}
        const base = frame.getBoundingClientRect();
        const hit = (el, via) => {{
            const r = el.getBoundingClientRect();
            if (r.width < 4 || r.height < 4) return null;
            return {{ x: base.x + r.x + r.width / 2, y: base.y + r.y + r.height / 2, via }};
        }};
        for (const sel of selectors) {{
            let el = null;
            try {{ el = doc.querySelector(sel); }} catch (_) {{ continue; }}
            if (el) {{
                const point = hit(el, 'frame:' + sel);
                if (point) return point;
            }}
        }}
        for (const el of doc.querySelectorAll("button, [role='button'], a")) {{
            const text = (el.innerText || el.textContent || '').trim().toLowerCase();
            if (text.length > 0 && text.length < 80 && phrases.some(p => text.includes(p))) {{
                const point = hit(el, 'frame:text');
                if (point) return point;
            }}
        }}
    }}
    return blocked > 0 ? {{ blocked }} : null;
}})()
"#,
        selectors = json_list(CONSENT_SELECTORS),
        phrases = json_list(ACCEPT_PHRASES),
        keywords = json_list(CONSENT_FRAME_KEYWORDS)
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::session::error::SessionResult;

    #[derive(Default)]
    struct ScriptedDrive {
        known_hit: Option<Value>,
        text_hit: Option<Value>,
        frame_hit: Option<Value>,
        evals: Vec<String>,
        clicks: Vec<(f64, f64)>,
    }

    #[async_trait]
    impl PageDrive for ScriptedDrive {
        async fn goto(&mut self, _url: &str) -> SessionResult<()> {
            Ok(())
        }
        async fn current_url(&mut self) -> SessionResult<Option<String>> {
            Ok(Some("https://example.com/".into()))
        }
        async fn eval(&mut self, script: &str) -> SessionResult<Value> {
            self.evals.push(script.to_string());
            let hit = if script.contains("__amblerConsentKnown") {
                self.known_hit.clone()
            } else if script.contains("__amblerConsentText") {
                self.text_hit.clone()
            } else if script.contains("__amblerConsentFrames") {
                self.frame_hit.clone()
            } else {
                None
            };
            Ok(hit.unwrap_or(Value::Null))
        }
        async fn move_mouse(&mut self, _x: f64, _y: f64) -> SessionResult<()> {
            Ok(())
        }
        async fn click_at(&mut self, x: f64, y: f64, _press_ms: u64) -> SessionResult<()> {
            self.clicks.push((x, y));
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
    async fn no_match_in_any_tier_returns_false_without_clicking() {
        let mut drive = ScriptedDrive::default();
        let mut jitter = Jitter::seeded(1);
        let dismissed = ConsentHandler::dismiss(&mut drive, &mut jitter).await.unwrap();
        assert!(!dismissed);
        assert!(drive.clicks.is_empty(), "page state must stay untouched");
        assert_eq!(drive.evals.len(), 3, "all three tiers searched");
    }

    #[tokio::test(start_paused = true)]
    async fn known_pattern_hit_short_circuits_later_tiers() {
        let mut drive = ScriptedDrive {
            known_hit: Some(json!({ "x": 120.0, "y": 340.0, "via": "#onetrust-accept-btn-handler" })),
            ..ScriptedDrive::default()
        };
        let mut jitter = Jitter::seeded(2);
        let dismissed = ConsentHandler::dismiss(&mut drive, &mut jitter).await.unwrap();
        assert!(dismissed);
        assert_eq!(drive.clicks.len(), 1);
        assert_eq!(drive.evals.len(), 1, "tiers two and three never run");
        let (x, y) = drive.clicks[0];
        assert!((x - 120.0).abs() <= 3.0);
        assert!((y - 340.0).abs() <= 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_tier_runs_after_document_tiers_miss() {
        let mut drive = ScriptedDrive {
            frame_hit: Some(json!({ "x": 50.0, "y": 60.0, "via": "frame:text" })),
            ..ScriptedDrive::default()
        };
        let mut jitter = Jitter::seeded(3);
        let dismissed = ConsentHandler::dismiss(&mut drive, &mut jitter).await.unwrap();
        assert!(dismissed);
        assert_eq!(drive.evals.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_frames_do_not_count_as_dismissal() {
        let mut drive = ScriptedDrive {
            frame_hit: Some(json!({ "blocked": 2 })),
            ..ScriptedDrive::default()
        };
        let mut jitter = Jitter::seeded(4);
        let dismissed = ConsentHandler::dismiss(&mut drive, &mut jitter).await.unwrap();
        assert!(!dismissed);
        assert!(drive.clicks.is_empty());
    }
}
