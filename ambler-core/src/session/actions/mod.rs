use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::timing::Jitter;

use super::drive::PageDrive;
use super::error::SessionResult;

mod back;
mod click;
mod hover;
mod idle;
mod media;
mod scroll;
mod typing;
mod zoom;

/// Closed set of behaviors the scheduler can emit. Dispatch is an exhaustive
/// match, so adding a kind without a handler fails to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Scroll,
    Hover,
    Type,
    Click,
    Back,
    Media,
    Zoom,
    Idle,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Scroll => "scroll",
            ActionKind::Hover => "hover",
            ActionKind::Type => "type",
            ActionKind::Click => "click",
            ActionKind::Back => "back",
            ActionKind::Media => "media",
            ActionKind::Zoom => "zoom",
            ActionKind::Idle => "idle",
        }
    }

    /// Kinds whose handlers can change the page address. Only these get the
    /// before/after URL comparison.
    pub fn may_navigate(&self) -> bool {
        matches!(self, ActionKind::Type | ActionKind::Click | ActionKind::Back)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Idle carries the remainder; the table must sum to 1.0.
pub const ACTION_WEIGHTS: [(ActionKind, f64); 8] = [
    (ActionKind::Scroll, 0.25),
    (ActionKind::Hover, 0.12),
    (ActionKind::Type, 0.08),
    (ActionKind::Click, 0.18),
    (ActionKind::Back, 0.08),
    (ActionKind::Media, 0.07),
    (ActionKind::Zoom, 0.07),
    (ActionKind::Idle, 0.15),
];

/// Cumulative-threshold selection on a single uniform draw in [0, 1).
pub fn draw_kind(roll: f64) -> ActionKind {
    let mut cumulative = 0.0;
    for (kind, weight) in ACTION_WEIGHTS {
        cumulative += weight;
        if roll < cumulative {
            return kind;
        }
    }
    ActionKind::Idle
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEffect {
    Performed,
    NoEffect,
}

#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub effect: ActionEffect,
    pub detail: String,
}

impl ActionOutcome {
    pub fn performed(detail: impl Into<String>) -> Self {
        Self {
            effect: ActionEffect::Performed,
            detail: detail.into(),
        }
    }

    pub fn none(detail: impl Into<String>) -> Self {
        Self {
            effect: ActionEffect::NoEffect,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub kind: ActionKind,
    pub effect: ActionEffect,
    pub detail: String,
    pub navigated: bool,
}

/// Picks one action per tick, runs it, and reports whether the page address
/// changed. Handler failures short of a severed transport degrade to
/// no-effect. Single-page-app route changes that keep the URL intact are
/// invisible to the before/after comparison; callers cannot rely on it for
/// those sites.
pub struct ActionScheduler;

impl ActionScheduler {
    pub async fn tick(drive: &mut dyn PageDrive, jitter: &mut Jitter) -> SessionResult<TickReport> {
        let kind = draw_kind(jitter.uniform());
        let url_before = if kind.may_navigate() {
            Self::read_url(drive).await?
        } else {
            None
        };

        let outcome = match kind {
            ActionKind::Scroll => scroll::run(drive, jitter).await,
            ActionKind::Hover => hover::run(drive, jitter).await,
            ActionKind::Type => typing::run(drive, jitter).await,
            ActionKind::Click => click::run(drive, jitter).await,
            ActionKind::Back => back::run(drive, jitter).await,
            ActionKind::Media => media::run(drive, jitter).await,
            ActionKind::Zoom => zoom::run(drive, jitter).await,
            ActionKind::Idle => idle::run(drive, jitter).await,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(action = %kind, error = %err, "action degraded to no effect");
                ActionOutcome::none(err.to_string())
            }
        };

        let navigated = if kind.may_navigate() {
            let url_after = Self::read_url(drive).await?;
            matches!((&url_before, &url_after), (Some(before), Some(after)) if before != after)
        } else {
            false
        };

        Ok(TickReport {
            kind,
            effect: outcome.effect,
            detail: outcome.detail,
            navigated,
        })
    }

    async fn read_url(drive: &mut dyn PageDrive) -> SessionResult<Option<String>> {
        match drive.current_url().await {
            Ok(url) => Ok(url),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                debug!(error = %err, "url read failed during tick");
                Ok(None)
            }
        }
    }
}

/// Viewport rectangle of one tagged element, as returned by the discovery
/// scripts below.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Spot {
    pub i: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Spot {
    pub fn point_within(&self, jitter: &mut Jitter) -> (f64, f64) {
        (
            self.x + self.w * jitter.range_f64((0.3, 0.7)),
            self.y + self.h * jitter.range_f64((0.3, 0.7)),
        )
    }
}

pub(crate) fn parse_spots(value: Value) -> Vec<Spot> {
    serde_json::from_value(value).unwrap_or_default()
}

pub(crate) fn parse_spot(value: Value) -> Option<Spot> {
    serde_json::from_value(value).ok()
}

fn json_list(items: &[&str]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Tags visible, sufficiently large matches with `data-ambler-spot` and
/// returns their rectangles. With `first_category_only` the selector list is
/// a priority order and the first non-empty category wins.
pub(crate) fn spots_script(
    marker: &str,
    selectors: &[&str],
    min_width: f64,
    min_height: f64,
    limit: usize,
    first_category_only: bool,
) -> String {
    let category_break = if first_category_only {
        "if (out.length > 0) break;"
    } else {
        ""
    };
    format!(
        r#"
(() => {{ // {marker}
    const selectors = {selectors};
    const out = [];
    let index = 0;
    document.querySelectorAll('[data-ambler-spot]').forEach(el => el.removeAttribute('data-ambler-spot'));
    const visible = (el) => {{
        const s = window.getComputedStyle(el);
        return s.visibility !== 'hidden' && s.display !== 'none' && s.opacity !== '0';
    }};
    for (const sel of selectors) {{
        let found = [];
        try {{ found = document.querySelectorAll(sel); }} catch (_) {{ continue; }}
        for (const el of found) {{
            if (out.length >= {limit}) break;
            if (el.hasAttribute('data-ambler-spot')) continue;
            const r = el.getBoundingClientRect();
            if (r.width < {min_width} || r.height < {min_height} || !visible(el)) continue;
            el.setAttribute('data-ambler-spot', String(index));
            out.push({{ i: index, x: r.x, y: r.y, w: r.width, h: r.height }});
            index += 1;
        }}
        {category_break}
    }}
    return out;
}})()
"#,
        marker = marker,
        selectors = json_list(selectors),
        limit = limit,
        min_width = min_width,
        min_height = min_height,
        category_break = category_break,
    )
}

/// Brings a tagged element into view and returns its fresh rectangle.
pub(crate) fn focus_spot_script(index: u32) -> String {
    format!(
        r#"
(() => {{ // __amblerFocusSpot
    const el = document.querySelector("[data-ambler-spot='{index}']");
    if (!el) return null;
    el.scrollIntoView({{ block: 'center' }});
    const r = el.getBoundingClientRect();
    return {{ i: {index}, x: r.x, y: r.y, w: r.width, h: r.height }};
}})()
"#
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = ACTION_WEIGHTS.iter().map(|(_, weight)| weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn draw_respects_cumulative_boundaries() {
        assert_eq!(draw_kind(0.0), ActionKind::Scroll);
        assert_eq!(draw_kind(0.249), ActionKind::Scroll);
        assert_eq!(draw_kind(0.25), ActionKind::Hover);
        assert_eq!(draw_kind(0.369), ActionKind::Hover);
        assert_eq!(draw_kind(0.37), ActionKind::Type);
        assert_eq!(draw_kind(0.45), ActionKind::Click);
        assert_eq!(draw_kind(0.63), ActionKind::Back);
        assert_eq!(draw_kind(0.71), ActionKind::Media);
        assert_eq!(draw_kind(0.78), ActionKind::Zoom);
        assert_eq!(draw_kind(0.85), ActionKind::Idle);
        assert_eq!(draw_kind(0.999_999), ActionKind::Idle);
    }

    #[test]
    fn empirical_distribution_converges_to_weights() {
        let mut jitter = Jitter::seeded(42);
        let mut counts: HashMap<ActionKind, usize> = HashMap::new();
        let draws = 10_000;
        for _ in 0..draws {
            *counts.entry(draw_kind(jitter.uniform())).or_default() += 1;
        }
        for (kind, weight) in ACTION_WEIGHTS {
            let observed = *counts.get(&kind).unwrap_or(&0) as f64 / draws as f64;
            assert!(
                (observed - weight).abs() < 0.03,
                "{kind}: observed {observed:.3}, expected {weight:.3}"
            );
        }
    }

    #[test]
    fn only_navigating_kinds_flag_navigation() {
        for (kind, _) in ACTION_WEIGHTS {
            let expected = matches!(
                kind,
                ActionKind::Type | ActionKind::Click | ActionKind::Back
            );
            assert_eq!(kind.may_navigate(), expected);
        }
    }

    #[test]
    fn spot_parsing_tolerates_garbage() {
        assert!(parse_spots(serde_json::json!({"not": "a list"})).is_empty());
        let spots = parse_spots(serde_json::json!([
            { "i": 0, "x": 1.0, "y": 2.0, "w": 30.0, "h": 40.0 }
        ]));
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].i, 0);
    }
}
