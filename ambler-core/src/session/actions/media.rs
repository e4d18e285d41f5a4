use serde_json::Value;

use crate::patterns::PLAY_CONTROL_SELECTORS;
use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::ActionOutcome;

#[derive(Debug, Clone, Copy)]
enum MediaVerb {
    Play,
    Pause,
    Mute,
    Seek,
    Fullscreen,
}

impl MediaVerb {
    fn label(&self) -> &'static str {
        match self {
            MediaVerb::Play => "play",
            MediaVerb::Pause => "pause",
            MediaVerb::Mute => "mute",
            MediaVerb::Seek => "seek",
            MediaVerb::Fullscreen => "fullscreen",
        }
    }
}

/// Prefers video over audio, rolls one of play/pause/mute/seek/fullscreen,
/// tries a UI-level control first and falls back to direct media-state
/// mutation.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let probe = drive.eval(MEDIA_PROBE_SCRIPT).await?;
    let videos = probe.get("videos").and_then(Value::as_u64).unwrap_or(0);
    let audios = probe.get("audios").and_then(Value::as_u64).unwrap_or(0);
    if videos == 0 && audios == 0 {
        return Ok(ActionOutcome::none("no media elements"));
    }
    let target = if videos > 0 && audios > 0 {
        if jitter.chance(0.8) {
            "video"
        } else {
            "audio"
        }
    } else if videos > 0 {
        "video"
    } else {
        "audio"
    };

    let roll = jitter.uniform();
    let verb = if roll < 0.40 {
        MediaVerb::Play
    } else if roll < 0.55 {
        MediaVerb::Pause
    } else if roll < 0.70 {
        MediaVerb::Mute
    } else if roll < 0.85 {
        MediaVerb::Seek
    } else {
        MediaVerb::Fullscreen
    };

    if let Some((x, y)) = find_ui_control(drive, verb).await? {
        jitter.pause_ms((200, 600)).await;
        drive
            .click_at(
                x + jitter.offset(3.0),
                y + jitter.offset(2.0),
                jitter.range_u64((40, 120)),
            )
            .await?;
        jitter.pause_ms((400, 1_000)).await;
        return Ok(ActionOutcome::performed(format!(
            "{} via control ({target})",
            verb.label()
        )));
    }

    let mutated = drive
        .eval(&direct_script(target, verb, jitter))
        .await?
        .as_bool()
        .unwrap_or(false);
    jitter.pause_ms((400, 1_000)).await;
    if mutated {
        Ok(ActionOutcome::performed(format!(
            "{} direct ({target})",
            verb.label()
        )))
    } else {
        Ok(ActionOutcome::none(format!(
            "{} had no target ({target})",
            verb.label()
        )))
    }
}

async fn find_ui_control(
    drive: &mut dyn PageDrive,
    verb: MediaVerb,
) -> SessionResult<Option<(f64, f64)>> {
    let label = verb.label();
    let extra = if matches!(verb, MediaVerb::Play) {
        serde_json::to_string(PLAY_CONTROL_SELECTORS).unwrap_or_else(|_| "[]".to_string())
    } else {
        "[]".to_string()
    };
    let script = format!(
        r#"
(() => {{ // __amblerMediaControl
    const selectors = [
        "button[aria-label*='{label}' i]",
        "button[title*='{label}' i]",
        ...{extra}
    ];
    const visible = (el) => {{
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 8 && r.height > 8 && s.visibility !== 'hidden' && s.display !== 'none';
    }};
    for (const sel of selectors) {{
        let el = null;
        try {{ el = document.querySelector(sel); }} catch (_) {{ continue; }}
        if (el && visible(el)) {{
            el.scrollIntoView({{ block: 'center' }});
            const r = el.getBoundingClientRect();
            return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }};
        }}
    }}
    return null;
}})()
"#
    );
    let value = drive.eval(&script).await?;
    let x = value.get("x").and_then(Value::as_f64);
    let y = value.get("y").and_then(Value::as_f64);
    Ok(x.zip(y))
}

fn direct_script(target: &str, verb: MediaVerb, jitter: &mut Jitter) -> String {
    let mutation = match verb {
        MediaVerb::Play => "const p = el.play(); if (p && p.catch) p.catch(() => {});".to_string(),
        MediaVerb::Pause => "el.pause();".to_string(),
        MediaVerb::Mute => "el.muted = !el.muted;".to_string(),
        MediaVerb::Seek => {
            let fraction = jitter.range_f64((0.1, 0.8));
            format!(
                "if (isFinite(el.duration) && el.duration > 0) {{ el.currentTime = Math.min(el.duration * {fraction:.3}, Math.max(el.duration - 1, 0)); }}"
            )
        }
        MediaVerb::Fullscreen => {
            "if (el.requestFullscreen) { const p = el.requestFullscreen(); if (p && p.catch) p.catch(() => {}); }".to_string()
        }
    };
    format!(
        r#"
(() => {{ // __amblerMediaDirect
    const el = document.querySelector('{target}');
    if (!el) return false;
    try {{ {mutation} }} catch (_) {{ return false; }}
    return true;
}})()
"#
    )
}

const MEDIA_PROBE_SCRIPT: &str = r#"
(() => { // __amblerMediaProbe
    const playable = (el) => el.readyState > 0 || (el.currentSrc || '').length > 0 || el.querySelector('source');
    const videos = Array.from(document.querySelectorAll('video')).filter(playable).length;
    const audios = Array.from(document.querySelectorAll('audio')).filter(playable).length;
    return { videos, audios };
})()
"#;
