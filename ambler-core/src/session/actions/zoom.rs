use serde_json::Value;

use crate::patterns::OVERLAY_CLOSE_SELECTORS;
use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::{parse_spots, spots_script, ActionOutcome};

/// Non-touch contexts roll keyboard zoom in/out or an image zoom; touch
/// contexts nudge the viewport scale hint and restore it.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let touch = drive
        .eval("'ontouchstart' in window || navigator.maxTouchPoints > 0")
        .await?
        .as_bool()
        .unwrap_or(false);

    if touch {
        drive.eval(TOUCH_SCALE_APPLY).await?;
        jitter.pause_ms((1_200, 3_000)).await;
        drive.eval(TOUCH_SCALE_RESTORE).await?;
        return Ok(ActionOutcome::performed("viewport scale pinch"));
    }

    let roll = jitter.uniform();
    if roll < 0.45 {
        let steps = jitter.range_u32((1, 3));
        for _ in 0..steps {
            drive.press_key("Control+Equal").await?;
            jitter.pause_ms((200, 500)).await;
        }
        jitter.pause_ms((800, 2_000)).await;
        drive.press_key("Control+Digit0").await?;
        Ok(ActionOutcome::performed(format!("zoom in x{steps}, reset")))
    } else if roll < 0.70 {
        let steps = jitter.range_u32((1, 2));
        for _ in 0..steps {
            drive.press_key("Control+Minus").await?;
            jitter.pause_ms((200, 500)).await;
        }
        jitter.pause_ms((800, 2_000)).await;
        drive.press_key("Control+Digit0").await?;
        Ok(ActionOutcome::performed(format!("zoom out x{steps}, reset")))
    } else {
        image_zoom(drive, jitter).await
    }
}

async fn image_zoom(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let script = spots_script("__amblerZoomImages", &["img"], 100.0, 100.0, 30, false);
    let spots = parse_spots(drive.eval(&script).await?);
    let Some(image) = jitter.pick(&spots).copied() else {
        return Ok(ActionOutcome::none("no large images"));
    };
    let (x, y) = image.point_within(jitter);
    drive.click_at(x, y, jitter.range_u64((40, 120))).await?;
    jitter.pause_ms((800, 2_500)).await;

    drive.press_key("Escape").await?;
    jitter.pause_ms((200, 500)).await;
    let close = drive.eval(&overlay_close_script()).await?;
    if let (Some(x), Some(y)) = (
        close.get("x").and_then(Value::as_f64),
        close.get("y").and_then(Value::as_f64),
    ) {
        drive.click_at(x, y, jitter.range_u64((40, 110))).await?;
        jitter.pause_ms((300, 700)).await;
    }
    Ok(ActionOutcome::performed("image zoom"))
}

fn overlay_close_script() -> String {
    let selectors =
        serde_json::to_string(OVERLAY_CLOSE_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
(() => {{ // __amblerOverlayClose
    const selectors = {selectors};
    const visible = (el) => {{
        const r = el.getBoundingClientRect();
        const s = window.getComputedStyle(el);
        return r.width > 8 && r.height > 8 && s.visibility !== 'hidden' && s.display !== 'none';
    }};
    for (const sel of selectors) {{
        let el = null;
        try {{ el = document.querySelector(sel); }} catch (_) {{ continue; }}
        if (el && visible(el)) {{
            const r = el.getBoundingClientRect();
            return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }};
        }}
    }}
    return null;
}})()
"#
    )
}

const TOUCH_SCALE_APPLY: &str = r#"
(() => { // __amblerTouchScale
    let meta = document.querySelector("meta[name='viewport']");
    if (!meta) {
        meta = document.createElement('meta');
        meta.name = 'viewport';
        meta.dataset.amblerAdded = '1';
        document.head.appendChild(meta);
    }
    if (meta.dataset.amblerPrev === undefined) meta.dataset.amblerPrev = meta.content || '';
    meta.content = 'width=device-width, initial-scale=1.3, user-scalable=yes';
    return true;
})()
"#;

const TOUCH_SCALE_RESTORE: &str = r#"
(() => { // __amblerTouchScaleRestore
    const meta = document.querySelector("meta[name='viewport']");
    if (!meta) return false;
    if (meta.dataset.amblerAdded === '1') { meta.remove(); return true; }
    meta.content = meta.dataset.amblerPrev || '';
    delete meta.dataset.amblerPrev;
    return true;
})()
"#;
