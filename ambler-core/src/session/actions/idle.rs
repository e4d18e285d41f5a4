use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::timing::{ease_in_out_cubic, Jitter};

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::ActionOutcome;

/// Passive presence: reading (Gaussian-length with micro-scrolls), a pure
/// distracted pause, slow scrolling, or visible mouse drift.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let roll = jitter.uniform();
    if roll < 0.35 {
        reading(drive, jitter).await
    } else if roll < 0.60 {
        jitter.pause_ms((4_000, 10_000)).await;
        Ok(ActionOutcome::performed("distracted pause"))
    } else if roll < 0.80 {
        slow_scroll(drive, jitter).await
    } else {
        mouse_drift(drive, jitter).await
    }
}

async fn reading(drive: &mut dyn PageDrive, jitter: &mut Jitter) -> SessionResult<ActionOutcome> {
    let total_ms = jitter.gaussian_clamped(6_000.0, 2_000.0, 3_000.0, 12_000.0) as u64;
    let deadline = Instant::now() + Duration::from_millis(total_ms);
    let mut nudges = 0u32;
    while Instant::now() < deadline {
        jitter.pause_ms((600, 1_000)).await;
        if jitter.chance(0.30) {
            drive.scroll_by(0.0, jitter.range_f64((30.0, 90.0))).await?;
            nudges += 1;
        }
    }
    Ok(ActionOutcome::performed(format!(
        "reading {total_ms}ms ({nudges} nudges)"
    )))
}

async fn slow_scroll(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let steps = jitter.range_u32((3, 6));
    for _ in 0..steps {
        let magnitude = jitter.range_f64((60.0, 180.0));
        let delta = if jitter.chance(0.70) {
            magnitude
        } else {
            -magnitude
        };
        drive.scroll_by(0.0, delta).await?;
        jitter.pause_ms((900, 2_200)).await;
    }
    Ok(ActionOutcome::performed(format!("{steps} slow scrolls")))
}

async fn mouse_drift(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let viewport = drive
        .eval("({ w: window.innerWidth, h: window.innerHeight })")
        .await?;
    let width = viewport
        .get("w")
        .and_then(Value::as_f64)
        .unwrap_or(1_280.0)
        .max(200.0);
    let height = viewport
        .get("h")
        .and_then(Value::as_f64)
        .unwrap_or(720.0)
        .max(200.0);

    let moves = jitter.range_u32((3, 7));
    let mut from = (
        jitter.range_f64((0.0, width)),
        jitter.range_f64((0.0, height)),
    );
    for _ in 0..moves {
        let to = (
            jitter.range_f64((10.0, width - 10.0)),
            jitter.range_f64((10.0, height - 10.0)),
        );
        let steps = jitter.range_u32((12, 28));
        for step in 1..=steps {
            let t = ease_in_out_cubic(step as f64 / steps as f64);
            let x = from.0 + (to.0 - from.0) * t + jitter.offset(1.2);
            let y = from.1 + (to.1 - from.1) * t + jitter.offset(1.2);
            drive.move_mouse(x, y).await?;
            jitter.pause_ms((8, 24)).await;
        }
        from = to;
        jitter.pause_ms((150, 500)).await;
    }
    Ok(ActionOutcome::performed(format!("{moves} pointer drifts")))
}
