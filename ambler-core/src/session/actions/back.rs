use crate::timing::Jitter;

use super::super::drive::{is_navigable, PageDrive};
use super::super::error::SessionResult;
use super::ActionOutcome;

/// History back with a guard against leaving the web context: a back step
/// that lands somewhere non-navigable is undone with a forward step.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let current = drive.current_url().await?;
    if !is_navigable(current.as_deref()) {
        return Ok(ActionOutcome::none("context not navigable"));
    }
    let depth = drive
        .eval("window.history.length")
        .await?
        .as_u64()
        .unwrap_or(0);
    if depth <= 1 {
        return Ok(ActionOutcome::none("history too shallow"));
    }

    drive.eval("window.history.back()").await?;
    jitter.pause_ms((800, 1_800)).await;

    let landed = drive.current_url().await?;
    if !is_navigable(landed.as_deref()) {
        drive.eval("window.history.forward()").await?;
        jitter.pause_ms((600, 1_200)).await;
        return Ok(ActionOutcome::none("backed out of web context, undone"));
    }
    Ok(ActionOutcome::performed("history back"))
}
