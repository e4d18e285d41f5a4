use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::ActionOutcome;

/// 3-8 wheel steps, 85% downward, each step followed by a short pause and a
/// 20% chance of a longer reading pause.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let steps = jitter.range_u32((3, 8));
    let mut downward = 0u32;
    for _ in 0..steps {
        let magnitude = jitter.range_f64((100.0, 500.0));
        let delta = if jitter.chance(0.85) {
            downward += 1;
            magnitude
        } else {
            -magnitude
        };
        drive.scroll_by(0.0, delta).await?;
        jitter.pause_ms((250, 700)).await;
        if jitter.chance(0.20) {
            jitter.pause_ms((1_200, 3_500)).await;
        }
    }
    Ok(ActionOutcome::performed(format!(
        "{steps} wheel steps ({downward} down)"
    )))
}
