use crate::patterns::HOVERABLE_SELECTORS;
use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::{parse_spots, spots_script, ActionOutcome};

/// Elements smaller than this are skipped as likely traps.
const MIN_HOVER_BOX: f64 = 20.0;

/// 1-4 dwells over the highest-priority hoverable category present.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let script = spots_script(
        "__amblerHoverSpots",
        HOVERABLE_SELECTORS,
        MIN_HOVER_BOX,
        MIN_HOVER_BOX,
        40,
        true,
    );
    let spots = parse_spots(drive.eval(&script).await?);
    if spots.is_empty() {
        return Ok(ActionOutcome::none("nothing hoverable"));
    }
    let attempts = jitter.range_u32((1, 4));
    let mut dwelled = 0u32;
    for _ in 0..attempts {
        let Some(spot) = jitter.pick(&spots).copied() else {
            break;
        };
        let (x, y) = spot.point_within(jitter);
        drive.move_mouse(x, y).await?;
        jitter.pause_ms((500, 2_000)).await;
        dwelled += 1;
    }
    Ok(ActionOutcome::performed(format!("{dwelled} hover dwells")))
}
