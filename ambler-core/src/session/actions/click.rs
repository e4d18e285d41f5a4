use crate::patterns::CLICKABLE_SELECTORS;
use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::{focus_spot_script, parse_spot, parse_spots, spots_script, ActionOutcome};

const MIN_CLICK_BOX: f64 = 14.0;

/// Picks one visible clickable uniformly at random, scrolls it into view and
/// clicks with a randomized in-box offset and press delay.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let script = spots_script(
        "__amblerClickSpots",
        CLICKABLE_SELECTORS,
        MIN_CLICK_BOX,
        MIN_CLICK_BOX,
        60,
        false,
    );
    let spots = parse_spots(drive.eval(&script).await?);
    let Some(choice) = jitter.pick(&spots).copied() else {
        return Ok(ActionOutcome::none("nothing clickable"));
    };

    let focused = drive.eval(&focus_spot_script(choice.i)).await?;
    let target = parse_spot(focused).unwrap_or(choice);
    jitter.pause_ms((150, 450)).await;
    let (x, y) = target.point_within(jitter);
    drive.click_at(x, y, jitter.range_u64((40, 140))).await?;
    jitter.pause_ms((600, 1_400)).await;
    Ok(ActionOutcome::performed(format!(
        "clicked spot {} of {}",
        choice.i,
        spots.len()
    )))
}
