use crate::patterns::{SEARCH_INPUT_SELECTORS, SEARCH_TERMS};
use crate::timing::Jitter;

use super::super::drive::PageDrive;
use super::super::error::SessionResult;
use super::{parse_spot, spots_script, ActionOutcome};

/// Types a search term into the first visible search input, character by
/// character with occasional typo-then-correct slips, then submits half the
/// time.
pub(crate) async fn run(
    drive: &mut dyn PageDrive,
    jitter: &mut Jitter,
) -> SessionResult<ActionOutcome> {
    let script = spots_script(
        "__amblerSearchInput",
        SEARCH_INPUT_SELECTORS,
        40.0,
        12.0,
        1,
        false,
    );
    let spots = drive.eval(&script).await?;
    let field = match spots
        .as_array()
        .and_then(|list| list.first())
        .cloned()
        .and_then(parse_spot)
    {
        Some(spot) => spot,
        None => return Ok(ActionOutcome::none("no search input")),
    };

    let (x, y) = field.point_within(jitter);
    drive.click_at(x, y, jitter.range_u64((40, 110))).await?;
    jitter.pause_ms((300, 800)).await;

    let term = jitter.pick(SEARCH_TERMS).copied().unwrap_or("news");
    for (index, ch) in term.chars().enumerate() {
        if index > 0 && jitter.chance(0.10) {
            drive.type_char(shifted(ch)).await?;
            jitter.pause_ms((250, 650)).await;
            drive.press_key("Backspace").await?;
            jitter.pause_ms((120, 360)).await;
        }
        drive.type_char(ch).await?;
        jitter.pause_ms((60, 180)).await;
    }

    if jitter.chance(0.5) {
        jitter.pause_ms((250, 700)).await;
        drive.press_key("Enter").await?;
        jitter.pause_ms((1_000, 2_200)).await;
        Ok(ActionOutcome::performed(format!("typed '{term}', submitted")))
    } else {
        Ok(ActionOutcome::performed(format!("typed '{term}'")))
    }
}

/// The neighbouring codepoint stands in for a fat-fingered key.
fn shifted(ch: char) -> char {
    char::from_u32(ch as u32 + 1)
        .filter(|candidate| candidate.is_alphanumeric())
        .unwrap_or('x')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_stays_printable() {
        assert_eq!(shifted('a'), 'b');
        assert_eq!(shifted('1'), '2');
        // 'z' + 1 is '{', which is filtered out.
        assert_eq!(shifted('z'), 'x');
    }
}
