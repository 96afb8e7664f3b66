/* Effect scheduler: collects the effects referenced by an update batch, folds data-equal ones into
 * a single device slot and stamps the slot id back onto every key that uses it. */
use tracing::debug;

use crate::device::{Effect, KeyState};
use crate::error::LightingError;

/* Effect ids are one byte and 0 means "no effect". */
pub const MAX_EFFECTS: usize = u8::MAX as usize;

/// Deduplicate the effects of `keys` and assign slot ids.
///
/// Effects are compared by data, not identity. The first occurrence (in key
/// order) represents its group and groups are numbered `1..=N` in first-seen
/// order. Every key effect is then given the id of its group. Keys without
/// an effect are left alone.
///
/// Returns the representatives, ordered by id.
pub fn schedule_effects(keys: &mut [KeyState]) -> Result<Vec<Effect>, LightingError> {
    let mut unique: Vec<Effect> = Vec::new();
    for effect in keys.iter().filter_map(KeyState::effect) {
        if !unique.iter().any(|known| known == effect) {
            unique.push(effect.clone());
        }
    }

    if unique.len() > MAX_EFFECTS {
        return Err(LightingError::TooManyEffects {
            count: unique.len(),
            max: MAX_EFFECTS,
        });
    }

    for (idx, effect) in unique.iter_mut().enumerate() {
        effect.id = (idx + 1) as u8;
    }

    for key in keys.iter_mut() {
        if let Some(effect) = key.effect_mut() {
            if let Some(known) = unique.iter().find(|known| *known == &*effect) {
                effect.id = known.id;
            }
        }
    }

    debug!("Scheduled {} distinct effects", unique.len());
    Ok(unique)
}
