/* Effect packet encoder: packs one scheduled effect (sorted keyframes as per-tick color steps, the
 * nibble-packed start color, wave parameters and the trailer) into a single feature report. */
use crate::device::{Color, Effect, WaveDirection};
use crate::error::LightingError;
use crate::keyboard_database::MIN_PACKAGE_SIZE;

/* ---------------------------------------------------------------------- */
/* Constants                                                              */
/* ---------------------------------------------------------------------- */
const EFFECT_REPORT_ID: u8 = 0x0B;

const TRANSITIONS_OFFSET: usize = 2;
const TRANSITION_SIZE: usize = 8;

const START_COLOR_OFFSET: usize = 0x84;
const START_COLOR_TERMINATOR: u8 = 0xFF;
const WAVE_OFFSET: usize = START_COLOR_OFFSET + 8;
const TRAILER_OFFSET: usize = WAVE_OFFSET + 10;

/* Keyframes that fit between the header and the start color block. */
pub const MAX_TRANSITIONS: usize = (START_COLOR_OFFSET - TRANSITIONS_OFFSET) / TRANSITION_SIZE;

/* Normalized wave origin -> device units */
const WAVE_ORIGIN_X_SCALE: f64 = 0x105C as f64;
const WAVE_ORIGIN_Y_SCALE: f64 = 0x40D as f64;

/* Ticks spent moving from one keyframe to the next.                 */
/*                                                                   */
/* Positions wrap: the last keyframe runs back into the first one.   */
pub fn step_duration(from: f64, to: f64, effect_duration: u16) -> u16 {
    let mut delta_position = to - from;
    if delta_position < 0.0 {
        delta_position += 1.0;
    }
    (delta_position * f64::from(effect_duration) / 10.0)
        .round()
        .clamp(0.0, f64::from(u16::MAX)) as u16
}

fn scale_origin(value: f64, scale: f64) -> u16 {
    (value * scale).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Encode `effect` into one `package_size` byte feature report.
///
/// Layout (offsets from the start of the buffer):
///
/// ```text
///   [0..2]       = 0x0B, 0x00
///   [2 + 8*i..]  = slot, 0, dR, dG, dB, 0, step_lo, step_hi   (per keyframe)
///   [0x84..0x8C] = start color, low/high nibble per channel, 0xFF, 0x00
///   [0x8C..0x96] = wave: x, y (u16 LE), flag_y, 0, flag_x, 0, pulse (u16 LE)
///   [0x96..0x9B] = keyframe count, 0, duration (u16 LE), control
/// ```
///
/// The first keyframe slot carries the effect id, the others their own
/// index. An effect without keyframes is refused outright: the firmware's
/// behavior on such a packet is undefined. So is a package too short to
/// hold the trailer.
pub fn encode_effect_packet(effect: &Effect, package_size: usize) -> Result<Vec<u8>, LightingError> {
    if package_size < MIN_PACKAGE_SIZE {
        return Err(LightingError::PackageTooSmall {
            package_size,
            min: MIN_PACKAGE_SIZE,
        });
    }

    let transitions = effect.sorted_transitions();
    if transitions.is_empty() {
        return Err(LightingError::EmptyEffect { id: effect.id });
    }
    if transitions.len() > MAX_TRANSITIONS {
        return Err(LightingError::TooManyTransitions {
            id: effect.id,
            count: transitions.len(),
            max: MAX_TRANSITIONS,
        });
    }

    let mut buf = vec![0u8; package_size];
    buf[0] = EFFECT_REPORT_ID;

    for (i, current) in transitions.iter().enumerate() {
        let next = &transitions[(i + 1) % transitions.len()];
        let step = step_duration(current.position, next.position, effect.duration);
        let delta = Color::delta(&current.color, &next.color, step);

        let p = TRANSITIONS_OFFSET + i * TRANSITION_SIZE;
        buf[p] = if i == 0 { effect.id } else { i as u8 };
        buf[p + 2..p + 5].copy_from_slice(&delta.to_bytes());
        buf[p + 6..p + 8].copy_from_slice(&step.to_le_bytes());
    }

    /* Start color, one nibble per byte, shifted to where the firmware reads it */
    let mut p = START_COLOR_OFFSET;
    for value in effect.start_color.to_bytes() {
        buf[p] = (value & 0x0F) << 4;
        buf[p + 1] = (value & 0xF0) >> 4;
        p += 2;
    }
    buf[p] = START_COLOR_TERMINATOR;

    if effect.wave_active {
        let x = scale_origin(effect.origin.x, WAVE_ORIGIN_X_SCALE);
        let y = scale_origin(effect.origin.y, WAVE_ORIGIN_Y_SCALE);
        buf[WAVE_OFFSET..WAVE_OFFSET + 2].copy_from_slice(&x.to_le_bytes());
        buf[WAVE_OFFSET + 2..WAVE_OFFSET + 4].copy_from_slice(&y.to_le_bytes());
        buf[WAVE_OFFSET + 4] = u8::from(effect.direction != WaveDirection::Y);
        buf[WAVE_OFFSET + 6] = u8::from(effect.direction != WaveDirection::X);
        buf[WAVE_OFFSET + 8..WAVE_OFFSET + 10].copy_from_slice(&effect.pulse.to_le_bytes());
    }

    buf[TRAILER_OFFSET] = transitions.len() as u8;
    buf[TRAILER_OFFSET + 2..TRAILER_OFFSET + 4].copy_from_slice(&effect.duration.to_le_bytes());
    buf[TRAILER_OFFSET + 4] = effect.control as u8;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{EffectControl, Transition, WaveOrigin};

    const PACKAGE: usize = 524;

    fn red_blue(duration: u16) -> Effect {
        let mut effect = Effect::new(
            vec![
                Transition::new(0.0, Color::from_bytes(255, 0, 0)),
                Transition::new(0.5, Color::from_bytes(0, 0, 255)),
            ],
            duration,
        );
        effect.id = 3;
        effect
    }

    #[test]
    fn step_duration_half_cycle() {
        assert_eq!(step_duration(0.0, 0.5, 1000), 50);
        /* wraps from the last keyframe back to the first */
        assert_eq!(step_duration(0.75, 0.0, 1000), 25);
        assert_eq!(step_duration(0.3, 0.3, 1000), 0);
    }

    #[test]
    fn buffer_is_package_sized() {
        let buf = encode_effect_packet(&red_blue(1000), PACKAGE).unwrap();
        assert_eq!(buf.len(), PACKAGE);
        assert_eq!(&buf[0..2], &[0x0B, 0x00]);
    }

    #[test]
    fn keyframes_encode_steps_and_durations() {
        let buf = encode_effect_packet(&red_blue(1000), PACKAGE).unwrap();

        /* keyframe 0: red -> blue over 50 ticks, slot is the effect id */
        assert_eq!(&buf[2..10], &[3, 0x00, 0xCD, 0x00, 0x33, 0x00, 50, 0x00]);
        /* keyframe 1: blue -> red, wrapping, slot is its own index */
        assert_eq!(&buf[10..18], &[1, 0x00, 0x33, 0x00, 0xCD, 0x00, 50, 0x00]);
        /* nothing else before the start color */
        assert!(buf[18..0x84].iter().all(|&b| b == 0));
    }

    #[test]
    fn keyframes_sorted_before_packing() {
        let mut shuffled = red_blue(1000);
        shuffled.transitions.reverse();
        assert_eq!(
            encode_effect_packet(&shuffled, PACKAGE).unwrap(),
            encode_effect_packet(&red_blue(1000), PACKAGE).unwrap()
        );
    }

    #[test]
    fn start_color_is_nibble_packed() {
        let effect = red_blue(1000).with_start_color(Color::from_bytes(0xAB, 0x12, 0xF0));
        let buf = encode_effect_packet(&effect, PACKAGE).unwrap();
        assert_eq!(
            &buf[0x84..0x8C],
            &[0xB0, 0x0A, 0x20, 0x01, 0x00, 0x0F, 0xFF, 0x00]
        );
    }

    #[test]
    fn wave_block_zero_when_inactive() {
        let buf = encode_effect_packet(&red_blue(1000), PACKAGE).unwrap();
        assert_eq!(&buf[0x8C..0x96], &[0u8; 10]);
    }

    #[test]
    fn wave_block_along_x() {
        let effect = red_blue(1000).with_wave(WaveOrigin { x: 0.5, y: 1.0 }, WaveDirection::X, 0x1234);
        let buf = encode_effect_packet(&effect, PACKAGE).unwrap();
        /* x = round(0.5 * 0x105C) = 0x082E, y = 0x040D */
        assert_eq!(
            &buf[0x8C..0x96],
            &[0x2E, 0x08, 0x0D, 0x04, 0x01, 0x00, 0x00, 0x00, 0x34, 0x12]
        );
    }

    #[test]
    fn wave_direction_flags() {
        let origin = WaveOrigin { x: 0.0, y: 0.0 };
        let flags = |direction| {
            let effect = red_blue(1000).with_wave(origin, direction, 0);
            let buf = encode_effect_packet(&effect, PACKAGE).unwrap();
            (buf[0x90], buf[0x92])
        };
        assert_eq!(flags(WaveDirection::X), (1, 0));
        assert_eq!(flags(WaveDirection::Y), (0, 1));
        assert_eq!(flags(WaveDirection::XY), (1, 1));
    }

    #[test]
    fn trailer_carries_count_duration_and_control() {
        let effect = red_blue(0x0BB8).with_control(EffectControl::Once);
        let buf = encode_effect_packet(&effect, PACKAGE).unwrap();
        assert_eq!(&buf[0x96..0x9B], &[2, 0x00, 0xB8, 0x0B, 0x01]);
        assert!(buf[0x9B..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_effect_rejected() {
        let mut effect = red_blue(1000);
        effect.transitions.clear();
        let err = encode_effect_packet(&effect, PACKAGE).unwrap_err();
        assert!(matches!(err, LightingError::EmptyEffect { id: 3 }));
    }

    #[test]
    fn short_package_rejected() {
        let err = encode_effect_packet(&red_blue(1000), 64).unwrap_err();
        assert!(matches!(
            err,
            LightingError::PackageTooSmall { package_size: 64, min: 0x9B }
        ));
        /* the trailer ends exactly at the minimum */
        assert_eq!(encode_effect_packet(&red_blue(1000), 0x9B).unwrap().len(), 0x9B);
    }

    #[test]
    fn too_many_keyframes_rejected() {
        let transitions = (0..=MAX_TRANSITIONS)
            .map(|i| Transition::new(i as f64 / 20.0, Color::BLACK))
            .collect();
        let effect = Effect::new(transitions, 1000);
        let err = encode_effect_packet(&effect, PACKAGE).unwrap_err();
        assert!(matches!(
            err,
            LightingError::TooManyTransitions { count: 17, max: 16, .. }
        ));
    }

    #[test]
    fn sixteen_keyframes_fit() {
        let transitions = (0..MAX_TRANSITIONS)
            .map(|i| Transition::new(i as f64 / 16.0, Color::from_bytes(i as u8 * 16, 0, 0)))
            .collect();
        let buf = encode_effect_packet(&Effect::new(transitions, 1600), PACKAGE).unwrap();
        /* last keyframe ends right before the start color block */
        assert_eq!(buf[2 + 15 * 8], 15);
        assert_eq!(buf[0x96], 16);
    }
}
