/* Per-key packet encoder: walks one region's canonical slot order and packs every key's colors,
 * duration, effect slot and mode, default-filling the keys the snapshot does not mention. */
use crate::device::KeyState;
use crate::error::LightingError;
use crate::keyboard_database::Region;

/* ---------------------------------------------------------------------- */
/* Constants                                                              */
/* ---------------------------------------------------------------------- */
const REGION_REPORT_ID: u8 = 0x0E;

/* Slot of a key the snapshot does not cover: black, 300 ticks, mode 0. */
const ABSENT_SLOT_SIZE: usize = 12;
const ABSENT_DURATION: [u8; 2] = [0x2C, 0x01];

/* Data bytes following a slot header:                            */
/*   [0..3]  = main color                                         */
/*   [3..6]  = active color                                       */
/*   [6..8]  = duration (u16 LE)                                  */
/*   [8]     = effect id (0 = none)                               */
/*   [9]     = mode byte                                          */
fn slot_data(key: &KeyState) -> [u8; 10] {
    let mut data = [0u8; 10];
    data[0..3].copy_from_slice(&key.main_color.to_bytes());
    data[3..6].copy_from_slice(&key.active_color.to_bytes());
    data[6..8].copy_from_slice(&key.duration_ticks.to_le_bytes());
    data[8] = key.effect_id();
    data[9] = key.mode().to_byte();
    data
}

fn absent_slot(keycode: u8) -> [u8; ABSENT_SLOT_SIZE] {
    let mut slot = [0u8; ABSENT_SLOT_SIZE];
    slot[1] = keycode;
    slot[8..10].copy_from_slice(&ABSENT_DURATION);
    slot
}

/// Encode one region of `keys` into a `package_size` byte feature report.
///
/// Slots follow `region.slots()`: the region's own slot first, then its
/// keycodes. A key present in `keys` gets a 4 byte header
/// `[0x0E, 0x00, keycode, 0x00]` when it is the region slot and
/// `[0x00, keycode]` otherwise, followed by its data bytes. Absent keys get a
/// 12 byte default slot. Keys of other regions are ignored; if a slot is
/// listed twice in `keys` the first entry wins.
pub fn encode_region_packet(
    keys: &[KeyState],
    region: &Region,
    package_size: usize,
) -> Result<Vec<u8>, LightingError> {
    let mut buf = Vec::with_capacity(package_size);

    for keycode in region.slots() {
        match keys
            .iter()
            .find(|k| k.region == region.id && k.keycode == keycode)
        {
            Some(key) => {
                if keycode == region.id {
                    buf.extend_from_slice(&[REGION_REPORT_ID, 0x00, keycode, 0x00]);
                } else {
                    buf.extend_from_slice(&[0x00, keycode]);
                }
                buf.extend_from_slice(&slot_data(key));
            }
            None => buf.extend_from_slice(&absent_slot(keycode)),
        }
    }

    if buf.len() > package_size {
        return Err(LightingError::PacketOverflow {
            region: region.id,
            needed: buf.len(),
            package_size,
        });
    }

    buf.resize(package_size, 0);
    Ok(buf)
}
