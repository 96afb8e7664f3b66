/* Commit packet encoder: the 64 byte trigger written after all staged effect and region packets. */

pub const COMMIT_PACKET_SIZE: usize = 64;

const COMMIT_HEADER: [u8; 3] = [0x0D, 0x00, 0x02];

/// Build the commit buffer: `[0x0D, 0x00, 0x02]`, zero padding, then
/// `status` in the last byte.
///
/// The sequencer passes the id of the last region it sent. Regions do not
/// accumulate into a mask; each sent region replaces the previous value.
pub fn encode_commit_packet(status: u8) -> [u8; COMMIT_PACKET_SIZE] {
    let mut buf = [0u8; COMMIT_PACKET_SIZE];
    buf[..COMMIT_HEADER.len()].copy_from_slice(&COMMIT_HEADER);
    buf[COMMIT_PACKET_SIZE - 1] = status;
    buf
}

/* Commit status for the region ids sent, in send order. */
pub fn commit_status(sent_regions: &[u8]) -> u8 {
    sent_regions.last().copied().unwrap_or(0)
}
