//! Fixed-point angle encodings used on the wire.
//!
//! Synscan controllers express a full circle as 2^32 counts (current
//! firmware) or 2^24 counts shifted up by 8 bits (legacy firmware), printed
//! as eight upper-case hex digits. iOptron mounts use signed decimal ASCII
//! with an implied decimal point instead; those scales live with the IEQ
//! codec.

use sky_math::angles::range_360;

use crate::error::DecodeError;

const FULL_CIRCLE_32: f64 = 4_294_967_296.0;
const FULL_CIRCLE_24: f64 = 16_777_216.0;

/// Degrees to a 32-bit fraction of a turn, rounded. Negative angles wrap.
pub fn degrees_to_u32(degrees: f64) -> u32 {
    let counts = (range_360(degrees) / 360.0 * FULL_CIRCLE_32).round();
    // 359.9999999 can round up to a whole turn
    (counts as u64 % (1u64 << 32)) as u32
}

/// 32-bit fraction of a turn to degrees in [0, 360).
pub fn u32_to_degrees(counts: u32) -> f64 {
    f64::from(counts) / FULL_CIRCLE_32 * 360.0
}

/// Degrees to a 24-bit fraction of a turn, as carried in the legacy
/// protocol's upper three bytes.
pub fn degrees_to_u24(degrees: f64) -> u32 {
    let counts = (range_360(degrees) / 360.0 * FULL_CIRCLE_24).round();
    (counts as u64 % (1u64 << 24)) as u32
}

/// Legacy goto encoding: the 24-bit value shifted into the top of a word.
pub fn degrees_to_u24_shifted(degrees: f64) -> u32 {
    degrees_to_u24(degrees) << 8
}

/// Format a pair of counts as `XXXXXXXX,XXXXXXXX`.
pub fn format_hex_pair(first: u32, second: u32) -> String {
    format!("{first:08X},{second:08X}")
}

/// Parse `XXXXXXXX,XXXXXXXX#` into its two counts.
pub fn parse_hex_pair(reply: &[u8]) -> Result<(u32, u32), DecodeError> {
    let body = super::strip_terminator(reply, b'#')?;
    let text = std::str::from_utf8(body).map_err(|_| DecodeError::malformed("position", reply))?;
    let (first, second) = text
        .split_once(',')
        .ok_or_else(|| DecodeError::malformed("position separator", reply))?;
    if first.len() != 8 || second.len() != 8 {
        return Err(DecodeError::malformed("position field width", reply));
    }
    let first =
        u32::from_str_radix(first, 16).map_err(|_| DecodeError::malformed("position", reply))?;
    let second =
        u32::from_str_radix(second, 16).map_err(|_| DecodeError::malformed("position", reply))?;
    Ok((first, second))
}
