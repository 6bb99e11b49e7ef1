use log::{debug, warn};

use crate::utils::error::LtError;

// The unit only speaks two functions of its Modbus-derived dialect
pub const FUNC_READ: u8 = 0x04;
pub const FUNC_WRITE: u8 = 0x10;

/// Fixed length of a write echo: unit, function, address (2), count (2).
pub const WRITE_REPLY_LEN: usize = 6;

/// A logical parameter is two raw registers interpreted as one f32.
/// Parameter address p maps to raw register address 2p-1.
pub fn raw_addr(param_addr: u16) -> u16 {
    param_addr * 2 - 1
}

/// Parameter count n maps to raw register count 2n.
pub fn raw_count(param_count: u16) -> u16 {
    param_count * 2
}

/// Reply length for a read of `param_count` parameters:
/// 3 header bytes (unit, function, byte count) plus 4 bytes per parameter.
pub fn read_reply_len(param_count: u16) -> usize {
    3 + 2 * raw_count(param_count) as usize
}

/// Build a read request frame (checksum is applied by the serial transport).
pub fn encode_read(unit: u8, param_addr: u16, param_count: u16) -> Vec<u8> {
    let mut frame = vec![unit, FUNC_READ];
    frame.extend_from_slice(&raw_addr(param_addr).to_be_bytes());
    frame.extend_from_slice(&raw_count(param_count).to_be_bytes());
    frame
}

/// Parse a read reply into parameter values.
///
/// A reply that is not exactly the expected length yields an empty list, not
/// an error: the caller treats it as "no data available this cycle".
pub fn decode_read(bytes: &[u8], expected_param_count: u16) -> Vec<f32> {
    let expected_len = read_reply_len(expected_param_count);
    if bytes.len() != expected_len {
        if !bytes.is_empty() {
            warn!(
                "⚠️  Short read reply: expected {} bytes, got {} [{}]",
                expected_len,
                bytes.len(),
                hex::encode(bytes)
            );
        }
        return Vec::new();
    }

    bytes[3..]
        .chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Build a write request frame: read header plus byte count and f32 payload.
pub fn encode_write(unit: u8, param_addr: u16, values: &[f32]) -> Vec<u8> {
    let count = raw_count(values.len() as u16);

    let mut frame = vec![unit, FUNC_WRITE];
    frame.extend_from_slice(&raw_addr(param_addr).to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    frame.push((count * 2) as u8);
    for v in values {
        frame.extend_from_slice(&v.to_be_bytes());
    }
    debug!("📤 Write frame: {}", hex::encode(&frame));
    frame
}

/// Parse a write echo into `(raw_addr, raw_count)`.
///
/// The unit's state after a garbled echo is unknown, so unlike the read path
/// this is a hard failure.
pub fn decode_write(bytes: &[u8]) -> Result<(u16, u16), LtError> {
    if bytes.len() != WRITE_REPLY_LEN {
        return Err(LtError::MalformedResponse {
            expected: WRITE_REPLY_LEN,
            got: bytes.len(),
        });
    }

    let addr = u16::from_be_bytes([bytes[2], bytes[3]]);
    let count = u16::from_be_bytes([bytes[4], bytes[5]]);
    Ok((addr, count))
}
