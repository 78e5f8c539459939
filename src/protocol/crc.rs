//! CRC16 frame footer.
//!
//! CRC-16/CCITT-FALSE: polynomial `0x1021`, initial value `0xFFFF`,
//! MSB-first, no final XOR. The checksum covers every preceding byte of
//! the frame and is appended little-endian.

use ::crc::{Crc, CRC_16_IBM_3740};

use super::wire_format::CRC_SIZE;

/// CRC-16/IBM-3740, the catalogue name for CCITT-FALSE.
const CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC16 of `data`.
pub fn calculate(data: &[u8]) -> u16 {
    CCITT_FALSE.checksum(data)
}

/// Return `data` with its CRC16 appended (little-endian).
pub fn append(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CRC_SIZE);
    out.extend_from_slice(data);
    out.extend_from_slice(&calculate(data).to_le_bytes());
    out
}

/// Check the trailing CRC16 and strip it.
///
/// Returns `(valid, body)`. The body is returned even when the check fails
/// so callers can log it. Inputs shorter than the footer are never valid.
pub fn verify_and_strip(data: &[u8]) -> (bool, &[u8]) {
    match split_footer(data) {
        Some((body, expected)) => (calculate(body) == expected, body),
        None => (false, data),
    }
}

/// Split a frame into body and the CRC it claims.
fn split_footer(data: &[u8]) -> Option<(&[u8], u16)> {
    if data.len() < CRC_SIZE {
        return None;
    }
    let (body, footer) = data.split_at(data.len() - CRC_SIZE);
    Some((body, u16::from_le_bytes([footer[0], footer[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_value() {
        // Standard CCITT-FALSE check string.
        assert_eq!(calculate(b"123456789"), 0x29B1);
        assert_eq!(calculate(&[]), 0xFFFF);
    }

    #[test]
    fn test_append_is_little_endian() {
        let framed = append(b"123456789");
        assert_eq!(&framed[9..], &[0xB1, 0x29]);
    }

    #[test]
    fn test_verify_and_strip_valid() {
        let body = [0x2C, 0x05, 0x00];
        let framed = append(&body);

        let (ok, stripped) = verify_and_strip(&framed);
        assert!(ok);
        assert_eq!(stripped, &body);
    }

    #[test]
    fn test_every_single_bit_flip_detected() {
        let framed = append(&[0x35, 0x01, 0x02, 0x64, 0x64]);

        for byte in 0..framed.len() {
            for bit in 0..8 {
                let mut corrupted = framed.clone();
                corrupted[byte] ^= 1 << bit;
                let (ok, _) = verify_and_strip(&corrupted);
                assert!(!ok, "flip at byte {} bit {} went undetected", byte, bit);
            }
        }
    }

    proptest! {
        #[test]
        fn test_append_then_verify(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let framed = append(&data);
            let (ok, body) = verify_and_strip(&framed);
            prop_assert!(ok);
            prop_assert_eq!(body, &data[..]);
        }
    }

    #[test]
    fn test_too_short_input() {
        let (ok, body) = verify_and_strip(&[0x01]);
        assert!(!ok);
        assert_eq!(body, &[0x01]);
    }
}
