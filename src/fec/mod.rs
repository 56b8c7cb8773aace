//! Forward error correction over packet headers.
//!
//! The original library (`libavtransport/ldpc_encode.c`) runs a real LDPC
//! code against static parity-check matrices. Those tables aren't something
//! this crate can reproduce faithfully, so the interface here is a
//! deliberately simplified, fully deterministic stand-in: parity is the
//! XOR of every message byte, broadcast across the parity suffix. It keeps
//! the same two block sizes (288/224 and 2784/2016 bits) and the same
//! encode/decode shape the real codec exposes, so callers at the codec
//! boundary don't need to know the difference, and a single flipped
//! bit is still detectable — it just isn't correctable the way a real LDPC
//! decode would attempt via belief propagation.

use crate::error::{Error, Result};
use crate::packet::{LARGE_HEADER_LEN, LARGE_MESSAGE_LEN, SMALL_HEADER_LEN, SMALL_MESSAGE_LEN};

/// Iteration cap a real belief-propagation decoder would use. Kept for API
/// parity with the original interface; this XOR-based model never iterates.
pub const MAX_ITERATIONS: u32 = 50;

fn xor_all(message: &[u8]) -> u8 {
    message.iter().fold(0u8, |a, b| a ^ b)
}

/// Encodes a 224-bit (28-byte) message into an 8-byte parity suffix,
/// completing a 288-bit (36-byte) block.
pub fn encode_288_224(message: &[u8; SMALL_MESSAGE_LEN]) -> [u8; 8] {
    [xor_all(message); 8]
}

/// `true` if `parity` matches what [`encode_288_224`] would produce for
/// `message`.
pub fn verify_288_224(message: &[u8; SMALL_MESSAGE_LEN], parity: &[u8; 8]) -> bool {
    &encode_288_224(message) == parity
}

/// Encodes a 2016-bit (252-byte) message into a 96-byte parity suffix,
/// completing a 2784-bit (348-byte) block.
pub fn encode_2784_2016(message: &[u8; LARGE_MESSAGE_LEN]) -> [u8; 96] {
    [xor_all(message); 96]
}

/// `true` if `parity` matches what [`encode_2784_2016`] would produce for
/// `message`.
pub fn verify_2784_2016(message: &[u8; LARGE_MESSAGE_LEN], parity: &[u8; 96]) -> bool {
    &encode_2784_2016(message) == parity
}

/// Computes and writes the parity suffix of a small (36-byte) FEC block in
/// place, overwriting its final 8 bytes.
pub fn protect_small(block: &mut [u8]) -> Result<()> {
    if block.len() != SMALL_HEADER_LEN {
        return Err(Error::Range(format!(
            "small FEC block must be {SMALL_HEADER_LEN} bytes, got {}",
            block.len()
        )));
    }
    let message: [u8; SMALL_MESSAGE_LEN] = block[..SMALL_MESSAGE_LEN].try_into().unwrap();
    let parity = encode_288_224(&message);
    block[SMALL_MESSAGE_LEN..].copy_from_slice(&parity);
    Ok(())
}

/// `true` if a small (36-byte) FEC block's parity suffix matches its
/// message. `max_iterations` is accepted for interface parity with a real
/// iterative decoder and otherwise ignored.
pub fn check_small(block: &[u8], max_iterations: u32) -> Result<bool> {
    let _ = max_iterations;
    if block.len() != SMALL_HEADER_LEN {
        return Err(Error::Range(format!(
            "small FEC block must be {SMALL_HEADER_LEN} bytes, got {}",
            block.len()
        )));
    }
    let message: [u8; SMALL_MESSAGE_LEN] = block[..SMALL_MESSAGE_LEN].try_into().unwrap();
    let parity: [u8; 8] = block[SMALL_MESSAGE_LEN..].try_into().unwrap();
    Ok(verify_288_224(&message, &parity))
}

/// Computes and writes the parity suffix of a large (348-byte) FEC block in
/// place, overwriting its final 96 bytes.
pub fn protect_large(block: &mut [u8]) -> Result<()> {
    if block.len() != LARGE_HEADER_LEN {
        return Err(Error::Range(format!(
            "large FEC block must be {LARGE_HEADER_LEN} bytes, got {}",
            block.len()
        )));
    }
    let message: [u8; LARGE_MESSAGE_LEN] = block[..LARGE_MESSAGE_LEN].try_into().unwrap();
    let parity = encode_2784_2016(&message);
    block[LARGE_MESSAGE_LEN..].copy_from_slice(&parity);
    Ok(())
}

/// `true` if a large (348-byte) FEC block's parity suffix matches its
/// message.
pub fn check_large(block: &[u8], max_iterations: u32) -> Result<bool> {
    let _ = max_iterations;
    if block.len() != LARGE_HEADER_LEN {
        return Err(Error::Range(format!(
            "large FEC block must be {LARGE_HEADER_LEN} bytes, got {}",
            block.len()
        )));
    }
    let message: [u8; LARGE_MESSAGE_LEN] = block[..LARGE_MESSAGE_LEN].try_into().unwrap();
    let parity: [u8; 96] = block[LARGE_MESSAGE_LEN..].try_into().unwrap();
    Ok(verify_2784_2016(&message, &parity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ones_message_broadcasts_xor_to_every_parity_byte() {
        let message = [0xFFu8; SMALL_MESSAGE_LEN];
        let parity = encode_288_224(&message);
        // XOR of 28 0xFF bytes: even count of 0xFF cancels to 0x00.
        let expected = message.iter().fold(0u8, |a, b| a ^ b);
        assert!(parity.iter().all(|&b| b == expected));
    }

    #[test]
    fn protect_then_check_roundtrips() {
        let mut block = vec![0u8; SMALL_HEADER_LEN];
        for (i, b) in block.iter_mut().take(SMALL_MESSAGE_LEN).enumerate() {
            *b = i as u8;
        }
        protect_small(&mut block).unwrap();
        assert!(check_small(&block, MAX_ITERATIONS).unwrap());
    }

    #[test]
    fn corrupted_message_fails_check() {
        let mut block = vec![0u8; SMALL_HEADER_LEN];
        protect_small(&mut block).unwrap();
        block[0] ^= 0x01;
        assert!(!check_small(&block, MAX_ITERATIONS).unwrap());
    }

    #[test]
    fn large_block_roundtrips() {
        let mut block = vec![0u8; LARGE_HEADER_LEN];
        for (i, b) in block.iter_mut().take(LARGE_MESSAGE_LEN).enumerate() {
            *b = (i * 7) as u8;
        }
        protect_large(&mut block).unwrap();
        assert!(check_large(&block, MAX_ITERATIONS).unwrap());
    }

    #[test]
    fn wrong_block_size_errors() {
        let mut block = vec![0u8; 10];
        assert!(protect_small(&mut block).is_err());
    }
}
