//! MSB-first conversion between bytes and bit sequences.

pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1 == 1);
        }
    }
    bits
}

/// Packs bits into bytes. A trailing partial byte is zero-padded on the right.
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | ((bit as u8) << (7 - i)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_order() {
        assert_eq!(
            bytes_to_bits(&[0b1010_0001]),
            vec![true, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_pack_unpack() {
        let bytes = vec![0x00, 0xFF, 0x5A, 0x81];
        assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    }

    #[test]
    fn test_partial_byte_is_left_aligned() {
        assert_eq!(bits_to_bytes(&[true, true]), vec![0xC0]);
        assert!(bits_to_bytes(&[]).is_empty());
    }
}
