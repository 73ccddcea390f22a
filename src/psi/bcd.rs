//! Binary-coded decimal helpers.

/// Two BCD digits in one byte.
pub fn byte(b: u8) -> u32 {
    ((b >> 4) as u32) * 10 + (b & 0x0F) as u32
}

/// Decodes `digits` nibbles, most significant first.
///
/// Nibbles above 9 are taken at face value, as receivers in the field do.
pub fn decode(bytes: &[u8], digits: usize) -> u32 {
    let mut value = 0u32;
    for i in 0..digits.min(bytes.len() * 2) {
        let b = bytes[i / 2];
        let nibble = if i % 2 == 0 { b >> 4 } else { b & 0x0F };
        value = value.wrapping_mul(10).wrapping_add(nibble as u32);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bytes_and_digit_runs() {
        assert_eq!(byte(0x59), 59);
        assert_eq!(decode(&[0x01, 0x17, 0x27, 0x50], 8), 1_172_750);
        // 7-digit symbol rate followed by a FEC nibble
        assert_eq!(decode(&[0x02, 0x75, 0x00, 0x03], 7), 275_000);
    }
}
