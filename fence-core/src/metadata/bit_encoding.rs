//! Byte payload of `d1` packed into class file strings
//!
//! Two layouts exist. UTF-8 mode starts with a `\u{0}` marker and stores one
//! byte per char. The older 8-to-7 mode (optionally marked with `\u{FFFF}`)
//! packs 8-bit bytes into 7-bit chars shifted by `0x7F`. Rewritten payloads
//! are always encoded in UTF-8 mode.

use super::MetadataDecodeError;

const UTF8_MODE_MARKER: char = '\u{0}';
const EIGHT_TO_SEVEN_MARKER: char = '\u{FFFF}';

/// Largest `CONSTANT_Utf8` body
const MAX_UTF8_INFO_LENGTH: usize = 65535;

pub fn decode_bytes(data: &[String]) -> Result<Vec<u8>, MetadataDecodeError> {
    let mut data: Vec<&str> = data.iter().map(String::as_str).collect();
    match data.first().and_then(|s| s.chars().next()) {
        Some(UTF8_MODE_MARKER) => {
            data[0] = &data[0][UTF8_MODE_MARKER.len_utf8()..];
            return strings_to_bytes(&data);
        }
        Some(EIGHT_TO_SEVEN_MARKER) => {
            data[0] = &data[0][EIGHT_TO_SEVEN_MARKER.len_utf8()..];
        }
        _ => {}
    }

    let mut bytes = strings_to_bytes(&data)?;
    for byte in bytes.iter_mut() {
        *byte = byte.wrapping_add(0x7F) & 0x7F;
    }
    Ok(decode_7_to_8(&bytes))
}

fn strings_to_bytes(data: &[&str]) -> Result<Vec<u8>, MetadataDecodeError> {
    let mut bytes = Vec::new();
    for s in data {
        for c in s.chars() {
            let code = u32::from(c);
            if code > 0xFF {
                return Err(MetadataDecodeError::Encoding(format!("char U+{:04X} outside the byte range", code)));
            }
            bytes.push(code as u8);
        }
    }
    Ok(bytes)
}

fn decode_7_to_8(data: &[u8]) -> Vec<u8> {
    let result_len = 7 * data.len() / 8;
    let mut result = Vec::with_capacity(result_len);
    let mut index = 0;
    let mut bit = 0;
    for _ in 0..result_len {
        let first = (data[index] as u32) >> bit;
        index += 1;
        let second = ((data[index] as u32) & ((1 << (bit + 1)) - 1)) << (7 - bit);
        result.push((first + second) as u8);
        if bit == 6 {
            index += 1;
            bit = 0;
        } else {
            bit += 1;
        }
    }
    result
}

/// Split `bytes` into UTF-8 mode strings that each fit a `CONSTANT_Utf8`
pub fn encode_bytes(bytes: &[u8]) -> Vec<String> {
    let mut result = Vec::new();
    let mut buffer = String::new();
    buffer.push(UTF8_MODE_MARKER);
    let mut encoded_len = 2;

    for &b in bytes {
        buffer.push(char::from(b));
        encoded_len += if (1..=127).contains(&b) { 1 } else { 2 };
        if encoded_len >= MAX_UTF8_INFO_LENGTH - 1 {
            result.push(std::mem::take(&mut buffer));
            encoded_len = 0;
        }
    }
    if !buffer.is_empty() {
        result.push(buffer);
    }
    result
}

/// Split `bytes` into marked 8-to-7 mode strings, the layout older
/// compilers emit
pub fn encode_bytes_8_to_7(bytes: &[u8]) -> Vec<String> {
    let mut result = Vec::new();
    let mut buffer = String::new();
    buffer.push(EIGHT_TO_SEVEN_MARKER);
    let mut encoded_len = EIGHT_TO_SEVEN_MARKER.len_utf8();

    for chunk in encode_8_to_7(bytes) {
        let c = chunk.wrapping_add(1) & 0x7F;
        buffer.push(char::from(c));
        encoded_len += if c == 0 { 2 } else { 1 };
        if encoded_len >= MAX_UTF8_INFO_LENGTH - 1 {
            result.push(std::mem::take(&mut buffer));
            encoded_len = 0;
        }
    }
    if !buffer.is_empty() {
        result.push(buffer);
    }
    result
}

/// Little-endian bit stream of `data` cut into 7-bit chunks
fn encode_8_to_7(data: &[u8]) -> Vec<u8> {
    let total_bits = data.len() * 8;
    (0..total_bits.div_ceil(7))
        .map(|chunk| {
            (0..7)
                .map(|b| (b, 7 * chunk + b))
                .filter(|&(_, bit)| bit < total_bits && (data[bit / 8] >> (bit % 8)) & 1 == 1)
                .fold(0u8, |acc, (b, _)| acc | (1 << b))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::mutf8;

    #[test]
    fn test_utf8_mode() {
        let bytes = vec![0x00, 0x0A, 0x80, 0xFF];
        let strings = encode_bytes(&bytes);
        assert_eq!(strings.len(), 1);
        assert!(strings[0].starts_with('\u{0}'));
        assert_eq!(decode_bytes(&strings).unwrap(), bytes);
    }

    #[test]
    fn test_chunks_fit_constant_pool() {
        let bytes = vec![0xC8; 70_000];
        let strings = encode_bytes(&bytes);
        assert_eq!(strings.len(), 3);
        assert!(strings.iter().all(|s| mutf8::encoded_len(s) <= MAX_UTF8_INFO_LENGTH));
        assert_eq!(decode_bytes(&strings).unwrap(), bytes);
    }

    #[test]
    fn test_8_to_7_mode() {
        // 7 bytes of 0xFF pack into 8 chars of 0x7F, stored shifted by -0x7F (mod 0x80)
        let chars: String = std::iter::repeat_n('\u{0}', 8).collect();
        let marked = format!("\u{FFFF}{}", chars);
        assert_eq!(decode_bytes(&[chars]).unwrap(), vec![0xFF; 7]);
        assert_eq!(decode_bytes(&[marked]).unwrap(), vec![0xFF; 7]);
    }

    #[test]
    fn test_8_to_7_low_values() {
        // 0x01 followed by zeros: first char holds the low 7 bits
        let shifted: String = [0x01u8, 0, 0, 0, 0, 0, 0, 0]
            .iter()
            .map(|&b| char::from((b + 1) & 0x7F))
            .collect();
        assert_eq!(decode_bytes(&[shifted]).unwrap(), vec![0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_8_to_7_encoding_decodes() {
        let bytes: Vec<u8> = (0..=255u8).chain([0x0A, 0x80, 0xFF]).collect();
        let strings = encode_bytes_8_to_7(&bytes);
        assert!(strings[0].starts_with('\u{FFFF}'));
        assert_eq!(decode_bytes(&strings).unwrap(), bytes);

        // 0xFF bytes become 0x7F chunks, stored as zero chars
        let strings = encode_bytes_8_to_7(&[0xFF; 7]);
        assert_eq!(strings, vec![format!("\u{FFFF}{}", "\u{0}".repeat(8))]);
    }

    #[test]
    fn test_rejects_wide_chars() {
        assert!(decode_bytes(&["\u{0}\u{100}".to_string()]).is_err());
    }
}
