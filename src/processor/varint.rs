//! Tagged-length varint for `u32` values.
//!
//! The number of trailing one bits in the lead byte selects the form, so a
//! decoder only ever inspects a single byte before knowing the full length:
//!
//! | value range  | bytes | stored (little-endian)  |
//! |--------------|-------|-------------------------|
//! | `< 2^7`      | 1     | `x << 1`                |
//! | `< 2^14`     | 2     | `(x << 2) \| 0b1`       |
//! | `< 2^21`     | 3     | `(x << 3) \| 0b11`      |
//! | `< 2^28`     | 4     | `(x << 4) \| 0b111`     |
//! | otherwise    | 5     | `0x0f`, then `x` raw    |
//!
//! This is not LEB128 and is never exchanged with other programs; it only
//! length-prefixes fields inside composite keys and storage blobs.

/// Upper bound on the encoded length of any `u32`.
pub const MAX_VARINT32_LEN: usize = 5;

/// Encodes `x` into `buf` and returns the number of bytes written.
#[inline]
pub fn encode_varint32(x: u32, buf: &mut [u8; MAX_VARINT32_LEN]) -> usize {
    if x < 1 << 7 {
        buf[0] = (x << 1) as u8;
        1
    } else {
        encode_varint32_slow(x, buf)
    }
}

fn encode_varint32_slow(x: u32, buf: &mut [u8; MAX_VARINT32_LEN]) -> usize {
    if x < 1 << 14 {
        store(((x << 2) | 1).to_le_bytes(), 2, buf)
    } else if x < 1 << 21 {
        store(((x << 3) | 3).to_le_bytes(), 3, buf)
    } else if x < 1 << 28 {
        store(((x << 4) | 7).to_le_bytes(), 4, buf)
    } else {
        buf[0] = 0x0f;
        buf[1..5].copy_from_slice(&x.to_le_bytes());
        5
    }
}

#[inline]
fn store(bytes: [u8; 4], len: usize, buf: &mut [u8; MAX_VARINT32_LEN]) -> usize {
    buf[..len].copy_from_slice(&bytes[..len]);
    len
}

/// Appends the encoding of `x` to `out`.
#[inline]
pub fn append_varint32(x: u32, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    let len = encode_varint32(x, &mut buf);
    out.extend_from_slice(&buf[..len]);
}

/// Decodes one value from the front of `input`.
///
/// Returns the value and the number of bytes consumed. `input` must start with
/// bytes produced by [`encode_varint32`]; anything else may panic on a short
/// slice.
#[inline]
pub fn parse_varint32(input: &[u8]) -> (u32, usize) {
    let lead = input[0];
    if lead & 1 == 0 {
        ((lead >> 1) as u32, 1)
    } else {
        parse_varint32_slow(lead, input)
    }
}

fn parse_varint32_slow(lead: u8, input: &[u8]) -> (u32, usize) {
    let trailing_ones = lead.trailing_ones().min(4) as usize;
    if trailing_ones == 4 {
        return (load(&input[1..5]), 5);
    }
    let len = trailing_ones + 1;
    (load(&input[..len]) >> len, len)
}

#[inline]
fn load(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw[..bytes.len()].copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(x: u32) {
        let mut buf = [0u8; MAX_VARINT32_LEN];
        let len = encode_varint32(x, &mut buf);
        assert_eq!(parse_varint32(&buf[..len]), (x, len), "value {x}");
    }

    #[test]
    fn test_smoke() {
        let mut buf = Vec::new();
        append_varint32(42, &mut buf);
        assert_eq!(buf, b"\x54");
        assert_eq!(parse_varint32(&buf), (42, 1));
    }

    #[test]
    fn test_form_boundaries() {
        for shift in [7u32, 14, 21, 28] {
            let edge = 1u32 << shift;
            round_trip(edge - 1);
            round_trip(edge);
            round_trip(edge + 1);
        }
        round_trip(0);
        round_trip(1);
        round_trip(u32::MAX - 1);
        round_trip(u32::MAX);
    }

    #[test]
    fn test_encoded_lengths() {
        let cases = [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            ((1 << 14) - 1, 2),
            (1 << 14, 3),
            ((1 << 21) - 1, 3),
            (1 << 21, 4),
            ((1 << 28) - 1, 4),
            (1 << 28, 5),
            (u32::MAX, 5),
        ];
        for (x, expected) in cases {
            let mut buf = [0u8; MAX_VARINT32_LEN];
            assert_eq!(encode_varint32(x, &mut buf), expected, "value {x}");
        }
    }

    #[test]
    fn test_five_byte_form_is_raw() {
        let mut buf = [0u8; MAX_VARINT32_LEN];
        encode_varint32(0xdead_beef, &mut buf);
        assert_eq!(buf, [0x0f, 0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn test_sequence() {
        let values: Vec<u32> = (0..200_000).chain([u32::MAX, 1 << 28, 1 << 21]).collect();
        let mut buf = Vec::new();
        for &x in &values {
            append_varint32(x, &mut buf);
        }

        let mut decoded = Vec::with_capacity(values.len());
        let mut rest = &buf[..];
        while !rest.is_empty() {
            let (x, len) = parse_varint32(rest);
            decoded.push(x);
            rest = &rest[len..];
        }
        assert_eq!(decoded, values);
    }
}
