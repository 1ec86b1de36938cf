//! Serialization of multi-field grouping keys into one hashable byte string.
//!
//! Every field is written as a varint length followed by its raw bytes, in
//! key declaration order. The length prefixes make the encoding injective
//! over field tuples, so the bytes can stand in for the tuple as a map key.

use crate::processor::{
    Key, ProcessorError,
    row::InputRow,
    varint::{append_varint32, parse_varint32},
};

/// Appends one length-prefixed field to `out`.
pub fn append_key_field(value: &[u8], out: &mut Vec<u8>) -> Result<(), ProcessorError> {
    let len = u32::try_from(value.len()).map_err(|_| ProcessorError::KeyTooLong(value.len()))?;
    append_varint32(len, out);
    out.extend_from_slice(value);
    Ok(())
}

/// Serializes the key fields of `row` into `out` (cleared first).
pub fn serialize_key(
    row: &InputRow<'_>,
    keys: &[Key],
    out: &mut Vec<u8>,
) -> Result<(), ProcessorError> {
    out.clear();
    for key in keys {
        append_key_field(row.field(key.field), out)?;
    }
    Ok(())
}

/// Iterates the fields of a serialized composite key.
pub fn key_fields(serialized: &[u8]) -> KeyFields<'_> {
    KeyFields { rest: serialized }
}

pub struct KeyFields<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for KeyFields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        let (len, prefix) = parse_varint32(self.rest);
        let (field, rest) = self.rest[prefix..].split_at(len as usize);
        self.rest = rest;
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(fields: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for f in fields {
            append_key_field(f, &mut out).unwrap();
        }
        out
    }

    #[test]
    fn test_round_trip() {
        let long = vec![b'x'; 300];
        let fields: Vec<&[u8]> = vec![b"AAPL", b"", &long, b"2024"];
        let encoded = encode(&fields);
        let decoded: Vec<&[u8]> = key_fields(&encoded).collect();
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_field_boundaries_are_not_ambiguous() {
        assert_ne!(encode(&[b"ab", b"c"]), encode(&[b"a", b"bc"]));
        assert_ne!(encode(&[b"", b"a"]), encode(&[b"a", b""]));
    }

    #[test]
    fn test_serialize_from_row() {
        let line = b"x y z";
        let spans = [(0, 1), (2, 3), (4, 5)];
        let row = InputRow::new(line, &spans);
        let keys = [Key::new(2, 0), Key::new(0, 1)];

        let mut buf = vec![0xff];
        serialize_key(&row, &keys, &mut buf).unwrap();
        assert_eq!(buf, b"\x02z\x02x");
    }
}
