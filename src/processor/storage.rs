use crate::processor::{
    ProcessorError,
    composite_key::append_key_field,
    varint::{MAX_VARINT32_LEN, append_varint32, encode_varint32, parse_varint32},
};

/// Handle to a blob in a [`DynamicStorage`].
pub type Handle = u32;

/// Append-only arena of varint length-prefixed blobs addressed by handle.
///
/// Handles fit in a group's packed state while the variable-length bytes live
/// here. Updating a blob rewrites it in place when the new bytes fit in the
/// old slot; otherwise the new bytes are appended and the old slot is left
/// unused.
#[derive(Debug, Default)]
pub struct DynamicStorage {
    storage: Vec<u8>,
    offsets: Vec<usize>,
}

impl DynamicStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, data: &[u8]) -> Result<Handle, ProcessorError> {
        let handle = Handle::try_from(self.offsets.len())
            .map_err(|_| ProcessorError::logic("storage handle space exhausted"))?;
        self.offsets.push(self.storage.len());
        Self::append(data, &mut self.storage)?;
        Ok(handle)
    }

    pub fn update(&mut self, handle: Handle, data: &[u8]) -> Result<(), ProcessorError> {
        let offset = self.offsets[handle as usize];
        let (old_len, prefix) = parse_varint32(&self.storage[offset..]);
        let new_len = blob_len(data)?;

        let mut encoded = [0u8; MAX_VARINT32_LEN];
        let new_prefix = encode_varint32(new_len, &mut encoded);
        if new_prefix + data.len() <= prefix + old_len as usize {
            let slot = &mut self.storage[offset..offset + new_prefix + data.len()];
            slot[..new_prefix].copy_from_slice(&encoded[..new_prefix]);
            slot[new_prefix..].copy_from_slice(data);
        } else {
            self.offsets[handle as usize] = self.storage.len();
            Self::append(data, &mut self.storage)?;
        }
        Ok(())
    }

    pub fn load(&self, handle: Handle) -> &[u8] {
        let offset = self.offsets[handle as usize];
        let (len, prefix) = parse_varint32(&self.storage[offset..]);
        &self.storage[offset + prefix..offset + prefix + len as usize]
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn append(data: &[u8], out: &mut Vec<u8>) -> Result<(), ProcessorError> {
        append_varint32(blob_len(data)?, out);
        out.extend_from_slice(data);
        Ok(())
    }
}

fn blob_len(data: &[u8]) -> Result<u32, ProcessorError> {
    u32::try_from(data.len()).map_err(|_| ProcessorError::KeyTooLong(data.len()))
}

/// Serializes several fields into one blob for [`DynamicStorage`].
///
/// A single field is stored raw. Otherwise every field except the last gets a
/// varint length prefix; the last one runs to the end of the blob.
pub fn serialize_fields<'a>(
    fields: impl ExactSizeIterator<Item = &'a [u8]>,
    out: &mut Vec<u8>,
) -> Result<(), ProcessorError> {
    out.clear();
    let count = fields.len();
    for (i, field) in fields.enumerate() {
        if i + 1 == count {
            out.extend_from_slice(field);
        } else {
            append_key_field(field, out)?;
        }
    }
    Ok(())
}

/// Inverse of [`serialize_fields`] for a blob holding `count` fields.
pub fn deserialize_fields(blob: &[u8], count: usize) -> impl Iterator<Item = &[u8]> {
    let mut rest = blob;
    (0..count).map(move |i| {
        if i + 1 == count {
            std::mem::take(&mut rest)
        } else {
            let (len, prefix) = parse_varint32(rest);
            let (field, tail) = rest[prefix..].split_at(len as usize);
            rest = tail;
            field
        }
    })
}
