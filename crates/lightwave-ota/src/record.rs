//! Flash record layout backing the device key-value store.
//!
//! ```text
//! [magic: 4] [payload length: u16 LE] [entry]...
//! entry = [ns len: u8] [key len: u8] [value len: u16 LE] [ns] [key] [value]
//! ```
//!
//! Erased flash (all `0xFF`) has no magic and reads as an empty record.
//! Parsing stops at the first entry that runs past the payload.

use crate::ports::StoreError;

pub const MAGIC: [u8; 4] = *b"LWKV";
pub const HEADER_LEN: usize = 6;

const ENTRY_HEADER_LEN: usize = 4;
const ERASED: u8 = 0xFF;

/// One `(namespace, key, value)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub namespace: &'a [u8],
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl Entry<'_> {
    fn matches(&self, namespace: &str, key: &str) -> bool {
        self.namespace == namespace.as_bytes() && self.key == key.as_bytes()
    }

    fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.namespace.len() + self.key.len() + self.value.len()
    }
}

/// Iterator over the entries of a record.
pub struct Entries<'a> {
    payload: &'a [u8],
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.payload.get(..ENTRY_HEADER_LEN)?;
        let ns_len = usize::from(header[0]);
        let key_len = usize::from(header[1]);
        let value_len = usize::from(u16::from_le_bytes([header[2], header[3]]));
        let end = ENTRY_HEADER_LEN + ns_len + key_len + value_len;
        let Some(body) = self.payload.get(ENTRY_HEADER_LEN..end) else {
            self.payload = &[];
            return None;
        };

        let (namespace, rest) = body.split_at(ns_len);
        let (key, value) = rest.split_at(key_len);
        self.payload = &self.payload[end..];
        Some(Entry {
            namespace,
            key,
            value,
        })
    }
}

/// Entries stored in `record`. A record without the magic header is empty.
pub fn entries(record: &[u8]) -> Entries<'_> {
    Entries {
        payload: payload(record).unwrap_or(&[]),
    }
}

pub fn lookup<'a>(record: &'a [u8], namespace: &str, key: &str) -> Option<&'a [u8]> {
    entries(record)
        .find(|entry| entry.matches(namespace, key))
        .map(|entry| entry.value)
}

/// Write into `out` a copy of `record` with `namespace`/`key` set to
/// `value`, or removed when `value` is `None`. Unused space is left erased.
///
/// Returns the number of meaningful bytes in `out`.
pub fn rebuild(
    record: &[u8],
    namespace: &str,
    key: &str,
    value: Option<&[u8]>,
    out: &mut [u8],
) -> Result<usize, StoreError> {
    if out.len() < HEADER_LEN {
        return Err(StoreError::Capacity);
    }
    out.fill(ERASED);

    let mut pos = HEADER_LEN;
    for entry in entries(record).filter(|entry| !entry.matches(namespace, key)) {
        pos = push_entry(out, pos, entry)?;
    }
    if let Some(value) = value {
        let entry = Entry {
            namespace: namespace.as_bytes(),
            key: key.as_bytes(),
            value,
        };
        pos = push_entry(out, pos, entry)?;
    }

    let payload_len = u16::try_from(pos - HEADER_LEN).map_err(|_| StoreError::Capacity)?;
    out[..4].copy_from_slice(&MAGIC);
    out[4..HEADER_LEN].copy_from_slice(&payload_len.to_le_bytes());
    Ok(pos)
}

fn payload(record: &[u8]) -> Option<&[u8]> {
    let header = record.get(..HEADER_LEN)?;
    if header[..4] != MAGIC {
        return None;
    }
    let len = usize::from(u16::from_le_bytes([header[4], header[5]]));
    record.get(HEADER_LEN..HEADER_LEN + len)
}

fn push_entry(out: &mut [u8], pos: usize, entry: Entry<'_>) -> Result<usize, StoreError> {
    let ns_len = u8::try_from(entry.namespace.len()).map_err(|_| StoreError::Capacity)?;
    let key_len = u8::try_from(entry.key.len()).map_err(|_| StoreError::Capacity)?;
    let value_len = u16::try_from(entry.value.len()).map_err(|_| StoreError::Capacity)?;
    let end = pos + entry.encoded_len();
    let slot = out.get_mut(pos..end).ok_or(StoreError::Capacity)?;

    slot[0] = ns_len;
    slot[1] = key_len;
    slot[2..4].copy_from_slice(&value_len.to_le_bytes());
    let body = &mut slot[ENTRY_HEADER_LEN..];
    let (ns, rest) = body.split_at_mut(entry.namespace.len());
    let (key, value) = rest.split_at_mut(entry.key.len());
    ns.copy_from_slice(entry.namespace);
    key.copy_from_slice(entry.key);
    value.copy_from_slice(entry.value);
    Ok(end)
}
