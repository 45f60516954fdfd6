//! Binary format for command records
//!
//! A command record describes one mutating store operation as a single flat
//! buffer: a fixed 48-byte header followed by the key, value and subkey bytes.
//! The header addresses each payload field with an (offset, length) pair, so a
//! decoder hands out borrowed slices of the buffer instead of copying fields.
//!
//! Layout (all integers little-endian):
//!   [0..4]   magic:     [u8;4] - "SHRC"
//!   [4]      version:   u8     - RECORD_VERSION
//!   [5]      kind:      u8     - operation code
//!   [6]      label_len: u8     - bytes of label in use
//!   [7]      reserved:  u8     - zero
//!   [8..24]  label:     [u8;16] - UTF-8 display label, zero padded
//!   [24..32] key:       u32 offset + u32 length
//!   [32..40] value:     u32 offset + u32 length
//!   [40..48] subkey:    u32 offset + u32 length
//!   [48..]   key bytes ++ value bytes ++ subkey bytes

use std::fmt;
use std::ops::Range;

use crate::error::{RecordError, RecordResult};

/// Magic bytes identifying a command record: "SHRC" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = *b"SHRC";

/// Current record layout version
pub const RECORD_VERSION: u8 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 48;

/// Capacity of the header's label region
pub const LABEL_CAPACITY: usize = 16;

/// Offsets are u32, so no record may be larger than this
pub const MAX_RECORD_SIZE: u64 = u32::MAX as u64;

const KEY_SPAN_AT: usize = 24;
const VALUE_SPAN_AT: usize = 32;
const SUBKEY_SPAN_AT: usize = 40;

/// Store operations that produce a command record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    /// Insert or overwrite a key
    Set = 1,
    /// Insert only if the key is absent
    Add = 2,
    /// Overwrite only if the key is present
    Replace = 3,
    /// Extend the value of an existing key
    Append = 4,
    /// Delete a key
    Remove = 5,
}

impl OperationKind {
    /// All kinds, in code order
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Set,
        OperationKind::Add,
        OperationKind::Replace,
        OperationKind::Append,
        OperationKind::Remove,
    ];

    /// Numeric wire code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code; `None` for codes this version does not know
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OperationKind::Set),
            2 => Some(OperationKind::Add),
            3 => Some(OperationKind::Replace),
            4 => Some(OperationKind::Append),
            5 => Some(OperationKind::Remove),
            _ => None,
        }
    }

    /// Canonical display label, as the engine names the call
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Set => "set",
            OperationKind::Add => "add",
            OperationKind::Replace => "replace",
            OperationKind::Append => "append",
            OperationKind::Remove => "remove",
        }
    }

    /// Whether the operation carries a value
    pub fn carries_value(self) -> bool {
        !matches!(self, OperationKind::Remove)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// (offset, length) descriptor of one payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSpan {
    /// Byte offset from the start of the record
    pub offset: u32,
    /// Field length; zero means absent and the offset is ignored
    pub length: u32,
}

impl FieldSpan {
    fn write(&self, buf: &mut [u8], at: usize) {
        buf[at..at + 4].copy_from_slice(&self.offset.to_le_bytes());
        buf[at + 4..at + 8].copy_from_slice(&self.length.to_le_bytes());
    }

    fn read(buf: &[u8; HEADER_SIZE], at: usize) -> Self {
        Self {
            offset: u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]),
            length: u32::from_le_bytes([buf[at + 4], buf[at + 5], buf[at + 6], buf[at + 7]]),
        }
    }

    /// Validate the span against a buffer of `len` bytes and turn it into a range.
    fn resolve(&self, len: usize, field: &str) -> RecordResult<Range<usize>> {
        if self.length == 0 {
            return Ok(0..0);
        }
        let start = self.offset as usize;
        let end = start.checked_add(self.length as usize).ok_or_else(|| {
            RecordError::malformed(format!(
                "{} span overflows: offset {} + length {}",
                field, self.offset, self.length
            ))
        })?;
        if start < HEADER_SIZE {
            return Err(RecordError::malformed(format!(
                "{} starts at {} inside the {}-byte header", field, start, HEADER_SIZE
            )));
        }
        if end > len {
            return Err(RecordError::malformed(format!(
                "{} span {}..{} exceeds buffer of {} bytes", field, start, end, len
            )));
        }
        Ok(start..end)
    }
}

/// Fixed-size record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Magic bytes for record identification
    pub magic: [u8; 4],
    /// Layout version
    pub version: u8,
    /// Operation code
    pub kind: u8,
    /// Bytes of `label` in use
    pub label_len: u8,
    /// Label bytes, zero padded
    pub label: [u8; LABEL_CAPACITY],
    /// Key field descriptor
    pub key: FieldSpan,
    /// Value field descriptor
    pub value: FieldSpan,
    /// Subkey field descriptor
    pub subkey: FieldSpan,
}

impl RecordHeader {
    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.version;
        buf[5] = self.kind;
        buf[6] = self.label_len;
        // buf[7] reserved, already zeroed
        buf[8..24].copy_from_slice(&self.label);
        self.key.write(&mut buf, KEY_SPAN_AT);
        self.value.write(&mut buf, VALUE_SPAN_AT);
        self.subkey.write(&mut buf, SUBKEY_SPAN_AT);
        buf
    }

    /// Parse header from bytes. Performs no validation.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut label = [0u8; LABEL_CAPACITY];
        label.copy_from_slice(&bytes[8..24]);

        Self {
            magic,
            version: bytes[4],
            kind: bytes[5],
            label_len: bytes[6],
            label,
            key: FieldSpan::read(bytes, KEY_SPAN_AT),
            value: FieldSpan::read(bytes, VALUE_SPAN_AT),
            subkey: FieldSpan::read(bytes, SUBKEY_SPAN_AT),
        }
    }
}

/// A decoded command record, borrowing every field from the encoded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRecord<'a> {
    /// Operation that produced the record
    pub kind: OperationKind,
    /// Display label carried alongside the kind
    pub label: &'a str,
    /// Key bytes
    pub key: &'a [u8],
    /// Value bytes, empty when the operation carries none
    pub value: &'a [u8],
    /// Subkey bytes, empty unless the operation targets a layered key
    pub subkey: &'a [u8],
}

impl<'a> CommandRecord<'a> {
    /// Whether a value was supplied
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// Whether a subkey was supplied
    pub fn has_subkey(&self) -> bool {
        !self.subkey.is_empty()
    }

    /// Re-encode this record into a fresh buffer
    pub fn encode_to_vec(&self) -> RecordResult<Vec<u8>> {
        encode(
            self.kind,
            self.label,
            self.key,
            Some(self.value).filter(|v| !v.is_empty()),
            Some(self.subkey).filter(|s| !s.is_empty()),
        )
    }
}

/// Encode one mutating operation into a command record buffer.
///
/// Payloads are laid out key, value, subkey. An absent field is written with
/// length 0; its offset points at the end of the preceding field.
pub fn encode(
    kind: OperationKind,
    label: &str,
    key: &[u8],
    value: Option<&[u8]>,
    subkey: Option<&[u8]>,
) -> RecordResult<Vec<u8>> {
    if label.len() > LABEL_CAPACITY {
        return Err(RecordError::LabelTooLong {
            len: label.len(),
            capacity: LABEL_CAPACITY,
        });
    }

    let value = value.unwrap_or(&[]);
    let subkey = subkey.unwrap_or(&[]);

    // Validate total size BEFORE any allocation
    let total = HEADER_SIZE as u64 + key.len() as u64 + value.len() as u64 + subkey.len() as u64;
    if total > MAX_RECORD_SIZE {
        return Err(RecordError::RecordTooLarge { total, limit: MAX_RECORD_SIZE });
    }

    let key_span = FieldSpan {
        offset: HEADER_SIZE as u32,
        length: key.len() as u32,
    };
    let value_span = FieldSpan {
        offset: key_span.offset + key_span.length,
        length: value.len() as u32,
    };
    let subkey_span = FieldSpan {
        offset: value_span.offset + value_span.length,
        length: subkey.len() as u32,
    };

    let mut label_buf = [0u8; LABEL_CAPACITY];
    label_buf[..label.len()].copy_from_slice(label.as_bytes());

    let header = RecordHeader {
        magic: MAGIC_ARRAY,
        version: RECORD_VERSION,
        kind: kind.code(),
        label_len: label.len() as u8,
        label: label_buf,
        key: key_span,
        value: value_span,
        subkey: subkey_span,
    };

    let mut buffer = Vec::with_capacity(total as usize);
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(key);
    buffer.extend_from_slice(value);
    buffer.extend_from_slice(subkey);

    Ok(buffer)
}

/// Decode a command record, borrowing its fields from `data`.
///
/// Fails closed: any structural problem is a `MalformedRecord`, and no byte
/// outside `data` is ever read.
pub fn decode(data: &[u8]) -> RecordResult<CommandRecord<'_>> {
    if data.len() < HEADER_SIZE {
        return Err(RecordError::malformed(format!(
            "buffer too short: {} bytes, need at least {}", data.len(), HEADER_SIZE
        )));
    }

    let header_bytes: &[u8; HEADER_SIZE] = data[..HEADER_SIZE]
        .try_into()
        .map_err(|_| RecordError::malformed("header truncated"))?;
    let header = RecordHeader::from_bytes(header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(RecordError::malformed(format!(
            "bad magic {:02x}{:02x}{:02x}{:02x}",
            header.magic[0], header.magic[1], header.magic[2], header.magic[3]
        )));
    }
    if header.version != RECORD_VERSION {
        return Err(RecordError::malformed(format!("unsupported version {}", header.version)));
    }

    let kind = OperationKind::from_code(header.kind)
        .ok_or_else(|| RecordError::malformed(format!("unknown operation kind {}", header.kind)))?;

    let label_len = header.label_len as usize;
    if label_len > LABEL_CAPACITY {
        return Err(RecordError::malformed(format!(
            "label length {} exceeds capacity {}", label_len, LABEL_CAPACITY
        )));
    }
    let label = std::str::from_utf8(&data[8..8 + label_len])
        .map_err(|_| RecordError::malformed("label is not valid UTF-8"))?;

    let key = header.key.resolve(data.len(), "key")?;
    let value = header.value.resolve(data.len(), "value")?;
    let subkey = header.subkey.resolve(data.len(), "subkey")?;

    for (a, b, names) in [
        (&key, &value, "key/value"),
        (&key, &subkey, "key/subkey"),
        (&value, &subkey, "value/subkey"),
    ] {
        if !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end {
            return Err(RecordError::malformed(format!("{} spans overlap", names)));
        }
    }

    Ok(CommandRecord {
        kind,
        label,
        key: &data[key],
        value: &data[value],
        subkey: &data[subkey],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patch_span(buf: &mut [u8], at: usize, offset: u32, length: u32) {
        buf[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        buf[at + 4..at + 8].copy_from_slice(&length.to_le_bytes());
    }

    fn assert_malformed(data: &[u8]) {
        assert!(
            matches!(decode(data), Err(RecordError::MalformedRecord { .. })),
            "expected MalformedRecord"
        );
    }

    #[test]
    fn test_header_layout() {
        let buf = encode(OperationKind::Set, "set", b"k", Some(b"v"), None).unwrap();
        assert_eq!(&buf[0..4], b"SHRC");
        assert_eq!(buf[4], RECORD_VERSION);
        assert_eq!(buf[5], 1);
        assert_eq!(buf[6], 3);
        assert_eq!(&buf[8..11], b"set");
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_set_roundtrip() {
        let buf = encode(OperationKind::Set, "set", b"user:1", Some(b"alice"), None).unwrap();
        let record = decode(&buf).unwrap();

        assert_eq!(record.kind, OperationKind::Set);
        assert_eq!(record.label, "set");
        assert_eq!(record.key, b"user:1");
        assert_eq!(record.value, b"alice");
        assert_eq!(record.subkey, b"");
        assert!(!record.has_subkey());
    }

    #[test]
    fn test_remove_with_subkey_roundtrip() {
        let buf = encode(OperationKind::Remove, "remove", b"parent", None, Some(b"child")).unwrap();
        let record = decode(&buf).unwrap();

        assert_eq!(record.kind, OperationKind::Remove);
        assert!(!record.has_value());
        assert_eq!(record.subkey, b"child");
    }

    #[test]
    fn test_decode_borrows_buffer() {
        let buf = encode(OperationKind::Append, "append", b"k", Some(b"tail"), None).unwrap();
        let record = decode(&buf).unwrap();
        let base = buf.as_ptr() as usize;
        let key_at = record.key.as_ptr() as usize;
        assert_eq!(key_at - base, HEADER_SIZE);
    }

    #[test]
    fn test_label_too_long_rejected() {
        let label = "x".repeat(LABEL_CAPACITY + 1);
        let result = encode(OperationKind::Set, &label, b"k", None, None);
        assert!(matches!(result, Err(RecordError::LabelTooLong { len: 17, .. })));
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let buf = encode(OperationKind::Set, "set", b"key", Some(b"value"), None).unwrap();
        assert_malformed(&buf[..HEADER_SIZE - 1]);
        assert_malformed(&buf[..buf.len() - 1]);
        assert_malformed(&[]);
    }

    #[test]
    fn test_span_past_end_rejected() {
        let mut buf = encode(OperationKind::Set, "set", b"key", Some(b"value"), None).unwrap();
        let len = buf.len() as u32;
        patch_span(&mut buf, VALUE_SPAN_AT, len - 2, 5);
        assert_malformed(&buf);
    }

    #[test]
    fn test_span_overflow_rejected() {
        let mut buf = encode(OperationKind::Set, "set", b"key", None, None).unwrap();
        patch_span(&mut buf, KEY_SPAN_AT, u32::MAX, u32::MAX);
        assert_malformed(&buf);
    }

    #[test]
    fn test_span_inside_header_rejected() {
        let mut buf = encode(OperationKind::Set, "set", b"key", None, None).unwrap();
        patch_span(&mut buf, KEY_SPAN_AT, 0, 3);
        assert_malformed(&buf);
    }

    #[test]
    fn test_aliased_spans_rejected() {
        let mut buf = encode(OperationKind::Set, "set", b"key", Some(b"value"), None).unwrap();
        patch_span(&mut buf, VALUE_SPAN_AT, HEADER_SIZE as u32 + 1, 3);
        assert_malformed(&buf);
    }

    #[test]
    fn test_absent_field_offset_ignored() {
        let mut buf = encode(OperationKind::Set, "set", b"key", Some(b"value"), None).unwrap();
        patch_span(&mut buf, SUBKEY_SPAN_AT, u32::MAX, 0);
        let record = decode(&buf).unwrap();
        assert_eq!(record.subkey, b"");
    }

    #[test]
    fn test_bad_magic_version_kind_rejected() {
        let buf = encode(OperationKind::Set, "set", b"k", None, None).unwrap();

        let mut bad = buf.clone();
        bad[0] = 0xFF;
        assert_malformed(&bad);

        let mut bad = buf.clone();
        bad[4] = RECORD_VERSION + 1;
        assert_malformed(&bad);

        let mut bad = buf.clone();
        bad[5] = 0;
        assert_malformed(&bad);

        let mut bad = buf;
        bad[6] = LABEL_CAPACITY as u8 + 1;
        assert_malformed(&bad);
    }

    #[test]
    fn test_kind_codes() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(OperationKind::from_code(0), None);
        assert!(!OperationKind::Remove.carries_value());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            code in 1u8..=5,
            key in proptest::collection::vec(any::<u8>(), 0..64),
            value in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
            subkey in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
        ) {
            let kind = OperationKind::from_code(code).unwrap();
            let buf =
                encode(kind, kind.label(), &key, value.as_deref(), subkey.as_deref()).unwrap();
            let record = decode(&buf).unwrap();

            prop_assert_eq!(record.kind, kind);
            prop_assert_eq!(record.key, &key[..]);
            prop_assert_eq!(record.value, value.as_deref().unwrap_or(&[]));
            prop_assert_eq!(record.subkey, subkey.as_deref().unwrap_or(&[]));
        }

        #[test]
        fn prop_truncation_always_rejected(
            key in proptest::collection::vec(any::<u8>(), 1..32),
            value in proptest::collection::vec(any::<u8>(), 1..32),
            cut in 1usize..64,
        ) {
            let buf = encode(OperationKind::Set, "set", &key, Some(&value), None).unwrap();
            let keep = buf.len().saturating_sub(cut);
            prop_assert!(decode(&buf[..keep]).is_err());
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(
            data in proptest::collection::vec(any::<u8>(), 0..128)
        ) {
            let _ = decode(&data);
        }
    }
}
