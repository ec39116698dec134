//! On-disk format constants and primitive codecs
//!
//! Every file starts with an ASCII version header followed by the payload.
//! All integers in the payload are little-endian.
//!
//! - strings: u32 byte length + UTF-8 bytes
//! - sequences: u32 element count + elements
//! - enums and bitflags: their `repr` width

/// Rules list format version. Bump on any incompatible change.
pub const RULES_LIST_FORMAT_VERSION: u32 = 1;

/// Rules index format version. Bump on any incompatible change.
pub const RULES_INDEX_FORMAT_VERSION: u32 = 1;

/// Prefix shared by every version header.
pub const VERSION_HEADER_PREFIX: &str = "---------Version=";

/// Name of the compiled index file inside a rules directory.
pub const INDEX_FILE_NAME: &str = "Index";

/// Build the version header string for a format version.
pub fn version_header(version: u32) -> String {
    format!("{VERSION_HEADER_PREFIX}{version}")
}

/// Header of a rules list file.
pub fn rules_list_header() -> String {
    version_header(RULES_LIST_FORMAT_VERSION)
}

/// Header of a rules index file.
pub fn rules_index_header() -> String {
    version_header(RULES_INDEX_FORMAT_VERSION)
}

/// Error type for decoding stored buffers.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Version header mismatch (expected {expected:?})")]
    HeaderMismatch { expected: String },
    #[error("Checksum mismatch: expected={expected}, computed={computed}")]
    ChecksumMismatch { expected: String, computed: String },
    #[error("Data too short at offset {0}")]
    DataTooShort(usize),
    #[error("Invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidString(usize),
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Strip `header` from `data`, returning the payload.
pub fn strip_header<'a>(data: &'a [u8], header: &str) -> Result<&'a [u8], FormatError> {
    data.strip_prefix(header.as_bytes())
        .ok_or_else(|| FormatError::HeaderMismatch {
            expected: header.to_string(),
        })
}

/// Prepend `header` to a payload.
pub fn with_header(header: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

// =============================================================================
// Writer
// =============================================================================

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn bool(&mut self, value: bool) {
        self.data.push(value as u8);
    }

    pub fn u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length prefix. Lengths never exceed `u32::MAX` in practice;
    /// the cast saturates rather than wraps.
    pub fn count(&mut self, count: usize) {
        self.u32(u32::try_from(count).unwrap_or(u32::MAX));
    }

    pub fn str(&mut self, value: &str) {
        self.count(value.len());
        self.data.extend_from_slice(value.as_bytes());
    }

    pub fn strings<S: AsRef<str>>(&mut self, values: &[S]) {
        self.count(values.len());
        for value in values {
            self.str(value.as_ref());
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Bounds-checked little-endian reader.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(FormatError::DataTooShort(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, FormatError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FormatError::InvalidValue {
                field: "bool",
                value: other as u32,
            }),
        }
    }

    pub fn u16(&mut self) -> Result<u16, FormatError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, FormatError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, FormatError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a length prefix, rejecting counts that cannot fit in the
    /// remaining bytes (each element takes at least `min_element_size`).
    pub fn count(&mut self, min_element_size: usize) -> Result<usize, FormatError> {
        let at = self.pos;
        let len = self.u32()? as usize;
        if len.saturating_mul(min_element_size.max(1)) > self.remaining() {
            return Err(FormatError::DataTooShort(at));
        }
        Ok(len)
    }

    pub fn string(&mut self) -> Result<String, FormatError> {
        let at = self.pos;
        let len = self.count(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| FormatError::InvalidString(at))
    }

    pub fn strings(&mut self) -> Result<Vec<String>, FormatError> {
        let count = self.count(4)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.string()?);
        }
        Ok(values)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> Result<(), FormatError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FormatError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_header() {
        assert_eq!(version_header(7), "---------Version=7");
    }

    #[test]
    fn test_strip_header() {
        let data = with_header("---------Version=1", b"abc");
        assert_eq!(strip_header(&data, "---------Version=1").unwrap(), b"abc");
        assert!(matches!(
            strip_header(&data, "---------Version=2"),
            Err(FormatError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_reader_bounds() {
        let mut reader = ByteReader::new(&[1, 0]);
        assert!(reader.u32().is_err());
        let mut reader = ByteReader::new(&[0xff, 0xff, 0xff, 0x7f]);
        // Claims a huge string with no bytes behind it
        assert!(reader.string().is_err());
    }

    #[test]
    fn test_reader_rejects_bad_bool() {
        let mut reader = ByteReader::new(&[2]);
        assert!(reader.bool().is_err());
    }

    #[test]
    fn test_writer_reader_values() {
        let mut writer = ByteWriter::new();
        writer.u8(3);
        writer.u16(0x1234);
        writer.u64(42);
        writer.strings(&["a", "bc"]);
        let data = writer.finish();

        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u8().unwrap(), 3);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.u64().unwrap(), 42);
        assert_eq!(reader.strings().unwrap(), vec!["a".to_string(), "bc".to_string()]);
        assert!(reader.finish().is_ok());
    }
}
