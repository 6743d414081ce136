//! Binary Layout: fixed-width little-endian field descriptors
//!
//! Prinsip desain:
//! - Immutable: layouts are built once (mostly in `const` context) and shared
//! - Bounds-checked: every read checks the remaining length first
//! - Left-to-right: callers track a running offset, nothing seeks backwards
//!
//! Variable-length data sits between fixed blocks:
//! ┌──────────────┬───────────────┬──────────────┬─────────────────────┐
//! │ Layout block │ "text\0"      │ Layout block │ record record ... 0 │
//! └──────────────┴───────────────┴──────────────┴─────────────────────┘

use std::borrow::Cow;

use super::errors::{DecodeError, DecodeResult, LayoutError};

/// Primitive integer field. All multi-byte fields are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
}

impl Primitive {
    /// Parse a struct-style type code (`B` = u8, `h` = i16, ...)
    pub fn from_code(code: char) -> Result<Self, LayoutError> {
        match code {
            'B' => Ok(Self::U8),
            'b' => Ok(Self::I8),
            'H' => Ok(Self::U16),
            'h' => Ok(Self::I16),
            'I' => Ok(Self::U32),
            'i' => Ok(Self::I32),
            'Q' => Ok(Self::U64),
            'q' => Ok(Self::I64),
            other => Err(LayoutError::UnknownTypeCode(other)),
        }
    }

    /// Byte width of this primitive
    #[inline(always)]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
            Self::U64 | Self::I64 => 8,
        }
    }

    /// Decode from exactly `width()` bytes
    #[inline(always)]
    fn read(self, b: &[u8]) -> Scalar {
        let mut raw = [0u8; 8];
        raw[..b.len()].copy_from_slice(b);
        match self {
            Self::U8 => Scalar::Unsigned(u64::from(raw[0])),
            Self::I8 => Scalar::Signed(i64::from(raw[0] as i8)),
            Self::U16 => Scalar::Unsigned(u64::from(u16::from_le_bytes([raw[0], raw[1]]))),
            Self::I16 => Scalar::Signed(i64::from(i16::from_le_bytes([raw[0], raw[1]]))),
            Self::U32 => Scalar::Unsigned(u64::from(u32::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            Self::I32 => Scalar::Signed(i64::from(i32::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3],
            ]))),
            Self::U64 => Scalar::Unsigned(u64::from_le_bytes(raw)),
            Self::I64 => Scalar::Signed(i64::from_le_bytes(raw)),
        }
    }
}

/// One decoded integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Unsigned(u64),
    Signed(i64),
}

impl Scalar {
    /// Value as `u64`. Signed values are reinterpreted (two's complement).
    #[inline(always)]
    pub fn as_u64(self) -> u64 {
        match self {
            Self::Unsigned(v) => v,
            Self::Signed(v) => v as u64,
        }
    }

    /// Non-zero test, used for flags and continuation markers
    #[inline(always)]
    pub fn is_set(self) -> bool {
        self.as_u64() != 0
    }
}

/// Immutable descriptor of a contiguous run of fixed-width fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    fields: Cow<'static, [Primitive]>,
    size: usize,
}

impl Layout {
    /// Build a layout in `const` context
    pub const fn new(fields: &'static [Primitive]) -> Self {
        let mut size = 0;
        let mut i = 0;
        while i < fields.len() {
            size += fields[i].width();
            i += 1;
        }
        Self {
            fields: Cow::Borrowed(fields),
            size,
        }
    }

    /// Build a layout from a type-code string such as `"HHB"`
    pub fn create(codes: &str) -> Result<Self, LayoutError> {
        let fields = codes
            .chars()
            .map(Primitive::from_code)
            .collect::<Result<Vec<_>, _>>()?;
        let size = fields.iter().map(|f| f.width()).sum();
        Ok(Self {
            fields: Cow::Owned(fields),
            size,
        })
    }

    /// Total byte width
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of fields
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode `size()` bytes starting at `offset`.
    pub fn unpack(&self, bytes: &[u8], offset: usize) -> DecodeResult<Vec<Scalar>> {
        let block = take(bytes, offset, self.size)?;
        let mut pos = 0;
        let mut out = Vec::with_capacity(self.fields.len());
        for field in self.fields.iter() {
            let w = field.width();
            out.push(field.read(&block[pos..pos + w]));
            pos += w;
        }
        Ok(out)
    }

    /// Like [`unpack`](Self::unpack) but destructurable: `let [a, b] = l.unpack_n(..)?`
    pub fn unpack_n<const N: usize>(&self, bytes: &[u8], offset: usize) -> DecodeResult<[Scalar; N]> {
        if N != self.fields.len() {
            return Err(DecodeError::Arity {
                expected: N,
                actual: self.fields.len(),
            });
        }
        let values = self.unpack(bytes, offset)?;
        values.try_into().map_err(|v: Vec<Scalar>| DecodeError::Arity {
            expected: N,
            actual: v.len(),
        })
    }
}

/// Bounds-checked sub-slice
#[inline(always)]
fn take(bytes: &[u8], offset: usize, needed: usize) -> DecodeResult<&[u8]> {
    let available = bytes.len().saturating_sub(offset);
    if available < needed {
        return Err(DecodeError::Truncated {
            offset,
            needed,
            available,
        });
    }
    Ok(&bytes[offset..offset + needed])
}

/// Read a zero-terminated UTF-8 string at `offset`.
///
/// Returns the text and the offset just past the terminator.
pub fn unpack_str(bytes: &[u8], offset: usize) -> DecodeResult<(String, usize)> {
    let rest = bytes.get(offset..).unwrap_or(&[]);
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::Unterminated { offset })?;
    let text = std::str::from_utf8(&rest[..end]).map_err(|_| DecodeError::InvalidText { offset })?;
    Ok((text.to_owned(), offset + end + 1))
}

/// Read a sentinel-terminated list.
///
/// `head` is a single-field layout holding the first continuation flag. Each `record`
/// ends with the next continuation flag; the flag is stripped from the returned values.
/// Iteration stops on a zero flag, never on a count.
pub fn unpack_sentinel_list(
    bytes: &[u8],
    offset: usize,
    head: &Layout,
    record: &Layout,
) -> DecodeResult<(Vec<Vec<Scalar>>, usize)> {
    let [mut more] = head.unpack_n::<1>(bytes, offset)?;
    let mut pos = offset + head.size();
    let mut records = Vec::new();
    while more.is_set() {
        let mut values = record.unpack(bytes, pos)?;
        pos += record.size();
        more = values.pop().unwrap_or(Scalar::Unsigned(0));
        records.push(values);
    }
    Ok((records, pos))
}

/// Running cursor over one payload
///
/// Packet decoders consume fields strictly left-to-right through this.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buffer: &'a [u8],
    read_pos: usize,
}

impl<'a> PayloadReader<'a> {
    #[inline(always)]
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
        }
    }

    /// Decode one fixed block and advance by its size
    pub fn fixed<const N: usize>(&mut self, layout: &Layout) -> DecodeResult<[Scalar; N]> {
        let values = layout.unpack_n::<N>(self.buffer, self.read_pos)?;
        self.read_pos += layout.size();
        Ok(values)
    }

    /// Decode one zero-terminated string and advance past its terminator
    pub fn string(&mut self) -> DecodeResult<String> {
        let (text, next) = unpack_str(self.buffer, self.read_pos)?;
        self.read_pos = next;
        Ok(text)
    }

    /// Decode a sentinel-terminated list of `N`-field records and advance past
    /// its final flag. `record` must hold `N` fields plus the trailing flag.
    pub fn sentinel_list<const N: usize>(
        &mut self,
        head: &Layout,
        record: &Layout,
    ) -> DecodeResult<Vec<[Scalar; N]>> {
        let actual = record.len().saturating_sub(1);
        if actual != N {
            return Err(DecodeError::Arity {
                expected: N,
                actual,
            });
        }
        let (records, next) = unpack_sentinel_list(self.buffer, self.read_pos, head, record)?;
        self.read_pos = next;
        records
            .into_iter()
            .map(|values| {
                values.try_into().map_err(|v: Vec<Scalar>| DecodeError::Arity {
                    expected: N,
                    actual: v.len(),
                })
            })
            .collect()
    }

    /// Current offset into the payload
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.read_pos
    }

    /// Remaining bytes
    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HHB: Layout = Layout::new(&[Primitive::U16, Primitive::U16, Primitive::U8]);

    #[test]
    fn test_size_is_sum_of_widths() {
        assert_eq!(HHB.size(), 5);
        assert_eq!(Layout::create("BQQQH").unwrap().size(), 27);
        assert_eq!(Layout::create("").unwrap().size(), 0);
    }

    #[test]
    fn test_create_matches_const() {
        assert_eq!(Layout::create("HHB").unwrap().unpack(&[1, 0, 2, 0, 3], 0), HHB.unpack(&[1, 0, 2, 0, 3], 0));
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(Layout::create("HxB"), Err(LayoutError::UnknownTypeCode('x')));
    }

    #[test]
    fn test_unpack_little_endian_at_offset() {
        let bytes = [0xFF, 0x34, 0x12, 0x78, 0x56, 0x09];
        let [a, b, c] = HHB.unpack_n::<3>(&bytes, 1).unwrap();
        assert_eq!(a, Scalar::Unsigned(0x1234));
        assert_eq!(b, Scalar::Unsigned(0x5678));
        assert_eq!(c, Scalar::Unsigned(9));
    }

    #[test]
    fn test_unpack_signed() {
        let layout = Layout::create("bhiq").unwrap();
        let mut bytes = vec![0xFF];
        bytes.extend_from_slice(&(-2i16).to_le_bytes());
        bytes.extend_from_slice(&(-3i32).to_le_bytes());
        bytes.extend_from_slice(&(-4i64).to_le_bytes());
        let values = layout.unpack(&bytes, 0).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Signed(-1),
                Scalar::Signed(-2),
                Scalar::Signed(-3),
                Scalar::Signed(-4)
            ]
        );
    }

    #[test]
    fn test_unpack_truncated() {
        let err = HHB.unpack(&[1, 0, 2, 0], 0).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 0,
                needed: 5,
                available: 4
            }
        );
        // Offset past the end is still a clean error
        assert!(HHB.unpack(&[1, 2], 10).is_err());
    }

    #[test]
    fn test_unpack_n_arity_mismatch() {
        let err = HHB.unpack_n::<2>(&[0; 5], 0).unwrap_err();
        assert_eq!(err, DecodeError::Arity { expected: 2, actual: 3 });
    }

    #[test]
    fn test_unpack_str() {
        let (text, next) = unpack_str(b"hello\x00world", 0).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(next, 6);
    }

    #[test]
    fn test_unpack_str_empty_and_offset() {
        let (text, next) = unpack_str(b"ab\x00\x00", 3).unwrap();
        assert_eq!(text, "");
        assert_eq!(next, 4);
    }

    #[test]
    fn test_unpack_str_unterminated() {
        assert_eq!(
            unpack_str(b"hello", 0),
            Err(DecodeError::Unterminated { offset: 0 })
        );
        assert_eq!(
            unpack_str(b"a\x00", 2),
            Err(DecodeError::Unterminated { offset: 2 })
        );
    }

    #[test]
    fn test_unpack_str_multibyte_offset() {
        let (text, next) = unpack_str("Zürich\0x".as_bytes(), 0).unwrap();
        assert_eq!(text, "Zürich");
        assert_eq!(next, 8);
    }

    #[test]
    fn test_sentinel_list() {
        let head = Layout::new(&[Primitive::U8]);
        let bytes = [1, 5, 0, 42, 0, 1, 7, 0, 8, 0, 0, 0xEE];
        let (records, next) = unpack_sentinel_list(&bytes, 0, &head, &HHB).unwrap();
        assert_eq!(
            records,
            vec![
                vec![Scalar::Unsigned(5), Scalar::Unsigned(42)],
                vec![Scalar::Unsigned(7), Scalar::Unsigned(8)]
            ]
        );
        assert_eq!(next, 11);
    }

    #[test]
    fn test_sentinel_list_missing_terminator_is_error() {
        let head = Layout::new(&[Primitive::U8]);
        // Continuation says "more" but the record is cut short
        let bytes = [1, 5, 0, 42];
        assert!(matches!(
            unpack_sentinel_list(&bytes, 0, &head, &HHB),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_reader_sentinel_list_fixed_arity() {
        let head = Layout::new(&[Primitive::U8]);
        let bytes = [0xAA, 1, 5, 0, 42, 0, 0, 0xEE];
        let mut reader = PayloadReader::new(&bytes);
        reader.fixed::<1>(&head).unwrap();
        let records = reader.sentinel_list::<2>(&head, &HHB).unwrap();
        assert_eq!(records, vec![[Scalar::Unsigned(5), Scalar::Unsigned(42)]]);
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_reader_sentinel_list_wrong_arity_is_error() {
        let head = Layout::new(&[Primitive::U8]);
        let bytes = [1, 5, 0, 42, 0, 0];
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(
            reader.sentinel_list::<3>(&head, &HHB),
            Err(DecodeError::Arity {
                expected: 3,
                actual: 2
            })
        );
        // Nothing consumed on a layout mismatch
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_reader_tracks_offset() {
        let mut reader = PayloadReader::new(b"\x07ab\x00\x01\x00");
        let [v] = reader.fixed::<1>(&Layout::new(&[Primitive::U8])).unwrap();
        assert_eq!(v, Scalar::Unsigned(7));
        assert_eq!(reader.string().unwrap(), "ab");
        assert_eq!(reader.position(), 4);
        let [w] = reader.fixed::<1>(&Layout::new(&[Primitive::U16])).unwrap();
        assert_eq!(w.as_u64(), 1);
        assert_eq!(reader.remaining(), 0);
    }

    proptest! {
        #[test]
        fn test_unpack_str_stops_at_first_zero(prefix in "[a-zA-Z0-9 ]{0,32}", tail in proptest::collection::vec(any::<u8>(), 0..16)) {
            let mut bytes = prefix.as_bytes().to_vec();
            bytes.push(0);
            bytes.extend_from_slice(&tail);
            let (text, next) = unpack_str(&bytes, 0).unwrap();
            prop_assert_eq!(&text, &prefix);
            prop_assert_eq!(next, prefix.len() + 1);
        }

        #[test]
        fn test_unpack_never_reads_past_end(bytes in proptest::collection::vec(any::<u8>(), 0..12), offset in 0usize..16) {
            let layout = Layout::create("BHI").unwrap();
            let result = layout.unpack(&bytes, offset);
            prop_assert_eq!(result.is_ok(), offset + layout.size() <= bytes.len());
        }
    }
}
