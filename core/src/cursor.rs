// Bounded byte window with typed field extraction

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::error::ProbeError;
use crate::source::ByteSource;

/// Bounded, read-only view over a byte range with typed field extraction at
/// arbitrary offsets.
///
/// Every caller computes offsets from header fields that were validated
/// before use, so an out-of-range access is a broken invariant, not a
/// recoverable condition: accessors panic instead of silently truncating.
/// Acquiring the window itself (`load`) can fail and returns a `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCursor {
    data: Vec<u8>,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Read a `length`-byte window at `offset` from `source`. For file
    /// sources the file is opened, read and closed before returning.
    pub fn load(source: &ByteSource, offset: u64, length: usize) -> Result<Self, ProbeError> {
        Ok(Self {
            data: source.read_at(offset, length)?,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn field(&self, offset: usize, length: usize) -> &[u8] {
        let end = offset.checked_add(length);
        assert!(
            end.is_some_and(|end| end <= self.data.len()),
            "cursor read of {} bytes at offset {} beyond window of {}",
            length,
            offset,
            self.data.len()
        );
        &self.data[offset..offset + length]
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        self.field(offset, 1)[0]
    }

    pub fn get_i8(&self, offset: usize) -> i8 {
        self.field(offset, 1)[0] as i8
    }

    pub fn get_u16_le(&self, offset: usize) -> u16 {
        LittleEndian::read_u16(self.field(offset, 2))
    }

    pub fn get_u16_be(&self, offset: usize) -> u16 {
        BigEndian::read_u16(self.field(offset, 2))
    }

    pub fn get_i16_le(&self, offset: usize) -> i16 {
        LittleEndian::read_i16(self.field(offset, 2))
    }

    pub fn get_i16_be(&self, offset: usize) -> i16 {
        BigEndian::read_i16(self.field(offset, 2))
    }

    pub fn get_u32_le(&self, offset: usize) -> u32 {
        LittleEndian::read_u32(self.field(offset, 4))
    }

    pub fn get_u32_be(&self, offset: usize) -> u32 {
        BigEndian::read_u32(self.field(offset, 4))
    }

    pub fn get_i32_le(&self, offset: usize) -> i32 {
        LittleEndian::read_i32(self.field(offset, 4))
    }

    pub fn get_i32_be(&self, offset: usize) -> i32 {
        BigEndian::read_i32(self.field(offset, 4))
    }

    pub fn get_u64_le(&self, offset: usize) -> u64 {
        LittleEndian::read_u64(self.field(offset, 8))
    }

    pub fn get_u64_be(&self, offset: usize) -> u64 {
        BigEndian::read_u64(self.field(offset, 8))
    }

    pub fn get_i64_le(&self, offset: usize) -> i64 {
        LittleEndian::read_i64(self.field(offset, 8))
    }

    pub fn get_i64_be(&self, offset: usize) -> i64 {
        BigEndian::read_i64(self.field(offset, 8))
    }

    /// Fixed-length byte string at `offset`.
    pub fn get_bytes(&self, offset: usize, length: usize) -> &[u8] {
        self.field(offset, length)
    }

    /// UTF-16LE string of `units` code units at `offset`. Invalid surrogate
    /// sequences are replaced rather than rejected.
    pub fn get_utf16_le(&self, offset: usize, units: usize) -> String {
        let raw = self.field(offset, units * 2);
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }

    /// 16-byte GUID in on-disk little-endian ("mixed") byte order.
    pub fn get_uuid_le(&self, offset: usize) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(self.field(offset, 16));
        Uuid::from_bytes_le(bytes)
    }

    /// 16-byte UUID in big-endian (RFC 4122) byte order.
    pub fn get_uuid_be(&self, offset: usize) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(self.field(offset, 16));
        Uuid::from_bytes(bytes)
    }

    /// Sub-window copy of `length` bytes at `offset`.
    pub fn chunk(&self, offset: usize, length: usize) -> ByteCursor {
        ByteCursor::new(self.field(offset, length).to_vec())
    }

    /// Write a sub-range of the window to `sink`.
    pub fn export<W: Write>(
        &self,
        offset: usize,
        length: usize,
        sink: &mut W,
    ) -> Result<(), ProbeError> {
        sink.write_all(self.field(offset, length))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ByteCursor {
        ByteCursor::new(vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF, 0xFE, 0x41, 0x00, 0x42, 0x00,
            0x00, 0x00,
        ])
    }

    #[test]
    fn integer_reads_in_both_endiannesses() {
        let cursor = sample();
        assert_eq!(cursor.get_u8(0), 0x01);
        assert_eq!(cursor.get_u16_le(0), 0x0201);
        assert_eq!(cursor.get_u16_be(0), 0x0102);
        assert_eq!(cursor.get_u32_le(0), 0x0403_0201);
        assert_eq!(cursor.get_u32_be(0), 0x0102_0304);
        assert_eq!(cursor.get_u64_le(0), 0x0807_0605_0403_0201);
        assert_eq!(cursor.get_i8(8), -1);
        assert_eq!(cursor.get_i16_le(8), -257);
    }

    #[test]
    fn signed_byte_reads_match_twos_complement() {
        let cursor = ByteCursor::new(vec![0xF6]);
        assert_eq!(cursor.get_i8(0), -10);
    }

    #[test]
    fn utf16_and_byte_strings() {
        let cursor = sample();
        assert_eq!(cursor.get_bytes(10, 2), &[0x41, 0x00]);
        assert_eq!(cursor.get_utf16_le(10, 2), "AB");
    }

    #[test]
    fn uuid_byte_orders_differ() {
        let text = "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7";
        let expected = Uuid::parse_str(text).unwrap();
        let cursor = ByteCursor::new(expected.to_bytes_le().to_vec());
        assert_eq!(cursor.get_uuid_le(0), expected);
        assert_ne!(cursor.get_uuid_be(0), expected);

        let cursor = ByteCursor::new(expected.into_bytes().to_vec());
        assert_eq!(cursor.get_uuid_be(0), expected);
    }

    #[test]
    fn chunk_is_an_independent_window() {
        let cursor = sample();
        let chunk = cursor.chunk(4, 4);
        assert_eq!(chunk.size(), 4);
        assert_eq!(chunk.get_u32_le(0), 0x0807_0605);
    }

    #[test]
    fn export_writes_subrange_to_sink() {
        let cursor = sample();
        let mut sink = Vec::new();
        cursor.export(2, 4, &mut sink).unwrap();
        assert_eq!(sink, vec![0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn load_from_source_window() {
        let source = ByteSource::buffer((0u8..32).collect());
        let cursor = ByteCursor::load(&source, 8, 4).unwrap();
        assert_eq!(cursor.data(), &[8, 9, 10, 11]);
    }

    #[test]
    #[should_panic(expected = "beyond window")]
    fn out_of_range_read_panics() {
        sample().get_u32_le(14);
    }
}
