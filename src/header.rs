//! Member header and trailer — parsing, field access, validation.
//!
//! A member is `header (6 B) | LZMA stream | trailer (20 B)`.  The header
//! carries the magic, a version byte and the dictionary-size descriptor.
//! The trailer carries the CRC32 of the uncompressed data, the uncompressed
//! size and the total member size, all little-endian.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::RescueError;

pub const MAGIC: [u8; 4] = *b"LZIP";
pub const HEADER_SIZE: usize = 6;
pub const TRAILER_SIZE: usize = 20;
pub const MIN_DICTIONARY_SIZE: u32 = 1 << 12;
pub const MAX_DICTIONARY_SIZE: u32 = 1 << 29;
/// Header + smallest possible LZMA stream (10 B) + trailer.
pub const MIN_MEMBER_SIZE: u64 = 36;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    data: [u8; HEADER_SIZE],
}

impl Header {
    pub fn from_bytes(data: [u8; HEADER_SIZE]) -> Self {
        Header { data }
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut data = [0u8; HEADER_SIZE];
        reader.read_exact(&mut data)?;
        Ok(Header { data })
    }

    pub fn magic_ok(&self) -> bool {
        self.data[0..4] == MAGIC
    }

    pub fn version(&self) -> u8 {
        self.data[4]
    }

    /// Decoded dictionary size: bits 4..0 of the descriptor hold the base-2
    /// logarithm of the base size, bits 7..5 the sixteenths to subtract.
    pub fn dictionary_size(&self) -> u32 {
        let mut size = 1u32 << (self.data[5] & 0x1F);
        if size > MIN_DICTIONARY_SIZE {
            size -= (size / 16) * u32::from(self.data[5] >> 5);
        }
        size
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Trailer {
    data: [u8; TRAILER_SIZE],
}

impl Trailer {
    pub fn from_bytes(data: [u8; TRAILER_SIZE]) -> Self {
        Trailer { data }
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut data = [0u8; TRAILER_SIZE];
        reader.read_exact(&mut data)?;
        Ok(Trailer { data })
    }

    /// CRC32 of the uncompressed data.
    pub fn data_crc(&self) -> u32 {
        LittleEndian::read_u32(&self.data[0..4])
    }

    /// Size of the uncompressed data.
    pub fn data_size(&self) -> u64 {
        LittleEndian::read_u64(&self.data[4..12])
    }

    /// Total member size including header and trailer.
    pub fn member_size(&self) -> u64 {
        LittleEndian::read_u64(&self.data[12..20])
    }
}

pub fn verify_header(header: &Header) -> Result<(), RescueError> {
    if !header.magic_ok() {
        return Err(RescueError::BadMagic);
    }
    match header.version() {
        1 => {}
        0 => return Err(RescueError::Version0),
        v => return Err(RescueError::UnsupportedVersion(v)),
    }
    let dict_size = header.dictionary_size();
    if !(MIN_DICTIONARY_SIZE..=MAX_DICTIONARY_SIZE).contains(&dict_size) {
        return Err(RescueError::BadDictionarySize);
    }
    Ok(())
}

/// Check that `file` looks like exactly one member: valid header at offset 0
/// and a trailer whose member size equals the file size.  When the trailer
/// declares a smaller member and a valid header sits at the implied boundary,
/// the file is reported as multi-member instead of merely corrupt.
pub fn verify_single_member(file: &mut File, file_size: u64) -> Result<(), RescueError> {
    file.seek(SeekFrom::Start(0))
        .map_err(RescueError::io("error reading member header"))?;
    let header = Header::read(file).map_err(RescueError::io("error reading member header"))?;
    verify_header(&header)?;

    file.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))
        .map_err(RescueError::io("error reading member trailer"))?;
    let trailer = Trailer::read(file).map_err(RescueError::io("error reading member trailer"))?;
    let member_size = trailer.member_size();
    if member_size != file_size {
        if member_size < file_size
            && file.seek(SeekFrom::End(-(member_size as i64))).is_ok()
        {
            if let Ok(inner) = Header::read(file) {
                if verify_header(&inner).is_ok() {
                    return Err(RescueError::MultiMember);
                }
            }
        }
        return Err(RescueError::BadTrailerSize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(bytes: [u8; 6]) -> Header {
        Header::from_bytes(bytes)
    }

    #[test]
    fn dictionary_size_decoding() {
        // 2^12, no fraction
        assert_eq!(header(*b"LZIP\x01\x0C").dictionary_size(), 4 * 1024);
        // 2^19 - 6 * 2^15 = 320 KiB
        assert_eq!(header([0x4C, 0x5A, 0x49, 0x50, 1, 0xD3]).dictionary_size(), 320 * 1024);
        // 2^29, no fraction
        assert_eq!(header([0x4C, 0x5A, 0x49, 0x50, 1, 0x1D]).dictionary_size(), 512 * 1024 * 1024);
    }

    #[test]
    fn dictionary_size_bounds_enforced() {
        // base log2 of 11 decodes below the minimum
        let h = header([0x4C, 0x5A, 0x49, 0x50, 1, 0x0B]);
        assert!(matches!(verify_header(&h), Err(RescueError::BadDictionarySize)));
        // base log2 of 30 decodes above the maximum
        let h = header([0x4C, 0x5A, 0x49, 0x50, 1, 0x1E]);
        assert!(matches!(verify_header(&h), Err(RescueError::BadDictionarySize)));
    }

    #[test]
    fn version_rejection_is_distinct() {
        let h = header(*b"LZIP\x00\x0C");
        assert!(matches!(verify_header(&h), Err(RescueError::Version0)));
        let h = header(*b"LZIP\x02\x0C");
        assert!(matches!(verify_header(&h), Err(RescueError::UnsupportedVersion(2))));
        let h = header(*b"LZIX\x01\x0C");
        assert!(matches!(verify_header(&h), Err(RescueError::BadMagic)));
        assert!(verify_header(&header(*b"LZIP\x01\x0C")).is_ok());
    }

    #[test]
    fn trailer_fields_are_little_endian() {
        let mut data = [0u8; TRAILER_SIZE];
        data[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data[4..12].copy_from_slice(&1234u64.to_le_bytes());
        data[12..20].copy_from_slice(&36u64.to_le_bytes());
        let t = Trailer::from_bytes(data);
        assert_eq!(t.data_crc(), 0xDEAD_BEEF);
        assert_eq!(t.data_size(), 1234);
        assert_eq!(t.member_size(), 36);
    }
}
