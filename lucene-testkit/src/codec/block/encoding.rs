//! Variable-length integers, impacts lists and checksummed file framing

use std::hash::Hasher;
use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHasher;

use crate::error::{Error, Result};
use crate::index::Impact;

/// Write variable-length integer (1-10 bytes)
pub(crate) fn write_vint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            writer.write_u8(byte)?;
            return Ok(());
        } else {
            writer.write_u8(byte | 0x80)?;
        }
    }
}

pub(crate) fn write_impacts<W: Write>(writer: &mut W, impacts: &[Impact]) -> io::Result<()> {
    write_vint(writer, impacts.len() as u64)?;
    for impact in impacts {
        write_vint(writer, impact.freq as u64)?;
        write_vint(writer, impact.norm as u64)?;
    }
    Ok(())
}

/// Cursor over encoded bytes; every decoding failure is a corruption.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn read_vint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| Error::Corruption(format!("vint past end at {}", self.pos)))?;
            self.pos += 1;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::Corruption(format!("vint too long at {}", self.pos)));
            }
        }
    }

    /// Read a vint that must fit in `i32`.
    pub(crate) fn read_vint_i32(&mut self) -> Result<i32> {
        let value = self.read_vint()?;
        i32::try_from(value)
            .map_err(|_| Error::Corruption(format!("value {} overflows i32", value)))
    }

    pub(crate) fn read_vint_usize(&mut self) -> Result<usize> {
        let value = self.read_vint()?;
        usize::try_from(value)
            .map_err(|_| Error::Corruption(format!("value {} overflows usize", value)))
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::Corruption(format!(
                "{} bytes requested at {} but only {} remain",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = self.read_bytes(4)?;
        Ok(bytes.read_u32::<LittleEndian>()?)
    }

    pub(crate) fn read_impacts(&mut self) -> Result<Vec<Impact>> {
        let count = self.read_vint_usize()?;
        let mut impacts = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let freq = self.read_vint_i32()?;
            let norm = self.read_vint()? as i64;
            impacts.push(Impact::new(freq, norm));
        }
        Ok(impacts)
    }
}

fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Start a file body: magic then version.
pub(crate) fn write_header(buf: &mut Vec<u8>, magic: u32, version: u32) -> io::Result<()> {
    buf.write_u32::<LittleEndian>(magic)?;
    buf.write_u32::<LittleEndian>(version)
}

/// Append the checksum of everything written so far.
pub(crate) fn write_footer(buf: &mut Vec<u8>) -> io::Result<()> {
    let sum = checksum(buf);
    buf.write_u64::<LittleEndian>(sum)
}

/// Verify the footer checksum and return the body without it.
pub(crate) fn check_footer<'a>(name: &str, file: &'a [u8]) -> Result<&'a [u8]> {
    if file.len() < 16 {
        return Err(Error::Corruption(format!(
            "{} is truncated ({} bytes)",
            name,
            file.len()
        )));
    }
    let (body, mut footer) = file.split_at(file.len() - 8);
    let expected = footer.read_u64::<LittleEndian>()?;
    let actual = checksum(body);
    if expected != actual {
        return Err(Error::Corruption(format!(
            "{} checksum mismatch: expected {:016x}, got {:016x}",
            name, expected, actual
        )));
    }
    Ok(body)
}

/// Check magic and version at the start of a body, leaving the reader after them.
pub(crate) fn check_header(name: &str, reader: &mut ByteReader<'_>, magic: u32, version: u32) -> Result<()> {
    let found_magic = reader.read_u32()?;
    if found_magic != magic {
        return Err(Error::Corruption(format!(
            "{} has magic {:08x}, expected {:08x}",
            name, found_magic, magic
        )));
    }
    let found_version = reader.read_u32()?;
    if found_version != version {
        return Err(Error::Corruption(format!(
            "{} has unsupported version {}",
            name, found_version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vint_boundaries() {
        let values = [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX];
        let mut buf = Vec::new();
        for &v in &values {
            write_vint(&mut buf, v).unwrap();
        }
        let mut reader = ByteReader::new(&buf);
        for &v in &values {
            assert_eq!(reader.read_vint().unwrap(), v);
        }
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_vint().is_err());
    }

    #[test]
    fn test_truncated_vint_is_corruption() {
        let mut reader = ByteReader::new(&[0x80, 0x80]);
        assert!(matches!(reader.read_vint(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_footer_detects_flipped_byte() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0xABCD, 1).unwrap();
        buf.extend_from_slice(b"payload");
        write_footer(&mut buf).unwrap();

        let body = check_footer("f", &buf).unwrap();
        let mut reader = ByteReader::new(body);
        check_header("f", &mut reader, 0xABCD, 1).unwrap();
        assert_eq!(reader.read_bytes(7).unwrap(), b"payload");

        buf[9] ^= 0x01;
        assert!(check_footer("f", &buf).is_err());
    }
}
