//! Primitive wire encoding shared by [`crate::writer`] and [`crate::reader`].
//!
//! Every multi-byte integer is big-endian. This format is one fixed linear
//! sequence whose later sections depend on state built by earlier ones (the
//! frequent-attribute table must exist before an attribute name can be
//! decoded), so a cursor that tracks position and a handful of per-primitive
//! helper functions fits better than composed parser combinators over
//! independently-ordered records.

use std::convert::TryInto;
use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::FormatError;

pub const MAGIC: u64 = 0x0000_0000_0754_D441;

/// A read cursor over an immutably borrowed byte slice (typically a mapped
/// snapshot file). All positions are absolute offsets from the start of the
/// slice, so several cursors may be created over the same buffer to resolve
/// lazily-decoded sections from multiple call sites without interfering with
/// each other.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Cursor { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn require(&self, needed: usize) -> Result<(), FormatError> {
        if self.pos + needed > self.buf.len() {
            Err(FormatError::Truncated {
                offset: self.pos,
                needed,
            })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bool(&mut self) -> Result<bool, FormatError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        self.require(2)?;
        let v = (&self.buf[self.pos..self.pos + 2])
            .read_u16::<BigEndian>()
            .expect("length checked above");
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        self.require(2)?;
        let v = (&self.buf[self.pos..self.pos + 2])
            .read_i16::<BigEndian>()
            .expect("length checked above");
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        self.require(4)?;
        let v = (&self.buf[self.pos..self.pos + 4])
            .read_u32::<BigEndian>()
            .expect("length checked above");
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        self.require(8)?;
        let v = (&self.buf[self.pos..self.pos + 8])
            .read_u64::<BigEndian>()
            .expect("length checked above");
        self.pos += 8;
        Ok(v)
    }

    pub fn read_long_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_u16()? as usize;
        self.require(len)?;
        let start = self.pos;
        let bytes = &self.buf[start..start + len];
        self.pos += len;
        std::str::from_utf8(bytes)
            .map(|s| s.to_owned())
            .map_err(|_| FormatError::InvalidUtf8 { offset: start })
    }

    /// Decodes a short-or-indexed string: a non-negative value is an inline
    /// length, a negative value `k` is frequent-attribute index `-k - 1`.
    pub fn read_short_or_indexed_string(
        &mut self,
        frequent_attrs: &[String],
    ) -> Result<String, FormatError> {
        let k = self.read_i16()?;
        if k >= 0 {
            let len = k as usize;
            self.require(len)?;
            let start = self.pos;
            let bytes = &self.buf[start..start + len];
            self.pos += len;
            std::str::from_utf8(bytes)
                .map(|s| s.to_owned())
                .map_err(|_| FormatError::InvalidUtf8 { offset: start })
        } else {
            let index = (-(k as i64) - 1) as usize;
            frequent_attrs
                .get(index)
                .cloned()
                .ok_or(FormatError::FrequentAttrOutOfRange {
                    index: -(k as i64) - 1,
                    table_len: frequent_attrs.len(),
                })
        }
    }

    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        self.require(n)?;
        self.pos += n;
        Ok(())
    }
}

/// Write-side helpers over any `Write + Seek`, used by
/// [`crate::writer::SnapshotWriter`]. Kept separate from `Cursor` because the
/// writer streams forward and only ever seeks backward transiently to close
/// a mark.
pub struct Mark(u64);

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_u8(v)
}

pub fn write_bool<W: Write>(w: &mut W, v: bool) -> io::Result<()> {
    w.write_u8(if v { 1 } else { 0 })
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_u16::<BigEndian>(v)
}

pub fn write_i16<W: Write>(w: &mut W, v: i16) -> io::Result<()> {
    w.write_i16::<BigEndian>(v)
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32::<BigEndian>(v)
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_u64::<BigEndian>(v)
}

pub fn write_long_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize, "long string too long");
    write_u16(w, bytes.len().try_into().unwrap_or(u16::MAX))?;
    w.write_all(bytes)
}

/// Encodes `name` as a short inline string, or as a negative frequent-attr
/// index if it is present in `frequent_attrs`.
pub fn write_short_or_indexed_string<W: Write>(
    w: &mut W,
    name: &str,
    frequent_index: Option<usize>,
) -> io::Result<()> {
    match frequent_index {
        Some(idx) => write_i16(w, -(idx as i64 + 1) as i16),
        None => {
            let bytes = name.as_bytes();
            debug_assert!(bytes.len() <= i16::MAX as usize, "attr name too long");
            write_i16(w, bytes.len() as i16)?;
            w.write_all(bytes)
        }
    }
}

/// Reserves four zero bytes for a `u32` to be filled in later and returns a
/// token that can be passed to [`close_u32_mark`].
pub fn reserve_u32_mark<W: Write + Seek>(w: &mut W) -> io::Result<Mark> {
    let offset = w.stream_position()?;
    write_u32(w, 0)?;
    Ok(Mark(offset))
}

/// Seeks back to a previously reserved mark, writes `value`, and returns the
/// stream to where it was (the end of the stream, by construction, since the
/// writer never seeks anywhere else).
pub fn close_u32_mark<W: Write + Seek>(w: &mut W, mark: Mark, value: u32) -> io::Result<()> {
    let resume = w.stream_position()?;
    w.seek(SeekFrom::Start(mark.0))?;
    write_u32(w, value)?;
    w.seek(SeekFrom::Start(resume))?;
    Ok(())
}
