use crate::core::error::{Error, ErrorKind, Result};

/// Variable byte encoding: 7 data bits per byte, high bit set on every
/// byte except the last. Small deltas take one byte.
pub struct VByte;

impl VByte {
    #[inline]
    pub fn encode_u64(output: &mut Vec<u8>, mut value: u64) {
        while value >= 128 {
            output.push((value & 127) as u8 | 128);
            value >>= 7;
        }
        output.push(value as u8);
    }

    #[inline]
    pub fn encode_u32(output: &mut Vec<u8>, value: u32) {
        Self::encode_u64(output, value as u64)
    }

    /// Decodes one value, returning (value, bytes consumed).
    #[inline]
    pub fn decode_u64(input: &[u8]) -> Result<(u64, usize)> {
        let mut value = 0u64;
        let mut shift = 0;
        for (i, &byte) in input.iter().enumerate() {
            value |= ((byte & 127) as u64) << shift;
            if byte & 128 == 0 {
                return Ok((value, i + 1));
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::new(ErrorKind::Parse, "vbyte overflow".to_string()));
            }
        }
        Err(Error::new(ErrorKind::Parse, "incomplete vbyte".to_string()))
    }
}

/// Forward-only reader over an encoded stream.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        ByteCursor { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn read_vbyte(&mut self) -> Result<u64> {
        let rest = self.data.get(self.pos..).ok_or_else(|| {
            Error::new(ErrorKind::Parse, format!("offset {} past end of stream", self.pos))
        })?;
        let (value, used) = VByte::decode_u64(rest)?;
        self.pos += used;
        Ok(value)
    }

    #[inline]
    pub fn read_vbyte_u32(&mut self) -> Result<u32> {
        let value = self.read_vbyte()?;
        u32::try_from(value)
            .map_err(|_| Error::new(ErrorKind::Parse, format!("value {} overflows u32", value)))
    }
}

pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::new(ErrorKind::Parse, format!("truncated u32 at {}", offset)))
}

pub(crate) fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::new(ErrorKind::Parse, format!("truncated u64 at {}", offset)))
}
