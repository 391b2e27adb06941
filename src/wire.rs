//! Big-endian primitives shared by the notice codec and the number-set file format.
//!
//! Strings come in two flavours: `utf` fields carry a `u16` byte length and
//! refuse anything longer, `big text` fields carry an `i32` byte length for
//! payloads that may exceed that bound (message bodies).

use std::io::{Read, Write};

use crate::error::{InfinityError, Result};

pub const UTF_LIMIT: usize = u16::MAX as usize;

pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    writer.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<()> {
    writer.write_all(&[u8::from(value)])?;
    Ok(())
}

pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    match buf[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(InfinityError::corruption(format!("invalid boolean byte {other:#04x}"))),
    }
}

pub fn write_utf<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > UTF_LIMIT {
        return Err(InfinityError::IllegalArgument(format!(
            "string of {} bytes does not fit a utf field",
            bytes.len()
        )));
    }
    writer.write_all(&(bytes.len() as u16).to_be_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

pub fn read_utf<R: Read>(reader: &mut R) -> Result<String> {
    let mut len = [0u8; 2];
    reader.read_exact(&mut len)?;
    read_string(reader, u16::from_be_bytes(len) as usize)
}

pub fn write_big_text<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    let len = i32::try_from(text.len()).map_err(|_| {
        InfinityError::IllegalArgument(format!("text of {} bytes is too big", text.len()))
    })?;
    write_i32(writer, len)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

pub fn read_big_text<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_i32(reader)?;
    if len < 0 {
        return Err(InfinityError::corruption(format!("negative text length {len}")));
    }
    read_string(reader, len as usize)
}

fn read_string<R: Read>(reader: &mut R, len: usize) -> Result<String> {
    let mut bytes = Vec::new();
    reader.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(InfinityError::corruption(format!(
            "truncated string, expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    String::from_utf8(bytes)
        .map_err(|e| InfinityError::corruption(format!("invalid utf-8 in string: {e}")))
}
