use std::io::{self, Read, Write};

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a single byte
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Write a slice of i32s back to back in little-endian format
pub fn write_i32s_le<W: Write>(writer: &mut W, values: &[i32]) -> io::Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Decode little-endian i32s from a byte slice whose length is a multiple of 4
pub fn decode_i32s_le(buf: &[u8]) -> Option<Vec<i32>> {
    if buf.len() % 4 != 0 {
        return None;
    }
    Some(
        buf.chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Decode a little-endian i32 from exactly 4 bytes
pub fn decode_i32_le(buf: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = buf.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

/// Decode a little-endian f64 from exactly 8 bytes
pub fn decode_f64_le(buf: &[u8]) -> Option<f64> {
    let bytes: [u8; 8] = buf.try_into().ok()?;
    Some(f64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_i32s_roundtrip() {
        let values = [0, -1, 42, i32::MIN, i32::MAX];
        let mut buf = Vec::new();
        write_i32s_le(&mut buf, &values).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(decode_i32s_le(&buf).unwrap(), values);
    }

    #[test]
    fn test_decode_rejects_ragged_input() {
        assert!(decode_i32s_le(&[1, 2, 3]).is_none());
        assert!(decode_i32_le(&[1, 2]).is_none());
        assert!(decode_f64_le(&[0; 7]).is_none());
    }

    #[test]
    fn test_u32_and_u8() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 0xDEAD_BEEF).unwrap();
        buf.push(9);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u8(&mut cursor).unwrap(), 9);
        assert!(read_u8(&mut cursor).is_err());
    }
}
