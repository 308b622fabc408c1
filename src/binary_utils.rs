use std::io::{self, Cursor, Read, Seek, SeekFrom};

pub fn read_i32_le(cursor: &mut Cursor<&[u8]>) -> io::Result<i32> {
    if cursor.position() + 3 >= cursor.get_ref().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "End of buffer reached or not enough bytes for i32",
        ));
    }

    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn read_u32_le(cursor: &mut Cursor<&[u8]>) -> io::Result<u32> {
    if cursor.position() + 3 >= cursor.get_ref().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "End of buffer reached or not enough bytes for u32",
        ));
    }

    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u16_le(cursor: &mut Cursor<&[u8]>) -> io::Result<u16> {
    if cursor.position() + 1 >= cursor.get_ref().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "End of buffer reached or not enough bytes for u16",
        ));
    }

    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn seek_to(cursor: &mut Cursor<&[u8]>, position: u64) -> io::Result<()> {
    if position > cursor.get_ref().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Cannot seek to position {} (buffer length: {})",
                position,
                cursor.get_ref().len()
            ),
        ));
    }

    cursor.seek(SeekFrom::Start(position))?;
    Ok(())
}

pub fn read_bytes(cursor: &mut Cursor<&[u8]>, length: usize) -> io::Result<Vec<u8>> {
    if cursor.position() + (length as u64) > cursor.get_ref().len() as u64 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Not enough bytes remaining for read_bytes({})", length),
        ));
    }

    let mut buffer = vec![0u8; length];
    cursor.read_exact(&mut buffer)?;
    Ok(buffer)
}

pub fn remaining(cursor: &Cursor<&[u8]>) -> u64 {
    (cursor.get_ref().len() as u64).saturating_sub(cursor.position())
}

/// Writes `bytes` at `pos`, failing instead of growing the buffer.
pub fn write_bytes(data: &mut [u8], bytes: &[u8], pos: usize) -> io::Result<()> {
    let end = pos.checked_add(bytes.len()).filter(|&end| end <= data.len());
    match end {
        Some(end) => {
            data[pos..end].copy_from_slice(bytes);
            Ok(())
        }
        None => Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!(
                "Cannot write {} bytes at position {} (buffer length: {})",
                bytes.len(),
                pos,
                data.len()
            ),
        )),
    }
}

pub fn write_i32_le(data: &mut [u8], value: i32, pos: usize) -> io::Result<()> {
    write_bytes(data, &value.to_le_bytes(), pos)
}

pub fn write_u32_le(data: &mut [u8], value: u32, pos: usize) -> io::Result<()> {
    write_bytes(data, &value.to_le_bytes(), pos)
}

pub fn write_u16_le(data: &mut [u8], value: u16, pos: usize) -> io::Result<()> {
    write_bytes(data, &value.to_le_bytes(), pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_stop_at_end_of_buffer() {
        let data = [1u8, 0, 0, 0, 2, 0];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_i32_le(&mut cursor).unwrap(), 1);
        assert!(read_i32_le(&mut cursor).is_err());
        assert_eq!(read_u16_le(&mut cursor).unwrap(), 2);
        assert_eq!(remaining(&cursor), 0);
        assert!(seek_to(&mut cursor, 7).is_err());
    }

    #[test]
    fn test_writes_do_not_grow_buffer() {
        let mut data = [0u8; 6];
        write_i32_le(&mut data, -2, 0).unwrap();
        write_u16_le(&mut data, 0x0102, 4).unwrap();
        assert_eq!(data, [0xFE, 0xFF, 0xFF, 0xFF, 0x02, 0x01]);

        let err = write_u32_le(&mut data, 1, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert!(write_bytes(&mut data, &[1], usize::MAX).is_err());
    }
}
