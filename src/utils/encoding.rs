//! Byte-level normalization applied to file contents before packing.

/// Collapse `\r\n` pairs and stray `\r` bytes to `\n`, in place.
///
/// No other bytes are introduced or removed, so offsets into the result
/// stay meaningful for line arithmetic.
pub fn normalize_eol(data: &mut Vec<u8>) {
    let mut write = 0;
    let mut read = 0;

    while read < data.len() {
        if data[read] == b'\r' {
            data[write] = b'\n';
            if read + 1 < data.len() && data[read + 1] == b'\n' {
                read += 1;
            }
        } else {
            data[write] = data[read];
        }
        write += 1;
        read += 1;
    }

    data.truncate(write);
}

/// Convert raw file bytes to UTF-8.
///
/// UTF-8 input passes through with its BOM stripped; UTF-16 input is
/// recognized by BOM and decoded (invalid units become replacement
/// characters). Anything else is passed through unchanged - byte-level
/// search over unknown encodings still works for the ASCII subset.
pub fn convert_to_utf8(data: Vec<u8>) -> Vec<u8> {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return data[3..].to_vec();
    }

    if data.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16(&data[2..], u16::from_le_bytes);
    }

    if data.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16(&data[2..], u16::from_be_bytes);
    }

    data
}

fn decode_utf16(data: &[u8], unit: fn([u8; 2]) -> u16) -> Vec<u8> {
    let units = data.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));

    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect::<String>()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(input: &[u8]) -> Vec<u8> {
        let mut data = input.to_vec();
        normalize_eol(&mut data);
        data
    }

    #[test]
    fn test_normalize_crlf_and_stray_cr() {
        assert_eq!(normalized(b"x\r\ny\r"), b"x\ny\n");
        assert_eq!(normalized(b"a\rb"), b"a\nb");
        assert_eq!(normalized(b"\r\n\r\n"), b"\n\n");
        assert_eq!(normalized(b"\r\r"), b"\n\n");
    }

    #[test]
    fn test_normalize_preserves_other_bytes() {
        assert_eq!(normalized(b"no endings here"), b"no endings here");
        assert_eq!(normalized(b""), b"");
        assert_eq!(normalized(b"a\nb\n"), b"a\nb\n");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        assert_eq!(convert_to_utf8(b"\xEF\xBB\xBFhello".to_vec()), b"hello");
    }

    #[test]
    fn test_utf16_le_decoded() {
        let input = vec![0xFF, 0xFE, b'h', 0, b'i', 0];
        assert_eq!(convert_to_utf8(input), b"hi");
    }

    #[test]
    fn test_utf16_be_decoded() {
        let input = vec![0xFE, 0xFF, 0, b'h', 0, b'i'];
        assert_eq!(convert_to_utf8(input), b"hi");
    }

    #[test]
    fn test_unknown_bytes_pass_through() {
        let input = vec![0x80, 0xFF, b'a'];
        assert_eq!(convert_to_utf8(input.clone()), input);
    }
}
