/// Longest name, in UTF-8 bytes, the decoder will produce.
pub const MAX_NAME_BYTES: usize = 23;

/// Decodes a UTF-16BE field, stopping at the first null unit or at the end
/// of the field. Output is clipped to `max_bytes` on a character boundary.
/// Unpaired surrogates become U+FFFD.
pub fn utf16be_to_string(field: &[u8], max_bytes: usize) -> String {
    let units = field
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .take_while(|&u| u != 0);

    let mut out = String::new();
    for ch in char::decode_utf16(units) {
        let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
        if out.len() + ch.len_utf8() > max_bytes {
            break;
        }
        out.push(ch);
    }
    out
}
