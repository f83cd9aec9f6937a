//! GSM 03.38 default alphabet and septet packing.
//!
//! The escape septet `0x1B` has no glyph of its own; it is mapped to
//! U+00A0 (no-break space) so that single-septet translation stays a
//! bijection.  Text conversion ([`to_septets`] / [`from_septets`]) handles
//! the extension table on top of that.

/// Escape to the extension table.
pub const ESC: u8 = 0x1B;

const ESC_CHAR: char = '\u{A0}';

/// Basic character set, indexed by septet value.
#[rustfmt::skip]
const BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', ESC_CHAR, 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// Extension table: (septet after ESC, character).
const EXTENSION: [(u8, char); 10] = [
    (0x0A, '\u{0C}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

// ---------------------------------------------------------------------------
// Single septets
// ---------------------------------------------------------------------------

/// Septet → character (basic table only).
pub fn decode_septet(septet: u8) -> char {
    BASIC[(septet & 0x7F) as usize]
}

/// Character → septet (basic table only, including the escape mapping).
pub fn encode_char(c: char) -> Option<u8> {
    BASIC.iter().position(|&b| b == c).map(|i| i as u8)
}

fn extension_septet(c: char) -> Option<u8> {
    EXTENSION.iter().find(|(_, e)| *e == c).map(|(s, _)| *s)
}

fn extension_char(septet: u8) -> Option<char> {
    EXTENSION.iter().find(|(s, _)| *s == septet).map(|(_, c)| *c)
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Encode text into septets, escaping extension characters.
/// `None` if any character is outside both tables.
pub fn to_septets(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match encode_char(c) {
            Some(s) if s != ESC => out.push(s),
            _ => {
                out.push(ESC);
                out.push(extension_septet(c)?);
            }
        }
    }
    Some(out)
}

/// Whether every character of `text` is representable.
pub fn is_representable(text: &str) -> bool {
    text.chars()
        .all(|c| matches!(encode_char(c), Some(s) if s != ESC) || extension_septet(c).is_some())
}

/// Decode septets, resolving escape sequences.  An escape followed by an
/// unknown septet falls back to the basic character; a trailing escape is
/// dropped.
pub fn from_septets(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut iter = septets.iter().copied();
    while let Some(s) = iter.next() {
        if s == ESC {
            if let Some(next) = iter.next() {
                out.push(extension_char(next).unwrap_or_else(|| decode_septet(next)));
            }
        } else {
            out.push(decode_septet(s));
        }
    }
    out
}

/// Bijective septet → character mapping, for alphanumeric addresses.
pub fn septets_to_raw_string(septets: &[u8]) -> String {
    septets.iter().map(|&s| decode_septet(s)).collect()
}

/// Inverse of [`septets_to_raw_string`].
pub fn raw_string_to_septets(text: &str) -> Option<Vec<u8>> {
    text.chars().map(encode_char).collect()
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Pack septets LSB-first after `pad_bits` zero fill bits.
pub fn pack(septets: &[u8], pad_bits: usize) -> Vec<u8> {
    let total_bits = pad_bits + septets.len() * 7;
    let mut out = Vec::with_capacity(total_bits.div_ceil(8));
    let mut carry: u32 = 0;
    let mut carry_bits = pad_bits as u32;

    for &septet in septets {
        carry |= u32::from(septet & 0x7F) << carry_bits;
        carry_bits += 7;
        while carry_bits >= 8 {
            out.push((carry & 0xFF) as u8);
            carry >>= 8;
            carry_bits -= 8;
        }
    }
    if carry_bits > 0 {
        out.push((carry & 0xFF) as u8);
    }
    out
}

/// Unpack exactly `count` septets, skipping `pad_bits` leading fill bits.
/// `None` if `data` holds fewer bits than that.
pub fn unpack(data: &[u8], pad_bits: usize, count: usize) -> Option<Vec<u8>> {
    if data.len() * 8 < pad_bits + count * 7 {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    let mut skip = pad_bits as u32;

    for &b in data {
        acc |= u32::from(b) << acc_bits;
        acc_bits += 8;
        if skip > 0 {
            let n = skip.min(acc_bits);
            acc >>= n;
            acc_bits -= n;
            skip -= n;
        }
        while acc_bits >= 7 && out.len() < count {
            out.push((acc & 0x7F) as u8);
            acc >>= 7;
            acc_bits -= 7;
        }
        if out.len() == count {
            break;
        }
    }
    Some(out)
}

/// Read `n` bits (at most 16) of `data` from bit `offset`, LSB first.
/// Bits past the end read as zero.
pub fn read_bits(data: &[u8], offset: usize, n: usize) -> u16 {
    debug_assert!(n <= 16);
    let mut value = 0u16;
    for i in 0..n {
        let bit = offset + i;
        if data.get(bit / 8).is_some_and(|b| (b >> (bit % 8)) & 1 != 0) {
            value |= 1 << i;
        }
    }
    value
}

/// OR the low `n` bits (at most 16) of `value` into `data` from bit
/// `offset`, LSB first.  Bits past the end are dropped.
pub fn write_bits(data: &mut [u8], offset: usize, n: usize, value: u16) {
    debug_assert!(n <= 16);
    for i in 0..n {
        if (value >> i) & 1 != 0 {
            let bit = offset + i;
            if let Some(b) = data.get_mut(bit / 8) {
                *b |= 1 << (bit % 8);
            }
        }
    }
}
