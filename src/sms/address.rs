//! Semi-octet (BCD) and alphanumeric addresses.
//!
//! ```text
//!   len | 1 ton npi | d2 d1 | d4 d3 | ... | F dn
//! ```
//!
//! `len` counts octets for the service-centre address and digits
//! (semi-octets) for originator/destination addresses.

use serde::Serialize;

use super::gsm7;
use crate::error::PduError;

/// Type of number: international.
pub const TON_INTERNATIONAL: u8 = 1;
/// Type of number: alphanumeric, 7-bit packed.
pub const TON_ALPHANUMERIC: u8 = 5;
/// Numbering plan: ISDN/telephone (E.164).
pub const NPI_ISDN: u8 = 1;

const FILLER: u8 = 0xF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub ton: u8,
    pub npi: u8,
    /// Digits with a leading `+` for international numbers, or the
    /// decoded text of an alphanumeric address.
    pub number: String,
    /// Bit 7 of the type octet.  Always set by conforming encoders.
    #[serde(skip)]
    pub extension: bool,
    /// Length octet of an alphanumeric address that claims more
    /// semi-octets than its septets need.
    #[serde(skip)]
    pub length: Option<u8>,
    /// Unused bits after the last digit or septet, when they are not the
    /// filler an encoder writes (`F` for digits, zeros for septets).
    #[serde(skip)]
    pub spare: Option<u16>,
}

impl Address {
    /// Build from a dialled number; a leading `+` selects international.
    pub fn from_number(number: &str) -> Self {
        let ton = if number.starts_with('+') {
            TON_INTERNATIONAL
        } else {
            0
        };
        Self {
            ton,
            npi: NPI_ISDN,
            number: number.to_string(),
            extension: true,
            length: None,
            spare: None,
        }
    }

    /// Type-of-address octet.
    pub fn type_octet(&self) -> u8 {
        (u8::from(self.extension) << 7) | ((self.ton & 0x07) << 4) | (self.npi & 0x0F)
    }

    fn from_type_octet(octet: u8, number: String) -> Self {
        Self {
            ton: (octet >> 4) & 0x07,
            npi: octet & 0x0F,
            number,
            extension: octet & 0x80 != 0,
            length: None,
            spare: None,
        }
    }

    fn decorate(ton: u8, digits: String) -> String {
        if ton == TON_INTERNATIONAL {
            format!("+{digits}")
        } else {
            digits
        }
    }

    fn bare_digits(&self) -> &str {
        self.number.strip_prefix('+').unwrap_or(&self.number)
    }

    // ── Service-centre address ───────────────────────────────

    /// Decode an octet-counted SCA at `data[0]`.  Returns the address
    /// (`None` for a zero length) and the bytes consumed.
    pub fn decode_sca(data: &[u8]) -> Result<(Option<Self>, usize), PduError> {
        let len = *data.first().ok_or(PduError::Truncated)? as usize;
        if len == 0 {
            return Ok((None, 1));
        }
        let body = data.get(1..=len).ok_or(PduError::Truncated)?;
        // Only the final nibble may be filler.
        let packed = &body[1..];
        let filler = packed.last().is_some_and(|b| b >> 4 == FILLER);
        let digits = decode_bcd(packed, Some(packed.len() * 2 - usize::from(filler)))?;
        let ton = (body[0] >> 4) & 0x07;
        let addr = Self::from_type_octet(body[0], Self::decorate(ton, digits));
        Ok((Some(addr), 1 + len))
    }

    /// Append the SCA encoding (or a zero length for `None`).
    pub fn encode_sca(sca: Option<&Self>, out: &mut Vec<u8>) -> Result<(), PduError> {
        let Some(sca) = sca else {
            out.push(0);
            return Ok(());
        };
        let bcd = encode_bcd(sca.bare_digits())?;
        out.push(1 + bcd.len() as u8);
        out.push(sca.type_octet());
        out.extend_from_slice(&bcd);
        Ok(())
    }

    // ── Originator / destination address ─────────────────────

    /// Decode a digit-counted address at `data[0]`.  Returns the address
    /// and the bytes consumed.
    pub fn decode_party(data: &[u8]) -> Result<(Self, usize), PduError> {
        let semi_octets = *data.first().ok_or(PduError::Truncated)? as usize;
        let octets = semi_octets.div_ceil(2);
        let type_octet = *data.get(1).ok_or(PduError::Truncated)?;
        let body = data.get(2..2 + octets).ok_or(PduError::Truncated)?;
        let ton = (type_octet >> 4) & 0x07;

        if ton == TON_ALPHANUMERIC {
            let chars = semi_octets * 4 / 7;
            let septets = gsm7::unpack(body, 0, chars).ok_or(PduError::AddressLength)?;
            let mut addr = Self::from_type_octet(type_octet, gsm7::septets_to_raw_string(&septets));
            if semi_octets != alphanumeric_length(chars) {
                addr.length = Some(semi_octets as u8);
            }
            let spare = gsm7::read_bits(body, chars * 7, octets * 8 - chars * 7);
            addr.spare = (spare != 0).then_some(spare);
            return Ok((addr, 2 + octets));
        }

        let digits = decode_bcd(body, Some(semi_octets))?;
        let mut addr = Self::from_type_octet(type_octet, Self::decorate(ton, digits));
        if semi_octets % 2 == 1 {
            let filler = body[octets - 1] >> 4;
            addr.spare = (filler != FILLER).then_some(u16::from(filler));
        }
        Ok((addr, 2 + octets))
    }

    /// Append the digit-counted encoding.
    pub fn encode_party(&self, out: &mut Vec<u8>) -> Result<(), PduError> {
        if self.ton == TON_ALPHANUMERIC {
            let septets = gsm7::raw_string_to_septets(&self.number).ok_or(PduError::Encoding)?;
            let chars = septets.len();
            let semi_octets = match self.length {
                Some(len) if usize::from(len) * 4 / 7 == chars => usize::from(len),
                _ => alphanumeric_length(chars),
            };
            let mut body = gsm7::pack(&septets, 0);
            body.resize(semi_octets.div_ceil(2), 0);
            if let Some(spare) = self.spare {
                let body_bits = body.len() * 8;
                gsm7::write_bits(&mut body, chars * 7, body_bits - chars * 7, spare);
            }
            out.push(u8::try_from(semi_octets).map_err(|_| PduError::AddressLength)?);
            out.push(self.type_octet());
            out.extend_from_slice(&body);
            return Ok(());
        }
        let digits = self.bare_digits();
        let count = u8::try_from(digits.chars().count()).map_err(|_| PduError::AddressLength)?;
        let mut body = encode_bcd(digits)?;
        if let (Some(spare), Some(last)) = (self.spare, body.last_mut()) {
            if count % 2 == 1 {
                *last = (*last & 0x0F) | ((spare as u8 & 0x0F) << 4);
            }
        }
        out.push(count);
        out.push(self.type_octet());
        out.extend_from_slice(&body);
        Ok(())
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.number)
    }
}

/// Semi-octets an encoder declares for `chars` packed septets.
fn alphanumeric_length(chars: usize) -> usize {
    (chars * 7).div_ceil(4)
}

// ---------------------------------------------------------------------------
// BCD
// ---------------------------------------------------------------------------

fn digit_char(nibble: u8) -> Option<char> {
    Some(match nibble {
        0..=9 => (b'0' + nibble) as char,
        0xA => '*',
        0xB => '#',
        0xC => 'a',
        0xD => 'b',
        0xE => 'c',
        _ => return None,
    })
}

fn digit_nibble(c: char) -> Option<u8> {
    Some(match c {
        '0'..='9' => c as u8 - b'0',
        '*' => 0xA,
        '#' => 0xB,
        'a' => 0xC,
        'b' => 0xD,
        'c' => 0xE,
        _ => return None,
    })
}

/// Decode swapped-nibble digits.  With `count`, exactly that many digits
/// are read; without, decoding stops at the first filler nibble.
pub fn decode_bcd(data: &[u8], count: Option<usize>) -> Result<String, PduError> {
    let mut out = String::with_capacity(data.len() * 2);
    let nibbles = data.iter().flat_map(|b| [b & 0x0F, b >> 4]);
    for (i, nibble) in nibbles.enumerate() {
        match count {
            Some(n) if i >= n => break,
            None if nibble == FILLER => break,
            _ => {}
        }
        out.push(digit_char(nibble).ok_or(PduError::BadAddressDigit(nibble))?);
    }
    if count.is_some_and(|n| out.len() != n) {
        return Err(PduError::AddressLength);
    }
    Ok(out)
}

/// Encode digits as swapped nibbles, padding an odd count with `F`.
pub fn encode_bcd(digits: &str) -> Result<Vec<u8>, PduError> {
    let nibbles: Vec<u8> = digits
        .chars()
        .map(|c| digit_nibble(c).ok_or(PduError::Encoding))
        .collect::<Result<_, _>>()?;
    Ok(nibbles
        .chunks(2)
        .map(|pair| pair[0] | (pair.get(1).copied().unwrap_or(FILLER) << 4))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn international_sca_gets_plus() {
        let data = [0x07, 0x91, 0x04, 0x47, 0x94, 0x64, 0x00, 0xF0];
        let (sca, used) = Address::decode_sca(&data).unwrap();
        let sca = sca.unwrap();
        assert_eq!(used, 8);
        assert_eq!(sca.number, "+40744946000");
        assert_eq!(sca.type_octet(), 0x91);

        let mut out = Vec::new();
        Address::encode_sca(Some(&sca), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn type_145_normalizes_and_plus_is_never_written() {
        let addr = Address::from_number("+491234567");
        assert_eq!(addr.type_octet(), 145);
        let mut out = Vec::new();
        addr.encode_party(&mut out).unwrap();
        assert_eq!(out, vec![0x09, 0x91, 0x94, 0x21, 0x43, 0x65, 0xF7]);
        let (back, used) = Address::decode_party(&out).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(back, addr);
    }

    #[test]
    fn special_digits_use_bcd_table() {
        let (addr, _) = Address::decode_party(&[0x05, 0x81, 0xBA, 0xDC, 0xFE]).unwrap();
        assert_eq!(addr.number, "*#abc");
        assert!(Address::decode_party(&[0x05, 0x81, 0xBA, 0xDC, 0xEE]).is_ok());
    }

    #[test]
    fn alphanumeric_sender() {
        // Alphanumeric originator of a real deliver PDU
        let data = [0x0D, 0xD0, 0xF3, 0x34, 0xFC, 0x1C, 0xA6, 0x97, 0x01];
        let (addr, used) = Address::decode_party(&data).unwrap();
        assert_eq!(used, data.len());
        assert_eq!(addr.ton, TON_ALPHANUMERIC);
        assert_eq!(addr.number, "sipgate");
        let mut out = Vec::new();
        addr.encode_party(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn clear_extension_bit_survives() {
        let data = [0x04, 0x11, 0x44, 0x97];
        let (addr, _) = Address::decode_party(&data).unwrap();
        assert!(!addr.extension);
        assert_eq!(addr.number, "+4479");
        let mut out = Vec::new();
        addr.encode_party(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn odd_filler_and_long_alphanumeric_length_survive() {
        // filler nibble 0 instead of F
        let data = [0x03, 0x81, 0x21, 0x03];
        let (addr, _) = Address::decode_party(&data).unwrap();
        assert_eq!(addr.number, "123");
        assert_eq!(addr.spare, Some(0));
        let mut out = Vec::new();
        addr.encode_party(&mut out).unwrap();
        assert_eq!(out, data);

        // 12 semi-octets hold six septets, which need only 11
        let data = [0x0C, 0xD0, 0xF3, 0x34, 0xFC, 0x1C, 0xA6, 0x97];
        let (addr, used) = Address::decode_party(&data).unwrap();
        assert_eq!(used, data.len());
        assert_eq!(addr.number.chars().count(), 6);
        assert_eq!(addr.length, Some(12));
        let mut out = Vec::new();
        addr.encode_party(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn sca_filler_only_at_the_end() {
        assert_eq!(
            Address::decode_sca(&[0x03, 0x91, 0x21, 0x3F]),
            Err(PduError::BadAddressDigit(0xF))
        );
        let data = [0x03, 0x91, 0x21, 0xF3];
        let (sca, _) = Address::decode_sca(&data).unwrap();
        let sca = sca.unwrap();
        assert_eq!(sca.number, "+123");
        let mut out = Vec::new();
        Address::encode_sca(Some(&sca), &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn truncated_address() {
        assert_eq!(Address::decode_party(&[0x0A, 0x91, 0x12]), Err(PduError::Truncated));
        assert_eq!(Address::decode_sca(&[]), Err(PduError::Truncated));
    }

    #[test]
    fn unencodable_digit() {
        assert_eq!(encode_bcd("12x"), Err(PduError::Encoding));
    }
}
