//! SMS-DELIVER / SMS-SUBMIT PDU codec (GSM 03.40).
//!
//! ```text
//!  SCA │ type │ [MR] │ OA/DA │ PID │ DCS │ SCTS / [VP] │ UDL │ [UDH] UD
//!       ▲
//!       RP UDHI SRR VPF RD/MMS MTI
//! ```
//!
//! Decoding keeps every field needed to re-encode the exact same octets:
//! the raw DCS byte, the raw flag bits, the payload as raw septets or
//! octets, and a [`Residue`] of bits that carry no meaning.  Text is
//! derived on demand.

use serde::Serialize;

use super::address::Address;
use super::dcs::{Alphabet, DataCoding};
use super::gsm7;
use super::timestamp::{self, Timestamp};
use crate::error::PduError;

/// Relative validity used for new submissions (4 days).
pub const DEFAULT_VALIDITY: u8 = 0xAA;

/// Single-part payload limits.
pub const MAX_SEPTETS: usize = 160;
pub const MAX_OCTETS: usize = 140;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// MTI 0: network to mobile.
    Deliver,
    /// MTI 1: mobile to network.
    Submit,
}

impl MessageKind {
    fn mti(self) -> u8 {
        match self {
            Self::Deliver => 0,
            Self::Submit => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    None,
    Relative(u8),
    Absolute(Timestamp),
    /// Seven octets, kept opaque.
    Enhanced([u8; 7]),
}

impl Validity {
    fn format(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Enhanced(_) => 1,
            Self::Relative(_) => 2,
            Self::Absolute(_) => 3,
        }
    }
}

/// One user-data-header information element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InformationElement {
    pub iei: u8,
    pub data: Vec<u8>,
}

/// Concatenation info from IEI 0x00 or 0x08.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Concat {
    pub reference: u16,
    pub total: u8,
    pub sequence: u8,
}

/// Application port addressing from IEI 0x04 or 0x05.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ports {
    pub destination: u16,
    pub source: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserData {
    Septets(Vec<u8>),
    Octets(Vec<u8>),
}

/// Wire bits outside the message fields.  Conforming encoders write
/// them as zero (or leave them out); decoding records what was there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Residue {
    /// Bits 3-4 of a deliver PDU's first octet, which carry no validity.
    pub deliver_spare: u8,
    /// UDHI set over a header of length zero.
    pub empty_header: bool,
    /// Fill bits between the header and the first septet.
    pub fill: u8,
    /// Unused high bits of the last septet octet.
    pub tail: u8,
    /// Octets after the user data.
    pub trailing: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sms {
    pub sca: Option<Address>,
    pub kind: MessageKind,
    pub reply_path: bool,
    pub status_report: bool,
    /// Reject-duplicates (submit) or no-more-messages (deliver).
    pub rd_mms: bool,
    pub message_ref: Option<u8>,
    /// Originator (deliver) or destination (submit).
    pub party: Address,
    pub pid: u8,
    pub dcs: DataCoding,
    pub timestamp: Option<Timestamp>,
    pub validity: Validity,
    pub headers: Vec<InformationElement>,
    pub user_data: UserData,
    #[serde(skip)]
    pub residue: Residue,
}

impl Sms {
    // ── Construction ─────────────────────────────────────────

    /// A single-part submission to `number`.  Uses the default alphabet
    /// when every character fits it, UCS-2 otherwise.
    pub fn submit(number: &str, text: &str) -> Result<Self, PduError> {
        let (dcs, user_data) = match gsm7::to_septets(text) {
            Some(septets) => {
                if septets.len() > MAX_SEPTETS {
                    return Err(PduError::Encoding);
                }
                (DataCoding::plain(Alphabet::Default), UserData::Septets(septets))
            }
            None => {
                let octets: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
                if octets.len() > MAX_OCTETS {
                    return Err(PduError::Encoding);
                }
                (DataCoding::plain(Alphabet::Ucs2), UserData::Octets(octets))
            }
        };
        Ok(Self {
            sca: None,
            kind: MessageKind::Submit,
            reply_path: false,
            status_report: false,
            rd_mms: false,
            message_ref: Some(0),
            party: Address::from_number(number),
            pid: 0,
            dcs,
            timestamp: None,
            validity: Validity::Relative(DEFAULT_VALIDITY),
            headers: Vec::new(),
            user_data,
            residue: Residue::default(),
        })
    }

    // ── Decode ───────────────────────────────────────────────

    /// Decode a hex PDU (either case) that starts with the SCA.
    pub fn decode(hex: &str) -> Result<Self, PduError> {
        Self::from_bytes(&decode_hex(hex)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PduError> {
        let mut r = Reader { data: bytes, pos: 0 };

        let (sca, used) = Address::decode_sca(r.rest())?;
        r.pos += used;

        let first = r.byte()?;
        let kind = match first & 0x03 {
            0 => MessageKind::Deliver,
            1 => MessageKind::Submit,
            mti => return Err(PduError::UnsupportedType(mti)),
        };
        let udhi = first & 0x40 != 0;
        let vpf = (first >> 3) & 0x03;

        let message_ref = match kind {
            MessageKind::Submit => Some(r.byte()?),
            MessageKind::Deliver => None,
        };

        let (party, used) = Address::decode_party(r.rest())?;
        r.pos += used;

        let pid = r.byte()?;
        let dcs = DataCoding::from_byte(r.byte()?)?;

        let (timestamp, validity) = match kind {
            MessageKind::Deliver => (Some(Timestamp::decode(r.take(timestamp::LEN)?)?), Validity::None),
            MessageKind::Submit => {
                let vp = match vpf {
                    0 => Validity::None,
                    1 => {
                        let mut raw = [0u8; 7];
                        raw.copy_from_slice(r.take(7)?);
                        Validity::Enhanced(raw)
                    }
                    2 => Validity::Relative(r.byte()?),
                    _ => Validity::Absolute(Timestamp::decode(r.take(timestamp::LEN)?)?),
                };
                (None, vp)
            }
        };

        let udl = r.byte()? as usize;
        let ud = r.rest();
        let (headers, user_data, mut residue) = decode_user_data(ud, udl, udhi, &dcs)?;
        if kind == MessageKind::Deliver {
            residue.deliver_spare = vpf;
        }

        Ok(Self {
            sca,
            kind,
            reply_path: first & 0x80 != 0,
            status_report: first & 0x20 != 0,
            rd_mms: first & 0x04 != 0,
            message_ref,
            party,
            pid,
            dcs,
            timestamp,
            validity,
            headers,
            user_data,
            residue,
        })
    }

    // ── Encode ───────────────────────────────────────────────

    /// Encode to uppercase hex, SCA included.
    pub fn encode(&self) -> Result<String, PduError> {
        Ok(encode_hex(&self.to_bytes()?))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PduError> {
        let mut out = Vec::with_capacity(64);
        Address::encode_sca(self.sca.as_ref(), &mut out)?;

        let vpf = match self.kind {
            MessageKind::Submit => self.validity.format(),
            MessageKind::Deliver => self.residue.deliver_spare & 0x03,
        };
        let mut first = self.kind.mti() | (vpf << 3);
        if self.reply_path {
            first |= 0x80;
        }
        if self.has_header() {
            first |= 0x40;
        }
        if self.status_report {
            first |= 0x20;
        }
        if self.rd_mms {
            first |= 0x04;
        }
        out.push(first);

        if self.kind == MessageKind::Submit {
            out.push(self.message_ref.unwrap_or(0));
        }
        self.party.encode_party(&mut out)?;
        out.push(self.pid);
        out.push(self.dcs.raw);

        match self.kind {
            MessageKind::Deliver => {
                let ts = self.timestamp.ok_or(PduError::BadTimestamp)?;
                out.extend_from_slice(&ts.encode()?);
            }
            MessageKind::Submit => match &self.validity {
                Validity::None => {}
                Validity::Enhanced(raw) => out.extend_from_slice(raw),
                Validity::Relative(v) => out.push(*v),
                Validity::Absolute(ts) => out.extend_from_slice(&ts.encode()?),
            },
        }

        encode_user_data(self, &mut out)?;
        Ok(out)
    }

    /// TPDU octets (everything after the SCA), as `+CMGS` wants.
    pub fn tpdu_len(&self) -> Result<usize, PduError> {
        let mut sca = Vec::new();
        Address::encode_sca(self.sca.as_ref(), &mut sca)?;
        Ok(self.to_bytes()?.len() - sca.len())
    }

    // ── Accessors ────────────────────────────────────────────

    /// Whether a user-data header goes on the wire.
    pub fn has_header(&self) -> bool {
        !self.headers.is_empty() || self.residue.empty_header
    }

    /// Decoded message text.
    pub fn text(&self) -> Result<String, PduError> {
        if self.dcs.compressed {
            return Err(PduError::Encoding);
        }
        match (&self.user_data, self.dcs.alphabet) {
            (UserData::Septets(s), _) => Ok(gsm7::from_septets(s)),
            (UserData::Octets(o), Alphabet::Ucs2) => decode_ucs2(o),
            // 8-bit data has no defined charset; expose it as Latin-1.
            (UserData::Octets(o), _) => Ok(o.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn header(&self, iei: u8) -> Option<&[u8]> {
        self.headers.iter().find(|ie| ie.iei == iei).map(|ie| ie.data.as_slice())
    }

    pub fn concat(&self) -> Option<Concat> {
        if let Some(&[reference, total, sequence]) = self.header(0x00) {
            return Some(Concat {
                reference: u16::from(reference),
                total,
                sequence,
            });
        }
        match self.header(0x08)? {
            &[hi, lo, total, sequence] => Some(Concat {
                reference: u16::from_be_bytes([hi, lo]),
                total,
                sequence,
            }),
            _ => None,
        }
    }

    pub fn ports(&self) -> Option<Ports> {
        if let Some(&[destination, source]) = self.header(0x04) {
            return Some(Ports {
                destination: u16::from(destination),
                source: u16::from(source),
            });
        }
        match self.header(0x05)? {
            &[d1, d2, s1, s2] => Some(Ports {
                destination: u16::from_be_bytes([d1, d2]),
                source: u16::from_be_bytes([s1, s2]),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// User data
// ---------------------------------------------------------------------------

type DecodedUserData = (Vec<InformationElement>, UserData, Residue);

fn decode_user_data(ud: &[u8], udl: usize, udhi: bool, dcs: &DataCoding) -> Result<DecodedUserData, PduError> {
    let mut headers = Vec::new();
    let mut residue = Residue::default();
    let mut header_octets = 0;
    if udhi {
        let udhl = *ud.first().ok_or(PduError::Truncated)? as usize;
        let udh = ud.get(1..=udhl).ok_or(PduError::BadUserDataHeader)?;
        let mut i = 0;
        while i < udh.len() {
            let iei = udh[i];
            let len = *udh.get(i + 1).ok_or(PduError::BadUserDataHeader)? as usize;
            let data = udh.get(i + 2..i + 2 + len).ok_or(PduError::BadUserDataHeader)?;
            headers.push(InformationElement {
                iei,
                data: data.to_vec(),
            });
            i += 2 + len;
        }
        header_octets = 1 + udhl;
        residue.empty_header = udhl == 0;
    }

    let body = ud.get(header_octets..).ok_or(PduError::Truncated)?;
    let (user_data, used) = if dcs.is_septets() {
        let fill = septet_fill(header_octets);
        let header_septets = (header_octets * 8 + fill) / 7;
        let count = udl.checked_sub(header_septets).ok_or(PduError::BadUserDataHeader)?;
        let septets = gsm7::unpack(body, fill, count).ok_or(PduError::Truncated)?;
        let bits = fill + count * 7;
        let used = bits.div_ceil(8);
        residue.fill = gsm7::read_bits(body, 0, fill) as u8;
        residue.tail = gsm7::read_bits(body, bits, used * 8 - bits) as u8;
        (UserData::Septets(septets), used)
    } else {
        let count = udl.checked_sub(header_octets).ok_or(PduError::BadUserDataHeader)?;
        let octets = body.get(..count).ok_or(PduError::Truncated)?;
        (UserData::Octets(octets.to_vec()), count)
    };
    residue.trailing = body[used..].to_vec();
    Ok((headers, user_data, residue))
}

/// Fill bits that align the first septet after a header of
/// `header_octets` octets (UDHL included).
fn septet_fill(header_octets: usize) -> usize {
    (7 - header_octets * 8 % 7) % 7
}

fn encode_user_data(sms: &Sms, out: &mut Vec<u8>) -> Result<(), PduError> {
    let mut udh = Vec::new();
    for ie in &sms.headers {
        udh.push(ie.iei);
        udh.push(u8::try_from(ie.data.len()).map_err(|_| PduError::BadUserDataHeader)?);
        udh.extend_from_slice(&ie.data);
    }
    let header_octets = if sms.has_header() { 1 + udh.len() } else { 0 };

    let (udl, payload) = match &sms.user_data {
        UserData::Septets(septets) => {
            let fill = septet_fill(header_octets);
            let header_septets = (header_octets * 8 + fill) / 7;
            let mut payload = gsm7::pack(septets, fill);
            let bits = fill + septets.len() * 7;
            gsm7::write_bits(&mut payload, 0, fill, u16::from(sms.residue.fill));
            let payload_bits = payload.len() * 8;
            gsm7::write_bits(&mut payload, bits, payload_bits - bits, u16::from(sms.residue.tail));
            (header_septets + septets.len(), payload)
        }
        UserData::Octets(octets) => (header_octets + octets.len(), octets.clone()),
    };

    out.push(u8::try_from(udl).map_err(|_| PduError::Encoding)?);
    if header_octets > 0 {
        out.push(u8::try_from(udh.len()).map_err(|_| PduError::BadUserDataHeader)?);
        out.extend_from_slice(&udh);
    }
    out.extend_from_slice(&payload);
    out.extend_from_slice(&sms.residue.trailing);
    Ok(())
}

fn decode_ucs2(octets: &[u8]) -> Result<String, PduError> {
    if octets.len() % 2 != 0 {
        return Err(PduError::BadUcs2);
    }
    let units: Vec<u16> = octets
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| PduError::BadUcs2)
}

// ---------------------------------------------------------------------------
// Hex and cursor helpers
// ---------------------------------------------------------------------------

pub fn decode_hex(hex: &str) -> Result<Vec<u8>, PduError> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(PduError::BadHex);
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let s = core::str::from_utf8(pair).map_err(|_| PduError::BadHex)?;
            u8::from_str_radix(s, 16).map_err(|_| PduError::BadHex)
        })
        .collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    use core::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02X}");
    }
    s
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, PduError> {
        let b = *self.data.get(self.pos).ok_or(PduError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PduError> {
        let s = self.data.get(self.pos..self.pos + n).ok_or(PduError::Truncated)?;
        self.pos += n;
        Ok(s)
    }

    fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or(&[])
    }
}
