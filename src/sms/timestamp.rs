//! Service-centre timestamps and absolute validity periods.
//!
//! Seven swapped-nibble BCD octets: `YY MM DD hh mm ss TZ`.  The zone is
//! in quarter hours; bit 3 of the raw zone octet is its sign.

use core::fmt;

use serde::Serialize;

use crate::error::PduError;

/// Octets on the wire.
pub const LEN: usize = 7;

/// Largest zone magnitude the two BCD digits (with a 3-bit tens digit) hold.
pub const MAX_ZONE_QUARTERS: i8 = 79;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    /// Two-digit year.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from UTC in quarter hours.
    pub zone_quarters: i8,
    /// Zone octet carried a sign bit over a zero offset.
    #[serde(skip)]
    pub negative_zero: bool,
}

fn swapped(octet: u8) -> Result<u8, PduError> {
    let (lo, hi) = (octet & 0x0F, octet >> 4);
    if lo > 9 || hi > 9 {
        return Err(PduError::BadTimestamp);
    }
    Ok(lo * 10 + hi)
}

fn to_swapped(value: u8) -> u8 {
    ((value % 10) << 4) | (value / 10 % 10)
}

impl Timestamp {
    pub fn decode(data: &[u8]) -> Result<Self, PduError> {
        let raw: &[u8; LEN] = data
            .get(..LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(PduError::Truncated)?;

        let zone = raw[6];
        let (tens, units) = (zone & 0x07, zone >> 4);
        if units > 9 {
            return Err(PduError::BadTimestamp);
        }
        let magnitude = (tens * 10 + units) as i8;
        let negative = zone & 0x08 != 0;
        let zone_quarters = if negative { -magnitude } else { magnitude };

        Ok(Self {
            year: swapped(raw[0])?,
            month: swapped(raw[1])?,
            day: swapped(raw[2])?,
            hour: swapped(raw[3])?,
            minute: swapped(raw[4])?,
            second: swapped(raw[5])?,
            zone_quarters,
            negative_zero: negative && magnitude == 0,
        })
    }

    pub fn encode(&self) -> Result<[u8; LEN], PduError> {
        let fields = [self.year, self.month, self.day, self.hour, self.minute, self.second];
        if fields.iter().any(|&v| v > 99) || !(-MAX_ZONE_QUARTERS..=MAX_ZONE_QUARTERS).contains(&self.zone_quarters) {
            return Err(PduError::BadTimestamp);
        }
        let mut out = [0u8; LEN];
        for (o, v) in out.iter_mut().zip(fields) {
            *o = to_swapped(v);
        }
        let magnitude = self.zone_quarters.unsigned_abs();
        let negative = self.zone_quarters < 0 || (self.zone_quarters == 0 && self.negative_zero);
        let sign = if negative { 0x08 } else { 0x00 };
        out[6] = ((magnitude % 10) << 4) | sign | (magnitude / 10);
        Ok(out)
    }

    /// Zone offset in minutes.
    pub fn zone_minutes(&self) -> i16 {
        i16::from(self.zone_quarters) * 15
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:02},{:02}:{:02}:{:02}{:+03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.zone_quarters
        )
    }
}
