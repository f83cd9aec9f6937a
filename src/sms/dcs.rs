//! Data coding scheme (GSM 03.38 §4).
//!
//! ```text
//!   00xx  general data coding         bit5 compressed, bit4 class valid,
//!   01xx  ... marked for deletion     bits3-2 alphabet, bits1-0 class
//!   1000..1011  reserved
//!   1100  MWI, discard, default alphabet
//!   1101  MWI, store,   default alphabet
//!   1110  MWI, store,   UCS2
//!   1111  data coding / message class bit2 8-bit, bits1-0 class
//! ```

use serde::Serialize;

use crate::error::PduError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alphabet {
    /// GSM 7-bit default alphabet.
    Default,
    EightBit,
    Ucs2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicationKind {
    Voicemail,
    Fax,
    Email,
    Other,
}

/// Message-waiting indication carried in the DCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitingIndication {
    /// Store the message (as opposed to discarding it after display).
    pub store: bool,
    pub active: bool,
    pub kind: IndicationKind,
}

/// Decoded DCS byte.  `raw` is kept so that encode is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataCoding {
    pub raw: u8,
    pub alphabet: Alphabet,
    pub compressed: bool,
    /// Message class 0..3 when present.
    pub class: Option<u8>,
    pub auto_delete: bool,
    pub waiting: Option<WaitingIndication>,
}

impl DataCoding {
    /// Interpret a DCS byte.
    pub fn from_byte(raw: u8) -> Result<Self, PduError> {
        let mut dc = Self {
            raw,
            alphabet: Alphabet::Default,
            compressed: false,
            class: None,
            auto_delete: false,
            waiting: None,
        };

        match raw >> 4 {
            0x0..=0x7 => {
                dc.auto_delete = raw & 0x40 != 0;
                dc.compressed = raw & 0x20 != 0;
                if raw & 0x10 != 0 {
                    dc.class = Some(raw & 0x03);
                }
                dc.alphabet = match (raw >> 2) & 0x03 {
                    0 => Alphabet::Default,
                    1 => Alphabet::EightBit,
                    2 => Alphabet::Ucs2,
                    _ => return Err(PduError::ReservedCoding(raw)),
                };
            }
            0x8..=0xB => return Err(PduError::ReservedCoding(raw)),
            group @ 0xC..=0xE => {
                dc.alphabet = if group == 0xE {
                    Alphabet::Ucs2
                } else {
                    Alphabet::Default
                };
                dc.waiting = Some(WaitingIndication {
                    store: group != 0xC,
                    active: raw & 0x08 != 0,
                    kind: match raw & 0x03 {
                        0 => IndicationKind::Voicemail,
                        1 => IndicationKind::Fax,
                        2 => IndicationKind::Email,
                        _ => IndicationKind::Other,
                    },
                });
            }
            _ => {
                dc.alphabet = if raw & 0x04 != 0 {
                    Alphabet::EightBit
                } else {
                    Alphabet::Default
                };
                dc.class = Some(raw & 0x03);
            }
        }
        Ok(dc)
    }

    /// Plain general-group coding for `alphabet`, no class.
    pub fn plain(alphabet: Alphabet) -> Self {
        let raw = match alphabet {
            Alphabet::Default => 0x00,
            Alphabet::EightBit => 0x04,
            Alphabet::Ucs2 => 0x08,
        };
        Self {
            raw,
            alphabet,
            compressed: false,
            class: None,
            auto_delete: false,
            waiting: None,
        }
    }

    /// Whether the payload is counted in septets.
    pub fn is_septets(&self) -> bool {
        self.alphabet == Alphabet::Default && !self.compressed
    }
}
