//! Modem configuration
//!
//! Device paths, serial parameters, and the command sets sent at each
//! modem state change.  Loaded from a JSON file; every field has a
//! default so a partial file is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Serial device per logical channel.  Kinds that name the same path
/// share one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPaths {
    /// Call control (`D`, `A`, `H`, `+CHLD`).
    pub call: String,
    /// Everything else the service issues (SMS, queries, raw commands).
    pub misc: String,
    /// Where unsolicited notifications are enabled.
    pub unsolicited: String,
}

impl Default for ChannelPaths {
    fn default() -> Self {
        let dev = "/dev/ttySAC0".to_string();
        Self {
            call: dev.clone(),
            misc: dev.clone(),
            unsolicited: dev,
        }
    }
}

/// Command sets sent on modem state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSets {
    /// Sent on every channel after it is opened.
    pub init: Vec<String>,
    /// Sent once the radio is powered.
    pub antenna: Vec<String>,
    /// Sent once the SIM reports `READY`.
    pub sim: Vec<String>,
}

impl Default for CommandSets {
    fn default() -> Self {
        let init = [
            "Z",         // soft reset
            "E0V1",      // echo off, verbose results
            "+CMEE=1",   // numeric mobile equipment errors
            "+CRC=1",    // extended ring format
            "+CMGF=0",   // PDU mode
            "+CSMS=1",   // phase 2+ message service
            "+CLIP=1",   // caller id
            "+COLP=1",   // connected line id
            "+CCWA=1",   // call waiting
            "+CSSN=1,1", // supplementary service notifications
            "+CTZU=1",   // automatic timezone update
            "+CTZR=1",   // timezone reporting
            "+CREG=2",   // registration with location
            "+CAOC=2",   // advice of charge
        ];
        Self {
            init: init.iter().map(|c| (*c).to_string()).collect(),
            antenna: Vec::new(),
            // deliver SMS to SIM, report cell broadcasts directly
            sim: vec!["+CNMI=2,1,2,1,1".to_string()],
        }
    }
}

/// External program that takes over the serial device for a data call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCallConfig {
    /// `None` disables data calls.
    pub program: Option<String>,
    /// Arguments; `{device}` is replaced with the serial device path.
    pub args: Vec<String>,
}

/// Core modem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    // --- Devices ---
    pub channels: ChannelPaths,
    /// Serial speed (8N1)
    pub baud_rate: u32,
    /// Hardware flow control
    pub rts_cts: bool,

    // --- Protocol ---
    /// Per-command timeout (seconds)
    pub command_timeout_secs: u64,
    pub commands: CommandSets,
    /// Command that aborts an outgoing call
    pub cancel_outgoing: String,

    // --- Data calls ---
    pub data_call: DataCallConfig,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            channels: ChannelPaths::default(),
            baud_rate: 115_200,
            rts_cts: true,
            command_timeout_secs: 300,
            commands: CommandSets::default(),
            cancel_outgoing: "H".to_string(),
            data_call: DataCallConfig::default(),
        }
    }
}

impl ModemConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let paths = [&self.channels.call, &self.channels.misc, &self.channels.unsolicited];
        if paths.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::Config("channel device path is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be non-zero".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::Config("command_timeout_secs must be non-zero".into()));
        }
        if self.cancel_outgoing.trim().is_empty() {
            return Err(Error::Config("cancel_outgoing is empty".into()));
        }
        if self.data_call.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(Error::Config("data_call.program is empty".into()));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
