//! Data-call helper adapter.
//!
//! Implements [`DataCallPort`] by spawning the configured program (a PPP
//! daemon, typically) on the serial device.  A waiter thread reports the
//! helper's exit to the I/O loop through the control channel.

use std::process::{Child, Command};
use std::sync::mpsc;

use log::{info, warn};

use crate::app::ports::{DataCallError, DataCallPort};
use crate::config::DataCallConfig;
use crate::io_task::{self, ControlMsg};

/// Placeholder in [`DataCallConfig::args`] for the device path.
pub const DEVICE_PLACEHOLDER: &str = "{device}";

pub struct ProcessDataCall {
    config: DataCallConfig,
}

impl ProcessDataCall {
    pub fn new(config: DataCallConfig) -> Self {
        Self { config }
    }

    /// Program and arguments for `device`, or `None` when unconfigured.
    pub fn command_line(&self, device: &str) -> Option<(String, Vec<String>)> {
        let program = self.config.program.clone()?;
        let args = self
            .config
            .args
            .iter()
            .map(|a| a.replace(DEVICE_PLACEHOLDER, device))
            .collect();
        Some((program, args))
    }
}

impl DataCallPort for ProcessDataCall {
    fn launch(&mut self, device: &str, call_id: u8) -> Result<(), DataCallError> {
        let (program, args) = self.command_line(device).ok_or(DataCallError::NotConfigured)?;

        // The waiter owns both control messages, so the link is suspended
        // before it is resumed and neither message can be dropped.
        let (hand_over, child_rx) = mpsc::channel::<Child>();
        let waiter_device = device.to_string();
        std::thread::Builder::new()
            .name(format!("data-call-{call_id}"))
            .spawn(move || {
                let Ok(mut child) = child_rx.recv() else {
                    return;
                };
                io_task::send_blocking(ControlMsg::DataCallStarted {
                    device: waiter_device.clone(),
                });
                match child.wait() {
                    Ok(status) => info!("data call {}: helper exited with {}", call_id, status),
                    Err(e) => warn!("data call {}: wait failed: {}", call_id, e),
                }
                io_task::send_blocking(ControlMsg::DataCallEnded {
                    call: call_id,
                    device: waiter_device,
                });
            })
            .map_err(|e| DataCallError::Spawn(e.to_string()))?;

        let child = Command::new(&program)
            .args(&args)
            .spawn()
            .map_err(|e| DataCallError::Spawn(e.to_string()))?;
        info!("data call {}: started {} (pid {}) on {}", call_id, program, child.id(), device);

        if let Err(mpsc::SendError(mut child)) = hand_over.send(child) {
            warn!("data call {}: waiter gone, stopping helper", call_id);
            let _ = child.kill();
            let _ = child.wait();
            return Err(DataCallError::Spawn("helper waiter exited".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_is_substituted() {
        let port = ProcessDataCall::new(DataCallConfig {
            program: Some("pppd".into()),
            args: vec!["{device}".into(), "115200".into(), "call".into(), "gprs".into()],
        });
        let (program, args) = port.command_line("/dev/ttySAC0").unwrap();
        assert_eq!(program, "pppd");
        assert_eq!(args, ["/dev/ttySAC0", "115200", "call", "gprs"]);
    }

    #[test]
    fn unconfigured_launch_fails() {
        let mut port = ProcessDataCall::new(DataCallConfig::default());
        assert_eq!(port.launch("/dev/null", 1), Err(DataCallError::NotConfigured));
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let mut port = ProcessDataCall::new(DataCallConfig {
            program: Some("/nonexistent/gsmd-helper".into()),
            args: vec![],
        });
        assert!(matches!(port.launch("/dev/null", 1), Err(DataCallError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn helper_suspends_then_resumes_the_link() {
        let mut port = ProcessDataCall::new(DataCallConfig {
            program: Some("true".into()),
            args: vec![],
        });
        port.launch("/dev/ttyDATA", 2).unwrap();
        let started = futures_lite::future::block_on(io_task::CONTROL.receive());
        assert_eq!(started, ControlMsg::DataCallStarted { device: "/dev/ttyDATA".into() });
        let ended = futures_lite::future::block_on(io_task::CONTROL.receive());
        assert_eq!(ended, ControlMsg::DataCallEnded { call: 2, device: "/dev/ttyDATA".into() });
    }
}
