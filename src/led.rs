//! LED panel control.
//!
//! The LED sketch on the microcontroller reacts to single ASCII bytes:
//!
//! | Byte | Effect                         |
//! |------|--------------------------------|
//! | `R`  | red LED on                     |
//! | `r`  | red LED off                    |
//! | `G`  | green LED on                   |
//! | `g`  | green LED off                  |
//! | `B`  | blink mode                     |
//! | `S`  | fast blink (100 ms)            |
//! | `D`  | default blink speed (500 ms)   |
//!
//! There is no acknowledgement; a write that reaches the port is considered sent.

use crate::adapters::SerialLink;
use crate::error::AppResult;
use clap::ValueEnum;
use tracing::debug;

/// One LED panel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum LedCommand {
    /// Red LED on (`R`)
    RedOn,
    /// Red LED off (`r`)
    RedOff,
    /// Green LED on (`G`)
    GreenOn,
    /// Green LED off (`g`)
    GreenOff,
    /// Toggle blinking
    Blink,
    /// Blink every 100 ms
    SpeedUp,
    /// Blink every 500 ms
    DefaultSpeed,
}

impl LedCommand {
    /// Wire byte for this command.
    pub const fn byte(self) -> u8 {
        match self {
            LedCommand::RedOn => b'R',
            LedCommand::RedOff => b'r',
            LedCommand::GreenOn => b'G',
            LedCommand::GreenOff => b'g',
            LedCommand::Blink => b'B',
            LedCommand::SpeedUp => b'S',
            LedCommand::DefaultSpeed => b'D',
        }
    }

    /// `RedOn` or `RedOff`.
    pub fn red(on: bool) -> Self {
        if on {
            LedCommand::RedOn
        } else {
            LedCommand::RedOff
        }
    }

    /// `GreenOn` or `GreenOff`.
    pub fn green(on: bool) -> Self {
        if on {
            LedCommand::GreenOn
        } else {
            LedCommand::GreenOff
        }
    }
}

/// Sends LED commands over an open link.
pub struct LedPanel {
    link: Box<dyn SerialLink>,
}

impl LedPanel {
    /// Wrap a link opened on the LED sketch port.
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self { link }
    }

    /// Write one command byte.
    pub fn send(&mut self, command: LedCommand) -> AppResult<()> {
        debug!(port = self.link.port_name(), ?command, "LED command");
        self.link.write_all(&[command.byte()])?;
        Ok(())
    }

    /// Write commands in order, stopping at the first failure.
    pub fn send_all(&mut self, commands: &[LedCommand]) -> AppResult<()> {
        for &command in commands {
            self.send(command)?;
        }
        Ok(())
    }

    /// Close the underlying link.
    pub fn close(mut self) -> AppResult<()> {
        self.link.close()?;
        Ok(())
    }
}
