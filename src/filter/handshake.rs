//! Plugin handshake line
//!
//! The first line a plugin writes to stdout announces the protocol it speaks:
//!
//! ```text
//! CORE_VERSION|APP_VERSION|NETWORK|PROTOCOL
//! ```
//!
//! For this release that is `1|1|stdio|jsonrpc`. Anything else is rejected.

use std::fmt;

use crate::error::{CtMonitorError, Result};
use crate::filter::{CORE_PROTOCOL_VERSION, PROTOCOL_VERSION};

const NETWORK: &str = "stdio";
const PROTOCOL: &str = "jsonrpc";

/// A parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub app_version: u32,
    pub network: String,
    pub protocol: String,
}

impl Handshake {
    /// The handshake this build of the monitor speaks.
    pub fn current() -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version: PROTOCOL_VERSION,
            network: NETWORK.to_string(),
            protocol: PROTOCOL.to_string(),
        }
    }

    /// Parse a handshake line.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::FilterHandshake` when the line does not have
    /// four `|`-separated fields or the versions are not integers.
    ///
    /// # Examples
    ///
    /// ```
    /// use ct_monitor::filter::handshake::Handshake;
    ///
    /// let hs = Handshake::parse("1|1|stdio|jsonrpc").unwrap();
    /// assert_eq!(hs, Handshake::current());
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 4 {
            return Err(CtMonitorError::FilterHandshake(format!(
                "malformed handshake line `{}`",
                line
            ))
            .into());
        }

        let version = |field: &str, name: &str| -> Result<u32> {
            field.parse::<u32>().map_err(|_| {
                CtMonitorError::FilterHandshake(format!(
                    "invalid {} version `{}` in handshake",
                    name, field
                ))
                .into()
            })
        };

        Ok(Self {
            core_version: version(parts[0], "core")?,
            app_version: version(parts[1], "protocol")?,
            network: parts[2].to_string(),
            protocol: parts[3].to_string(),
        })
    }

    /// Check that a plugin's handshake matches [`Handshake::current`].
    pub fn verify(&self) -> Result<()> {
        let expected = Self::current();
        if self.core_version != expected.core_version {
            return Err(CtMonitorError::FilterHandshake(format!(
                "incompatible core version {} (expected {})",
                self.core_version, expected.core_version
            ))
            .into());
        }
        if self.app_version != expected.app_version {
            return Err(CtMonitorError::FilterHandshake(format!(
                "incompatible protocol version {} (expected {})",
                self.app_version, expected.app_version
            ))
            .into());
        }
        if self.network != expected.network || self.protocol != expected.protocol {
            return Err(CtMonitorError::FilterHandshake(format!(
                "unsupported transport `{}/{}` (expected `{}/{}`)",
                self.network, self.protocol, expected.network, expected.protocol
            ))
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.core_version, self.app_version, self.network, self.protocol
        )
    }
}
