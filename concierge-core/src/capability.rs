//! Bitmask permission matcher.
//!
//! A grant is persisted as a fixed-width, three character bit string ordered
//! read, write, execute (`"101"` grants read and execute). A request names one
//! of six [`PermissionLabel`]s; each label carries a required-bit mask and a
//! capability satisfies the label when every required bit is set. Bits the
//! label does not mention are unconstrained.

use crate::error::CapabilityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Read bit, string position 0.
pub const READ: u8 = 0b001;
/// Write bit, string position 1.
pub const WRITE: u8 = 0b010;
/// Execute bit, string position 2.
pub const EXECUTE: u8 = 0b100;

const WIDTH: usize = 3;

/// Permission a caller asks to exercise on a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionLabel {
    /// Read (`r`).
    #[serde(rename = "r")]
    Read,
    /// Write (`w`).
    #[serde(rename = "w")]
    Write,
    /// Execute (`x`).
    #[serde(rename = "x")]
    Execute,
    /// Read and write (`rw`).
    #[serde(rename = "rw")]
    ReadWrite,
    /// Read and execute (`rx`).
    #[serde(rename = "rx")]
    ReadExecute,
    /// Write and execute (`wx`).
    #[serde(rename = "wx")]
    WriteExecute,
}

impl PermissionLabel {
    /// Every label, in declaration order.
    pub const ALL: [PermissionLabel; 6] = [
        PermissionLabel::Read,
        PermissionLabel::Write,
        PermissionLabel::Execute,
        PermissionLabel::ReadWrite,
        PermissionLabel::ReadExecute,
        PermissionLabel::WriteExecute,
    ];

    /// Bits that must be set in a capability for this label to match.
    pub const fn required_mask(self) -> u8 {
        match self {
            PermissionLabel::Read => READ,
            PermissionLabel::Write => WRITE,
            PermissionLabel::Execute => EXECUTE,
            PermissionLabel::ReadWrite => READ | WRITE,
            PermissionLabel::ReadExecute => READ | EXECUTE,
            PermissionLabel::WriteExecute => WRITE | EXECUTE,
        }
    }

    /// Wire name of the label.
    pub const fn as_str(self) -> &'static str {
        match self {
            PermissionLabel::Read => "r",
            PermissionLabel::Write => "w",
            PermissionLabel::Execute => "x",
            PermissionLabel::ReadWrite => "rw",
            PermissionLabel::ReadExecute => "rx",
            PermissionLabel::WriteExecute => "wx",
        }
    }
}

impl FromStr for PermissionLabel {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(PermissionLabel::Read),
            "w" => Ok(PermissionLabel::Write),
            "x" => Ok(PermissionLabel::Execute),
            "rw" => Ok(PermissionLabel::ReadWrite),
            "rx" => Ok(PermissionLabel::ReadExecute),
            "wx" => Ok(PermissionLabel::WriteExecute),
            _ => Err(CapabilityError::UnknownLabel(s.to_string())),
        }
    }
}

impl fmt::Display for PermissionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed three-bit capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability(u8);

impl Capability {
    /// Read, write and execute.
    pub const FULL: Capability = Capability(READ | WRITE | EXECUTE);
    /// Nothing granted.
    pub const NONE: Capability = Capability(0);

    /// Build a capability from individual bits.
    pub const fn new(read: bool, write: bool, execute: bool) -> Self {
        let mut bits = 0;
        if read {
            bits |= READ;
        }
        if write {
            bits |= WRITE;
        }
        if execute {
            bits |= EXECUTE;
        }
        Capability(bits)
    }

    /// Parse the persisted bit-string encoding.
    ///
    /// Anything other than exactly three `0`/`1` characters is rejected.
    pub fn parse(encoded: &str) -> Result<Self, CapabilityError> {
        let raw = encoded.as_bytes();
        if raw.len() != WIDTH {
            return Err(CapabilityError::Malformed(encoded.to_string()));
        }

        let mut bits = 0u8;
        for (position, byte) in raw.iter().enumerate() {
            match byte {
                b'1' => bits |= 1 << position,
                b'0' => {}
                _ => return Err(CapabilityError::Malformed(encoded.to_string())),
            }
        }
        Ok(Capability(bits))
    }

    /// Raw bit set.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit the label requires is set.
    pub const fn grants(self, label: PermissionLabel) -> bool {
        let mask = label.required_mask();
        self.0 & mask == mask
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::parse(s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for position in 0..WIDTH {
            let set = self.0 & (1 << position) != 0;
            f.write_str(if set { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Match a requested label against a stored capability string.
///
/// # Errors
///
/// Returns [`CapabilityError::Malformed`] when `capability` is not a
/// three-character bit string; a malformed grant never matches or mismatches.
///
/// # Examples
///
/// ```rust
/// use concierge_core::capability::{matches, PermissionLabel};
///
/// assert!(matches(PermissionLabel::ReadWrite, "110").unwrap());
/// assert!(!matches(PermissionLabel::ReadWrite, "100").unwrap());
/// assert!(matches(PermissionLabel::Execute, "001").unwrap());
/// assert!(matches(PermissionLabel::Read, "10").is_err());
/// ```
pub fn matches(label: PermissionLabel, capability: &str) -> Result<bool, CapabilityError> {
    Ok(Capability::parse(capability)?.grants(label))
}
