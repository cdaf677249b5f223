//! Compatibility layer between a generic vehicle model and ArduPilot (APM) firmware.
//!
//! APM firmware releases, and the Copter / Plane / Rover builds of each release, differ in
//! how they encode flight modes, STATUSTEXT severities and parameter values. This crate
//! parses the firmware version, maps custom mode numbers to names, and rewrites messages in
//! both directions so the rest of a ground station can treat every release the same way.
//!
//! Message encoding and decoding is left to an external MAVLink codec; see [`protocol`].
//!
//! ```ignore
//! use apm_compat::{CompatibilityShim, VehicleKind, VehicleTarget};
//!
//! let mut shim = CompatibilityShim::new(VehicleKind::from_mav_type(hb.mav_type)?);
//! for request in shim.initialize_vehicle(VehicleTarget { system_id: 1, component_id: 1 }) {
//!     link.send(request);
//! }
//! while let Some(mut msg) = link.recv() {
//!     shim.adjust_incoming(&mut msg);
//!     // hand msg to the rest of the system
//! }
//! ```

#![no_std]

use core::fmt;

pub mod adjust;
pub mod collab;
pub mod config;
pub mod modes;
pub mod protocol;
pub mod shim;
pub mod version;

pub use adjust::{adjust_incoming, adjust_outgoing};
pub use collab::*;
pub use config::*;
pub use modes::*;
pub use protocol::*;
pub use shim::*;
pub use version::VersionInfo;

/// Parameter holding the vehicle's software type, used as the default component id param.
pub const DEFAULT_COMPONENT_ID_PARAM: &str = "SYSID_SW_TYPE";

/// Parameter that reports the firmware version.
pub const VERSION_PARAM: &str = "SYSID_SW_MREV";

/// Parameter metadata shipped with the application.
pub const INTERNAL_PARAMETER_METADATA_FILE: &str =
    ":/FirmwarePlugin/APM/APMParameterFactMetaData.xml";

/// Errors that can occur in the compatibility layer. All of them are recoverable.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatError {
    InvalidVersionString,
    UnknownModeCode(u32),
    UnrecognizedModeName,
    UnrecognizedCapability(u32),
}

impl fmt::Display for CompatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersionString => f.write_str("invalid firmware version string"),
            Self::UnknownModeCode(code) => write!(f, "unknown custom mode {}", code),
            Self::UnrecognizedModeName => f.write_str("unrecognized mode name"),
            Self::UnrecognizedCapability(bits) => {
                write!(f, "unrecognized capability bits {:#x}", bits)
            }
        }
    }
}
