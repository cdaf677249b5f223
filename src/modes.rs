//! ArduPilot custom flight modes, one fixed table per vehicle kind.
//!
//! Reference: https://ardupilot.org/copter/docs/parameters.html#fltmode1
//! (and the Plane / Rover equivalents). Table order is the order modes are offered to an
//! operator, most common first.

use crate::CompatError;
use log::*;

/// The vehicle families that run ArduPilot firmware with distinct mode numbering.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleKind {
    Copter,
    Plane,
    Rover,
}

impl VehicleKind {
    /// Map the heartbeat `MAV_TYPE` to the firmware family. Returns `None` for vehicle
    /// types ArduPilot doesn't build (or that this crate doesn't know).
    pub fn from_mav_type(mav_type: u8) -> Option<Self> {
        match mav_type {
            // MAV_TYPE_FIXED_WING, VTOL_DUOROTOR, VTOL_QUADROTOR, VTOL_TILTROTOR
            1 | 19 | 20 | 21 => Some(Self::Plane),
            // MAV_TYPE_QUADROTOR, COAXIAL, HELICOPTER, HEXAROTOR, OCTOROTOR, TRICOPTER
            2 | 3 | 4 | 13 | 14 | 15 => Some(Self::Copter),
            // MAV_TYPE_GROUND_ROVER, SURFACE_BOAT
            10 | 11 => Some(Self::Rover),
            _ => None,
        }
    }

    /// The label the firmware puts in front of its version number.
    pub fn firmware_label(&self) -> &'static str {
        match self {
            Self::Copter => "ArduCopter",
            Self::Plane => "ArduPlane",
            Self::Rover => "ArduRover",
        }
    }

    /// Classify a version label such as `APM:Copter` or `ArduPlane`.
    pub fn from_firmware_label(label: &str) -> Option<Self> {
        use crate::version::contains_ignore_ascii_case as has;
        if has(label, "copter") {
            Some(Self::Copter)
        } else if has(label, "plane") {
            Some(Self::Plane)
        } else if has(label, "rover") {
            Some(Self::Rover)
        } else {
            None
        }
    }

    pub fn mode_table(&self) -> &'static ModeTable {
        match self {
            Self::Copter => &COPTER_MODES,
            Self::Plane => &PLANE_MODES,
            Self::Rover => &ROVER_MODES,
        }
    }
}

/// One entry of a mode table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomMode {
    /// Value of the heartbeat `custom_mode` field.
    pub code: u32,
    pub name: &'static str,
    /// False for modes only the autopilot enters itself (failsafes, initialization).
    pub settable: bool,
}

impl CustomMode {
    const fn new(code: u32, name: &'static str, settable: bool) -> Self {
        Self {
            code,
            name,
            settable,
        }
    }
}

/// A fixed, immutable set of custom modes with unique codes and names.
#[derive(Debug)]
pub struct ModeTable {
    kind: VehicleKind,
    entries: &'static [CustomMode],
    guided: &'static str,
}

impl ModeTable {
    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    pub fn entries(&self) -> &'static [CustomMode] {
        self.entries
    }

    /// Name of the mode that accepts external navigation targets.
    pub fn guided_mode_name(&self) -> &'static str {
        self.guided
    }

    /// Name bound to `code`, or `UnknownModeCode` so the caller can show the raw value.
    pub fn lookup(&self, code: u32) -> Result<&'static str, CompatError> {
        self.entries
            .iter()
            .find(|m| m.code == code)
            .map(|m| m.name)
            .ok_or(CompatError::UnknownModeCode(code))
    }

    /// Inverse of `lookup`.
    pub fn encode(&self, name: &str) -> Result<u32, CompatError> {
        match self.entries.iter().find(|m| m.name == name) {
            Some(m) => Ok(m.code),
            None => {
                debug!("{:?} has no mode named {}", self.kind, name);
                Err(CompatError::UnrecognizedModeName)
            }
        }
    }

    /// Modes an operator may select, in table order.
    pub fn settable_modes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().filter(|m| m.settable).map(|m| m.name)
    }
}

pub static COPTER_MODES: ModeTable = ModeTable {
    kind: VehicleKind::Copter,
    guided: "Guided",
    entries: &[
        CustomMode::new(0, "Stabilize", true),
        CustomMode::new(1, "Acro", true),
        CustomMode::new(2, "Altitude Hold", true),
        CustomMode::new(3, "Auto", true),
        CustomMode::new(4, "Guided", true),
        CustomMode::new(5, "Loiter", true),
        CustomMode::new(6, "RTL", true),
        CustomMode::new(7, "Circle", true),
        // Superseded by Position Hold; still reported by old firmware.
        CustomMode::new(8, "Position", false),
        CustomMode::new(9, "Land", true),
        CustomMode::new(10, "Optical Flow Loiter", false),
        CustomMode::new(11, "Drift", true),
        CustomMode::new(13, "Sport", true),
        CustomMode::new(14, "Flip", true),
        CustomMode::new(15, "Autotune", true),
        CustomMode::new(16, "Position Hold", true),
        CustomMode::new(17, "Brake", true),
    ],
};

pub static PLANE_MODES: ModeTable = ModeTable {
    kind: VehicleKind::Plane,
    guided: "Guided",
    entries: &[
        CustomMode::new(0, "Manual", true),
        CustomMode::new(1, "Circle", true),
        CustomMode::new(2, "Stabilize", true),
        CustomMode::new(3, "Training", true),
        CustomMode::new(4, "Acro", true),
        CustomMode::new(5, "FBW A", true),
        CustomMode::new(6, "FBW B", true),
        CustomMode::new(7, "Cruise", true),
        CustomMode::new(8, "Autotune", true),
        CustomMode::new(10, "Auto", true),
        CustomMode::new(11, "RTL", true),
        CustomMode::new(12, "Loiter", true),
        CustomMode::new(15, "Guided", true),
        CustomMode::new(16, "Initializing", false),
        CustomMode::new(17, "QStabilize", true),
        CustomMode::new(18, "QHover", true),
        CustomMode::new(19, "QLoiter", true),
        CustomMode::new(20, "QLand", true),
    ],
};

pub static ROVER_MODES: ModeTable = ModeTable {
    kind: VehicleKind::Rover,
    guided: "Guided",
    entries: &[
        CustomMode::new(0, "Manual", true),
        CustomMode::new(2, "Learning", true),
        CustomMode::new(3, "Steering", true),
        CustomMode::new(4, "Hold", true),
        CustomMode::new(10, "Auto", true),
        CustomMode::new(11, "RTL", true),
        CustomMode::new(15, "Guided", true),
        CustomMode::new(16, "Initializing", false),
    ],
};
