//! Seams to the services this crate calls but doesn't implement: parameter metadata
//! loading and the vehicle component model. Their payloads are opaque here.

use crate::modes::VehicleKind;

/// Loads parameter metadata (descriptions, ranges, units) from a metadata file.
pub trait ParameterMetaDataSource {
    type MetaData;
    type Fact;

    /// `(major, minor)` version of the metadata file format.
    fn metadata_version(&self, metadata_file: &str) -> (u32, u32);

    fn load(&self, metadata_file: &str) -> Self::MetaData;

    /// Bind the metadata for one parameter onto a fact. `mav_type` is the heartbeat MAV_TYPE.
    fn add_to_fact(&self, metadata: &Self::MetaData, fact: &mut Self::Fact, mav_type: u8);
}

/// Supplies the setup components (radio, sensors, flight modes, ...) shown for a vehicle.
pub trait ComponentSource {
    type Component;

    fn components(&self, kind: VehicleKind) -> &[Self::Component];
}

/// JSON resources with mission command metadata that override the generic ones.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionCommandOverrides {
    pub common: &'static str,
    pub fixed_wing: &'static str,
    pub multi_rotor: &'static str,
}

pub const MISSION_COMMAND_OVERRIDES: MissionCommandOverrides = MissionCommandOverrides {
    common: ":/json/APM/MavCmdInfoCommon.json",
    fixed_wing: ":/json/APM/MavCmdInfoFixedWing.json",
    multi_rotor: ":/json/APM/MavCmdInfoMultiRotor.json",
};
