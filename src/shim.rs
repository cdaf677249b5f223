//! Per-connection compatibility state: the firmware version, the vehicle's mode table, and
//! everything derived from them.

use crate::{
    collab::{
        ComponentSource, MissionCommandOverrides, ParameterMetaDataSource,
        MISSION_COMMAND_OVERRIDES,
    },
    config::AdjusterConfig,
    modes::{ModeTable, VehicleKind},
    protocol::{
        BaseMode, CommandLong, MavMessage, ParamId, RequestDataStream, SetMode,
        MAV_CMD_DO_PAUSE_CONTINUE,
    },
    version::VersionInfo,
    CompatError, INTERNAL_PARAMETER_METADATA_FILE,
};
use bitflags::bitflags;
use core::fmt;
use heapless::{FnvIndexMap, Vec};
use log::*;

/// Shown for a mode we can't decode.
pub const UNKNOWN_MODE_NAME: &str = "unknown";

/// Number of parameter writes tracked at once. Must be a power of 2.
pub const MAX_PENDING_PARAM_WRITES: usize = 8;

/// Oldest firmware this crate is tested against; older versions still work but log a warning.
pub const MIN_SUPPORTED_VERSION: (u32, u32, u32) = (3, 3, 0);

/// Names for the standard MAV_MODE_FLAG bits, used when custom mode is off. Checked in order.
const FIXED_BASE_MODES: [(BaseMode, &str); 4] = [
    (BaseMode::AUTO_ENABLED, "Auto"),
    (BaseMode::GUIDED_ENABLED, "Guided"),
    (BaseMode::STABILIZE_ENABLED, "Stabilized"),
    (BaseMode::MANUAL_INPUT_ENABLED, "Manual"),
];

bitflags! {
    /// Features the host may ask about before offering them to the operator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FirmwareCapabilities: u32 {
        const SET_FLIGHT_MODE = 1;
        const PREFLIGHT_STORAGE = 2;
        const PAUSE_VEHICLE = 4;
        const GUIDED_MODE = 8;
    }
}

/// Whether STATUSTEXT severities need remapping from the legacy APM scale.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityAdjustment {
    /// No version known yet. Treated as legacy.
    Unknown,
    LegacyAdjustNeeded,
    ModernNoAdjust,
}

impl SeverityAdjustment {
    pub fn needs_adjustment(&self) -> bool {
        !matches!(self, Self::ModernNoAdjust)
    }
}

/// Where the last change of the version parameter came from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionChangeOrigin {
    /// Confirms a PARAM_SET we saw go out.
    LocalWrite,
    External,
}

/// The result of decoding the heartbeat mode fields.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedMode {
    Known(&'static str),
    Unknown { base_mode: u8, custom_mode: u32 },
}

impl DecodedMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Known(name) => *name,
            Self::Unknown { .. } => UNKNOWN_MODE_NAME,
        }
    }
}

impl fmt::Display for DecodedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(name) => f.write_str(name),
            Self::Unknown {
                base_mode,
                custom_mode,
            } => write!(
                f,
                "{} (base {:#04x}, custom {})",
                UNKNOWN_MODE_NAME, base_mode, custom_mode
            ),
        }
    }
}

/// System and component a command is addressed to.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleTarget {
    pub system_id: u8,
    pub component_id: u8,
}

/// Compatibility context for one connected vehicle. Owned by the task that owns the
/// vehicle's message stream; the mode table is shared static data.
#[derive(Debug)]
pub struct CompatibilityShim {
    kind: VehicleKind,
    modes: &'static ModeTable,
    config: AdjusterConfig,
    version: VersionInfo,
    severity: SeverityAdjustment,
    current_mode: Option<DecodedMode>,
    pub(crate) pending_param_writes: FnvIndexMap<ParamId, f32, MAX_PENDING_PARAM_WRITES>,
    pub(crate) last_version_change: Option<VersionChangeOrigin>,
}

impl CompatibilityShim {
    pub fn new(kind: VehicleKind) -> Self {
        Self::with_config(kind, AdjusterConfig::default())
    }

    pub fn with_config(kind: VehicleKind, config: AdjusterConfig) -> Self {
        Self {
            kind,
            modes: kind.mode_table(),
            config,
            version: VersionInfo::unknown(),
            severity: SeverityAdjustment::Unknown,
            current_mode: None,
            pending_param_writes: FnvIndexMap::new(),
            last_version_change: None,
        }
    }

    pub fn copter() -> Self {
        Self::new(VehicleKind::Copter)
    }

    pub fn plane() -> Self {
        Self::new(VehicleKind::Plane)
    }

    pub fn rover() -> Self {
        Self::new(VehicleKind::Rover)
    }

    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    pub fn mode_table(&self) -> &'static ModeTable {
        self.modes
    }

    pub fn config(&self) -> &AdjusterConfig {
        &self.config
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn severity_adjustment(&self) -> SeverityAdjustment {
        self.severity
    }

    /// True until a version at or above the fixed-severity release is known.
    pub fn needs_legacy_severity_adjustment(&self) -> bool {
        self.severity.needs_adjustment()
    }

    /// Mode decoded from the most recent heartbeat, if any.
    pub fn current_mode(&self) -> Option<DecodedMode> {
        self.current_mode
    }

    pub fn last_version_change(&self) -> Option<VersionChangeOrigin> {
        self.last_version_change
    }

    /// Replace the held version and recompute what depends on it.
    pub fn set_version(&mut self, version: VersionInfo) {
        self.severity = if version.is_valid() {
            if is_text_severity_adjustment_needed(&version) {
                SeverityAdjustment::LegacyAdjustNeeded
            } else {
                SeverityAdjustment::ModernNoAdjust
            }
        } else {
            SeverityAdjustment::Unknown
        };
        debug!("firmware version {} -> {:?}", version, self.severity);
        if let Some((major, minor, patch)) = version.triple() {
            if (major, minor, patch) < MIN_SUPPORTED_VERSION {
                warn!(
                    "firmware {}.{}.{} is older than the oldest supported version {}.{}.{}",
                    major,
                    minor,
                    patch,
                    MIN_SUPPORTED_VERSION.0,
                    MIN_SUPPORTED_VERSION.1,
                    MIN_SUPPORTED_VERSION.2
                );
            }
        }
        self.version = version;
    }

    pub(crate) fn set_current_mode(&mut self, mode: DecodedMode) {
        if self.current_mode != Some(mode) {
            debug!("flight mode now {:?}", mode);
        }
        self.current_mode = Some(mode);
    }

    /// Reset to the connection defaults and build the stream rate requests that start
    /// telemetry. Call before any message from the vehicle is adjusted.
    pub fn initialize_vehicle(&mut self, target: VehicleTarget) -> Vec<MavMessage, 7> {
        self.version = VersionInfo::unknown();
        self.severity = SeverityAdjustment::Unknown;
        self.current_mode = None;
        self.pending_param_writes.clear();
        self.last_version_change = None;

        let mut requests = Vec::new();
        for (stream_id, rate_hz) in self.config.stream_rates.iter() {
            // 7 streams into a 7 slot vec.
            let _ = requests.push(MavMessage::RequestDataStream(RequestDataStream {
                target_system: target.system_id,
                target_component: target.component_id,
                stream_id,
                rate_hz,
                start: rate_hz > 0,
            }));
        }
        requests
    }

    /// Every capability the connected firmware supports.
    pub fn supported_capabilities(&self) -> FirmwareCapabilities {
        let v = &self.version;
        let (pause, guided) = match self.kind {
            // Pausing uses Brake mode, added in 3.3.
            VehicleKind::Copter => (v.at_least(3, 3, 0), v.at_least(3, 2, 0)),
            VehicleKind::Plane => (true, v.at_least(3, 4, 0)),
            VehicleKind::Rover => (true, v.at_least(3, 0, 0)),
        };
        let mut caps =
            FirmwareCapabilities::SET_FLIGHT_MODE | FirmwareCapabilities::PREFLIGHT_STORAGE;
        caps.set(FirmwareCapabilities::PAUSE_VEHICLE, pause);
        caps.set(FirmwareCapabilities::GUIDED_MODE, guided);
        caps
    }

    /// True if all requested capabilities are supported.
    pub fn is_capable(&self, requested: FirmwareCapabilities) -> bool {
        self.supported_capabilities().contains(requested)
    }

    /// Like `is_capable`, for raw bits from the host. Bits this crate doesn't know are an
    /// `UnrecognizedCapability`.
    pub fn check_capability_bits(&self, bits: u32) -> Result<bool, CompatError> {
        let requested = FirmwareCapabilities::from_bits(bits)
            .ok_or(CompatError::UnrecognizedCapability(bits))?;
        Ok(self.is_capable(requested))
    }

    /// Unknown bits report the capability absent.
    pub fn is_capable_bits(&self, bits: u32) -> bool {
        match self.check_capability_bits(bits) {
            Ok(capable) => capable,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Decode heartbeat mode fields.
    pub fn decode_mode(&self, base_mode: u8, custom_mode: u32) -> DecodedMode {
        let flags = BaseMode::from_bits_truncate(base_mode);
        if flags.contains(BaseMode::CUSTOM_MODE_ENABLED) {
            return match self.modes.lookup(custom_mode) {
                Ok(name) => DecodedMode::Known(name),
                Err(e) => {
                    warn!("{:?}: {}", self.kind, e);
                    DecodedMode::Unknown {
                        base_mode,
                        custom_mode,
                    }
                }
            };
        }
        FIXED_BASE_MODES
            .iter()
            .find(|(flag, _)| flags.contains(*flag))
            .map(|(_, name)| DecodedMode::Known(*name))
            .unwrap_or(DecodedMode::Unknown {
                base_mode,
                custom_mode,
            })
    }

    /// Mode name for display. Unrecognized combinations give [`UNKNOWN_MODE_NAME`].
    pub fn flight_mode_name(&self, base_mode: u8, custom_mode: u32) -> &'static str {
        self.decode_mode(base_mode, custom_mode).name()
    }

    /// Modes an operator can choose from, most common first.
    pub fn flight_modes(&self) -> impl Iterator<Item = &'static str> {
        let modes: &'static ModeTable = self.modes;
        modes.settable_modes()
    }

    /// `(base_mode, custom_mode)` to request `name`. Table modes win over the fixed base
    /// mode names.
    pub fn encode_flight_mode(&self, name: &str) -> Result<(BaseMode, u32), CompatError> {
        if let Ok(code) = self.modes.encode(name) {
            return Ok((BaseMode::CUSTOM_MODE_ENABLED, code));
        }
        FIXED_BASE_MODES
            .iter()
            .find(|(_, fixed)| *fixed == name)
            .map(|(flag, _)| (*flag, 0))
            .ok_or(CompatError::UnrecognizedModeName)
    }

    /// A SET_MODE message requesting `name`.
    pub fn set_mode_message(
        &self,
        target: VehicleTarget,
        name: &str,
    ) -> Result<MavMessage, CompatError> {
        let (base_mode, custom_mode) = self.encode_flight_mode(name)?;
        Ok(MavMessage::SetMode(SetMode {
            target_system: target.system_id,
            base_mode: base_mode.bits(),
            custom_mode,
        }))
    }

    /// True iff the last decoded heartbeat mode is the table's guided mode.
    pub fn is_guided_mode_active(&self) -> bool {
        matches!(self.current_mode, Some(DecodedMode::Known(name)) if name == self.modes.guided_mode_name())
    }

    /// The message that pauses this kind of vehicle in place.
    pub fn pause_command_for(&self, target: VehicleTarget) -> Result<MavMessage, CompatError> {
        match self.kind {
            VehicleKind::Copter => self.set_mode_message(target, "Brake"),
            VehicleKind::Plane => self.set_mode_message(target, "Loiter"),
            VehicleKind::Rover => Ok(MavMessage::CommandLong(CommandLong {
                target_system: target.system_id,
                target_component: target.component_id,
                command: MAV_CMD_DO_PAUSE_CONTINUE,
                confirmation: 0,
                // param1 0 = pause, 1 = continue
                params: [0.0; 7],
            })),
        }
    }

    /// `None`: all joystick buttons are reserved for the firmware.
    pub fn manual_control_reserved_button_count(&self) -> Option<u8> {
        None
    }

    /// APM expects the home position as the first mission item.
    pub fn send_home_position_to_vehicle(&self) -> bool {
        true
    }

    /// Empty means every mission command is supported.
    pub fn supported_mission_commands(&self) -> &'static [u16] {
        &[]
    }

    pub fn mission_command_overrides(&self) -> MissionCommandOverrides {
        MISSION_COMMAND_OVERRIDES
    }

    pub fn components_for_vehicle<'a, S: ComponentSource>(
        &self,
        source: &'a S,
    ) -> &'a [S::Component] {
        source.components(self.kind)
    }

    /// Format version of the embedded parameter metadata.
    pub fn parameter_metadata_version<S: ParameterMetaDataSource>(&self, source: &S) -> (u32, u32) {
        source.metadata_version(INTERNAL_PARAMETER_METADATA_FILE)
    }

    /// Load parameter metadata from `metadata_file`, or the embedded file if `None`.
    pub fn load_parameter_metadata<S: ParameterMetaDataSource>(
        &self,
        source: &S,
        metadata_file: Option<&str>,
    ) -> S::MetaData {
        source.load(metadata_file.unwrap_or(INTERNAL_PARAMETER_METADATA_FILE))
    }

    pub fn add_metadata_to_fact<S: ParameterMetaDataSource>(
        &self,
        source: &S,
        metadata: &S::MetaData,
        fact: &mut S::Fact,
        mav_type: u8,
    ) {
        source.add_to_fact(metadata, fact, mav_type)
    }
}

/// Whether STATUSTEXT from this firmware uses the legacy severity scale. An invalid version
/// is assumed legacy.
pub fn is_text_severity_adjustment_needed(version: &VersionInfo) -> bool {
    if !version.is_valid() {
        return true;
    }
    match VehicleKind::from_firmware_label(version.vehicle_type()) {
        Some(VehicleKind::Copter) => !version.at_least(3, 4, 0),
        Some(VehicleKind::Plane) => !version.at_least(3, 4, 2),
        Some(VehicleKind::Rover) => !version.at_least(2, 6, 0),
        None => false,
    }
}
