//! The MAVLink messages this crate inspects or rewrites, already decoded by an external codec.
//!
//! Only the fields the compatibility rules touch are modelled. Everything else travels as
//! `MavMessage::Other` and is never modified.

use bitflags::bitflags;
use heapless::String;

/// PARAM_ID is a fixed 16 byte char array on the wire.
pub const PARAM_ID_LEN: usize = 16;
/// STATUSTEXT text is a fixed 50 byte char array on the wire.
pub const STATUS_TEXT_LEN: usize = 50;
/// PARAM_EXT_VALUE / PARAM_EXT_SET value field.
pub const PARAM_EXT_VALUE_LEN: usize = 128;

pub type ParamId = String<PARAM_ID_LEN>;

pub const MSG_ID_HEARTBEAT: u32 = 0;
pub const MSG_ID_PARAM_VALUE: u32 = 22;
pub const MSG_ID_PARAM_SET: u32 = 23;
pub const MSG_ID_REQUEST_DATA_STREAM: u32 = 66;
pub const MSG_ID_COMMAND_LONG: u32 = 76;
pub const MSG_ID_SET_MODE: u32 = 11;
pub const MSG_ID_STATUSTEXT: u32 = 253;
pub const MSG_ID_PARAM_EXT_VALUE: u32 = 322;

/// MAV_CMD_DO_SET_MODE
pub const MAV_CMD_DO_SET_MODE: u16 = 176;
/// MAV_CMD_DO_PAUSE_CONTINUE
pub const MAV_CMD_DO_PAUSE_CONTINUE: u16 = 193;

bitflags! {
    /// MAV_MODE_FLAG, the `base_mode` field of HEARTBEAT and SET_MODE.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BaseMode: u8 {
        const CUSTOM_MODE_ENABLED = 1;
        const TEST_ENABLED = 2;
        const AUTO_ENABLED = 4;
        const GUIDED_ENABLED = 8;
        const STABILIZE_ENABLED = 16;
        const HIL_ENABLED = 32;
        const MANUAL_INPUT_ENABLED = 64;
        const SAFETY_ARMED = 128;
    }
}

/// MAV_SEVERITY, the modern STATUSTEXT severity scale. Lower is more severe.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MavSeverity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl MavSeverity {
    pub fn val(&self) -> u8 {
        *self as u8
    }

    /// Out of range values are clamped to `Debug`, the least severe level.
    pub fn from_val(val: u8) -> Self {
        match val {
            0 => Self::Emergency,
            1 => Self::Alert,
            2 => Self::Critical,
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Severity numbering used by APM firmware before it adopted MAV_SEVERITY.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApmLegacySeverity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
    UserResponse = 5,
}

impl ApmLegacySeverity {
    pub fn from_val(val: u8) -> Option<Self> {
        match val {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            4 => Some(Self::Critical),
            5 => Some(Self::UserResponse),
            _ => None,
        }
    }

    /// The modern severity an operator should see for this legacy level.
    pub fn to_modern(self) -> MavSeverity {
        match self {
            Self::Low => MavSeverity::Info,
            Self::Medium => MavSeverity::Warning,
            Self::High => MavSeverity::Alert,
            Self::Critical => MavSeverity::Critical,
            Self::UserResponse => MavSeverity::Info,
        }
    }
}

/// MAV_PARAM_TYPE
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Real32,
    Real64,
    Other(u8),
}

impl ParamType {
    pub fn val(&self) -> u8 {
        match self {
            Self::Uint8 => 1,
            Self::Int8 => 2,
            Self::Uint16 => 3,
            Self::Int16 => 4,
            Self::Uint32 => 5,
            Self::Int32 => 6,
            Self::Uint64 => 7,
            Self::Int64 => 8,
            Self::Real32 => 9,
            Self::Real64 => 10,
            Self::Other(val) => *val,
        }
    }

    pub fn from_val(val: u8) -> Self {
        match val {
            1 => Self::Uint8,
            2 => Self::Int8,
            3 => Self::Uint16,
            4 => Self::Int16,
            5 => Self::Uint32,
            6 => Self::Int32,
            7 => Self::Uint64,
            8 => Self::Int64,
            9 => Self::Real32,
            10 => Self::Real64,
            _ => Self::Other(val),
        }
    }
}

/// Telemetry stream ids for REQUEST_DATA_STREAM (MAV_DATA_STREAM).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataStream {
    RawSensors = 1,
    ExtendedStatus = 2,
    RcChannels = 3,
    Position = 6,
    Extra1 = 10,
    Extra2 = 11,
    Extra3 = 12,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub custom_mode: u32,
    /// MAV_TYPE
    pub mav_type: u8,
    /// MAV_AUTOPILOT
    pub autopilot: u8,
    /// Raw MAV_MODE_FLAG bits, see [`BaseMode`].
    pub base_mode: u8,
    pub system_status: u8,
}

impl Heartbeat {
    pub fn base_mode_flags(&self) -> BaseMode {
        BaseMode::from_bits_truncate(self.base_mode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusText {
    /// Raw severity. MAV_SEVERITY on modern firmware, [`ApmLegacySeverity`] on old APM.
    pub severity: u8,
    pub text: String<STATUS_TEXT_LEN>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamValue {
    pub param_id: ParamId,
    pub param_value: f32,
    pub param_type: ParamType,
    pub param_count: u16,
    pub param_index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamExtValue {
    pub param_id: ParamId,
    pub param_value: String<PARAM_EXT_VALUE_LEN>,
    pub param_count: u16,
    pub param_index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    pub target_system: u8,
    pub target_component: u8,
    pub param_id: ParamId,
    pub param_value: f32,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetMode {
    pub target_system: u8,
    pub base_mode: u8,
    pub custom_mode: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandLong {
    pub target_system: u8,
    pub target_component: u8,
    pub command: u16,
    pub confirmation: u8,
    pub params: [f32; 7],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestDataStream {
    pub target_system: u8,
    pub target_component: u8,
    pub stream_id: DataStream,
    pub rate_hz: u16,
    pub start: bool,
}

/// The message kinds the adjuster distinguishes. Add a variant here to teach the adjuster a
/// new kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MavMessage {
    Heartbeat(Heartbeat),
    StatusText(StatusText),
    ParamValue(ParamValue),
    ParamExtValue(ParamExtValue),
    ParamSet(ParamSet),
    SetMode(SetMode),
    CommandLong(CommandLong),
    RequestDataStream(RequestDataStream),
    /// Any other message, by MAVLink message id. Passed through untouched.
    Other(u32),
}

impl MavMessage {
    pub fn id(&self) -> u32 {
        match self {
            Self::Heartbeat(_) => MSG_ID_HEARTBEAT,
            Self::StatusText(_) => MSG_ID_STATUSTEXT,
            Self::ParamValue(_) => MSG_ID_PARAM_VALUE,
            Self::ParamExtValue(_) => MSG_ID_PARAM_EXT_VALUE,
            Self::ParamSet(_) => MSG_ID_PARAM_SET,
            Self::SetMode(_) => MSG_ID_SET_MODE,
            Self::CommandLong(_) => MSG_ID_COMMAND_LONG,
            Self::RequestDataStream(_) => MSG_ID_REQUEST_DATA_STREAM,
            Self::Other(id) => *id,
        }
    }
}

/// Copy `text` into a fixed-capacity string, dropping whatever doesn't fit.
pub fn bounded<const N: usize>(text: &str) -> String<N> {
    let mut s = String::new();
    for c in text.chars() {
        if s.push(c).is_err() {
            break;
        }
    }
    s
}

/// Copy a parameter name into the fixed wire-size id.
pub fn param_id(name: &str) -> ParamId {
    bounded(name)
}
