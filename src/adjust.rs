//! Rewrites messages crossing the vehicle link so every supported APM release looks the same
//! to the rest of the system.
//!
//! Both entry points run inline on the task that owns the message stream. They never block,
//! never allocate and never fail: a message we can't make sense of passes through as is.

use crate::{
    modes::VehicleKind,
    protocol::{
        ApmLegacySeverity, Heartbeat, MavMessage, MavSeverity, ParamExtValue, ParamId,
        ParamSet, ParamType, ParamValue, StatusText, PARAM_EXT_VALUE_LEN,
    },
    shim::{CompatibilityShim, VersionChangeOrigin},
    version::{VersionInfo, VEHICLE_TYPE_LEN},
    VERSION_PARAM,
};
use core::fmt::Write;
use heapless::String;
use log::*;

/// MAV_AUTOPILOT_INVALID: the sender is not a flight controller (GCS, gimbal, camera...).
const MAV_AUTOPILOT_INVALID: u8 = 8;

/// Status text that old firmware sends as warnings during sensor calibration.
const CALIBRATION_PREFIXES: [&str; 2] = ["Place vehicle", "Calibration successful"];

/// Room for a vehicle label, a space and the longest value the version parameter can carry.
const LABELED_VERSION_LEN: usize = VEHICLE_TYPE_LEN + 1 + PARAM_EXT_VALUE_LEN;

/// Adjust a message received from the vehicle, before any other handler sees it.
pub fn adjust_incoming(shim: &mut CompatibilityShim, message: &mut MavMessage) {
    trace!("adjust incoming msg id {}", message.id());
    match message {
        MavMessage::Heartbeat(heartbeat) => handle_heartbeat(shim, heartbeat),
        MavMessage::StatusText(status) => handle_status_text(shim, status),
        MavMessage::ParamValue(value) => handle_param_value(shim, value),
        MavMessage::ParamExtValue(value) => handle_param_ext_value(shim, value),
        // Another GCS on the link writing a parameter.
        MavMessage::ParamSet(set) => track_param_write(shim, set),
        _ => {}
    }
}

/// Adjust a message about to be sent to the vehicle.
pub fn adjust_outgoing(shim: &mut CompatibilityShim, message: &mut MavMessage) {
    trace!("adjust outgoing msg id {}", message.id());
    if let MavMessage::ParamSet(set) = message {
        if shim.config().fix_param_encoding {
            set.param_value = bytewise_to_cast(set.param_value, set.param_type);
        }
        track_param_write(shim, set);
    }
}

impl CompatibilityShim {
    pub fn adjust_incoming(&mut self, message: &mut MavMessage) {
        adjust_incoming(self, message)
    }

    pub fn adjust_outgoing(&mut self, message: &mut MavMessage) {
        adjust_outgoing(self, message)
    }
}

fn handle_heartbeat(shim: &mut CompatibilityShim, heartbeat: &Heartbeat) {
    if heartbeat.autopilot == MAV_AUTOPILOT_INVALID {
        trace!("ignoring heartbeat from non-autopilot mav_type {}", heartbeat.mav_type);
        return;
    }
    let mode = shim.decode_mode(heartbeat.base_mode, heartbeat.custom_mode);
    shim.set_current_mode(mode);
}

fn handle_status_text(shim: &mut CompatibilityShim, status: &mut StatusText) {
    // The firmware announces itself at boot, e.g. "APM:Copter V3.3.2 (1bcd2e3f)".
    if shim.config().detect_version_from_status_text
        && !shim.version().is_valid()
        && looks_like_version(&status.text)
    {
        if let Ok(version) = VersionInfo::try_parse(&status.text) {
            match VehicleKind::from_firmware_label(version.vehicle_type()) {
                Some(kind) if kind != shim.kind() => {
                    warn!(
                        "ignoring {:?} firmware banner on a {:?} connection: {}",
                        kind,
                        shim.kind(),
                        version
                    );
                }
                _ => {
                    info!("firmware version from status text: {}", version);
                    shim.set_version(version);
                }
            }
        }
    }

    if !shim.needs_legacy_severity_adjustment() {
        return;
    }

    let original = status.severity;
    let severity = if is_calibration_message(&status.text) {
        MavSeverity::Info
    } else {
        ApmLegacySeverity::from_val(original).map_or(MavSeverity::Info, |s| s.to_modern())
    };
    status.severity = severity.val();
    trace!("status text severity {} -> {:?}", original, severity);
}

fn handle_param_value(shim: &mut CompatibilityShim, value: &mut ParamValue) {
    let local = take_pending_write(shim, &value.param_id, Some(value.param_value));
    if value.param_id == VERSION_PARAM {
        let mut conveyed: String<32> = String::new();
        // 32 bytes holds any f32 Display output that isn't absurd; a truncated value fails to
        // parse, which is the right outcome for absurd.
        let _ = write!(conveyed, "{}", value.param_value);
        handle_version_param(shim, &conveyed, local);
    }
    if shim.config().fix_param_encoding {
        value.param_value = cast_to_bytewise(value.param_value, value.param_type);
    }
}

fn handle_param_ext_value(shim: &mut CompatibilityShim, value: &ParamExtValue) {
    let confirmed = value.param_value.trim().parse::<f32>().ok();
    let local = take_pending_write(shim, &value.param_id, confirmed);
    if value.param_id == VERSION_PARAM {
        handle_version_param(shim, &value.param_value, local);
    }
}

/// Re-derive the version from the value of the version parameter. A bare number is given
/// the label of the connected vehicle kind so the per-vehicle thresholds apply.
fn handle_version_param(shim: &mut CompatibilityShim, conveyed: &str, local: bool) {
    let conveyed = conveyed.trim();
    let bare = conveyed
        .trim_start_matches(['V', 'v'])
        .starts_with(|c: char| c.is_ascii_digit());

    let version = if bare {
        let mut text: String<LABELED_VERSION_LEN> = String::new();
        if write!(text, "{} {}", shim.kind().firmware_label(), conveyed).is_err() {
            warn!("version parameter value too long, ignored: {}", conveyed);
            return;
        }
        VersionInfo::parse(&text)
    } else {
        VersionInfo::parse(conveyed)
    };
    if !version.is_valid() {
        warn!("version parameter value {} did not parse", conveyed);
    }

    let origin = if local {
        VersionChangeOrigin::LocalWrite
    } else {
        VersionChangeOrigin::External
    };
    debug!("{} changed ({:?})", VERSION_PARAM, origin);
    shim.last_version_change = Some(origin);
    shim.set_version(version);
}

/// Remember a parameter write so the PARAM_VALUE that confirms it can be recognized. When
/// the table is full an older write, most likely one the vehicle never answered, is dropped.
fn track_param_write(shim: &mut CompatibilityShim, set: &ParamSet) {
    let pending = &mut shim.pending_param_writes;
    if !pending.contains_key(&set.param_id) && pending.len() == pending.capacity() {
        if let Some(stale) = pending.keys().next().cloned() {
            debug!("too many pending parameter writes, dropping {}", stale);
            pending.remove(&stale);
        }
    }
    if let Err((param_id, _)) = pending.insert(set.param_id.clone(), set.param_value) {
        debug!("unable to track parameter write {}", param_id);
    }
}

/// Settle the pending write for `param_id`, if any. The change counts as ours only when the
/// reported value is the one we asked for; a rejected write clears the entry all the same.
fn take_pending_write(
    shim: &mut CompatibilityShim,
    param_id: &ParamId,
    reported: Option<f32>,
) -> bool {
    match shim.pending_param_writes.remove(param_id) {
        Some(requested) if reported == Some(requested) => true,
        Some(requested) => {
            debug!(
                "{} reported {:?} after a write of {}, treating as external",
                param_id, reported, requested
            );
            false
        }
        None => false,
    }
}

fn looks_like_version(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(VehicleKind::from_firmware_label)
        .is_some()
}

pub fn is_calibration_message(text: &str) -> bool {
    CALIBRATION_PREFIXES.iter().any(|p| text.starts_with(p))
}

/// Convert a value sent as a float cast (APM) to the bytewise union encoding: the integer's
/// bytes stored in the float's bit pattern.
pub fn cast_to_bytewise(value: f32, param_type: ParamType) -> f32 {
    let bits = match param_type {
        ParamType::Uint8 => value as u8 as u32,
        ParamType::Int8 => value as i8 as u8 as u32,
        ParamType::Uint16 => value as u16 as u32,
        ParamType::Int16 => value as i16 as u16 as u32,
        ParamType::Uint32 => value as u32,
        ParamType::Int32 => value as i32 as u32,
        ParamType::Real32 => return value,
        other => {
            error!("unsupported parameter type {:?}", other);
            return value;
        }
    };
    f32::from_bits(bits)
}

/// Inverse of [`cast_to_bytewise`].
pub fn bytewise_to_cast(value: f32, param_type: ParamType) -> f32 {
    let bits = value.to_bits();
    match param_type {
        ParamType::Uint8 => bits as u8 as f32,
        ParamType::Int8 => bits as u8 as i8 as f32,
        ParamType::Uint16 => bits as u16 as f32,
        ParamType::Int16 => bits as u16 as i16 as f32,
        ParamType::Uint32 => bits as f32,
        ParamType::Int32 => bits as i32 as f32,
        ParamType::Real32 => value,
        other => {
            error!("unsupported parameter type {:?}", other);
            value
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        protocol::{bounded, param_id, BaseMode, CommandLong, SetMode},
        shim::{DecodedMode, SeverityAdjustment, UNKNOWN_MODE_NAME},
        AdjusterConfig,
    };
    use test_log::test;

    fn heartbeat(custom_mode: u32) -> MavMessage {
        MavMessage::Heartbeat(Heartbeat {
            custom_mode,
            mav_type: 2,
            autopilot: 3,
            base_mode: BaseMode::CUSTOM_MODE_ENABLED.bits(),
            system_status: 4,
        })
    }

    fn status(severity: u8, text: &str) -> MavMessage {
        MavMessage::StatusText(StatusText {
            severity,
            text: bounded(text),
        })
    }

    fn severity_of(message: &MavMessage) -> u8 {
        match message {
            MavMessage::StatusText(s) => s.severity,
            _ => panic!("not a status text"),
        }
    }

    fn param_value(name: &str, value: f32, param_type: ParamType) -> MavMessage {
        MavMessage::ParamValue(ParamValue {
            param_id: param_id(name),
            param_value: value,
            param_type,
            param_count: 900,
            param_index: 12,
        })
    }

    fn param_ext_value(name: &str, value: &str) -> MavMessage {
        MavMessage::ParamExtValue(ParamExtValue {
            param_id: param_id(name),
            param_value: bounded(value),
            param_count: 900,
            param_index: 12,
        })
    }

    fn param_set(name: &str, value: f32, param_type: ParamType) -> MavMessage {
        MavMessage::ParamSet(ParamSet {
            target_system: 1,
            target_component: 1,
            param_id: param_id(name),
            param_value: value,
            param_type,
        })
    }

    #[test]
    fn test_legacy_severity_remapped() {
        let mut shim = CompatibilityShim::copter();
        assert!(shim.needs_legacy_severity_adjustment());

        let mut msg = status(ApmLegacySeverity::Medium as u8, "Low battery");
        shim.adjust_incoming(&mut msg);
        assert_eq!(severity_of(&msg), MavSeverity::Warning.val());

        for (legacy, modern) in [
            (1, MavSeverity::Info),
            (3, MavSeverity::Alert),
            (4, MavSeverity::Critical),
            (5, MavSeverity::Info),
            (0, MavSeverity::Info),
            (9, MavSeverity::Info),
        ] {
            let mut msg = status(legacy, "EKF variance");
            shim.adjust_incoming(&mut msg);
            assert_eq!(severity_of(&msg), modern.val(), "legacy {}", legacy);
        }
    }

    #[test]
    fn test_modern_severity_untouched() {
        let mut shim = CompatibilityShim::copter();
        shim.set_version(VersionInfo::parse("ArduCopter V3.4.0"));
        assert!(!shim.needs_legacy_severity_adjustment());

        let mut msg = status(2, "Low battery");
        shim.adjust_incoming(&mut msg);
        assert_eq!(severity_of(&msg), 2);

        let mut msg = status(4, "Place vehicle level and press any key.");
        shim.adjust_incoming(&mut msg);
        assert_eq!(severity_of(&msg), 4);
    }

    #[test]
    fn test_calibration_forced_to_info() {
        let mut shim = CompatibilityShim::plane();
        for severity in 0..8 {
            for text in [
                "Place vehicle level and press any key.",
                "Calibration successful",
            ] {
                let mut msg = status(severity, text);
                shim.adjust_incoming(&mut msg);
                assert_eq!(severity_of(&msg), MavSeverity::Info.val());
            }
        }
    }

    #[test]
    fn test_version_param_ends_legacy_adjustment() {
        let mut shim = CompatibilityShim::copter();
        assert!(shim.needs_legacy_severity_adjustment());

        let mut msg = param_ext_value(VERSION_PARAM, "3.6.0");
        shim.adjust_incoming(&mut msg);
        assert!(!shim.needs_legacy_severity_adjustment());
        assert_eq!(shim.version().triple(), Some((3, 6, 0)));
        assert_eq!(shim.version().vehicle_type(), "ArduCopter");
        assert_eq!(shim.last_version_change(), Some(VersionChangeOrigin::External));

        // The decision sticks for every following status text.
        for _ in 0..3 {
            let mut msg = status(2, "Low battery");
            shim.adjust_incoming(&mut msg);
            assert_eq!(severity_of(&msg), 2);
        }
    }

    #[test]
    fn test_numeric_version_param() {
        let mut shim = CompatibilityShim::rover();
        let mut msg = param_value(VERSION_PARAM, 2.5, ParamType::Real32);
        shim.adjust_incoming(&mut msg);
        assert_eq!(shim.version().triple(), Some((2, 5, 0)));
        assert_eq!(
            shim.severity_adjustment(),
            SeverityAdjustment::LegacyAdjustNeeded
        );

        let mut msg = param_value(VERSION_PARAM, 3.0, ParamType::Real32);
        shim.adjust_incoming(&mut msg);
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::ModernNoAdjust);
    }

    #[test]
    fn test_unparsable_version_param_returns_to_unknown() {
        let mut shim = CompatibilityShim::plane();
        shim.adjust_incoming(&mut param_ext_value(VERSION_PARAM, "ArduPlane V3.8.0"));
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::ModernNoAdjust);

        shim.adjust_incoming(&mut param_ext_value(VERSION_PARAM, "not a version"));
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::Unknown);
        assert!(shim.needs_legacy_severity_adjustment());
    }

    #[test]
    fn test_other_params_leave_version_alone() {
        let mut shim = CompatibilityShim::copter();
        shim.adjust_incoming(&mut param_ext_value("SYSID_SW_TYPE", "3.6.0"));
        assert!(!shim.version().is_valid());
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::Unknown);
    }

    #[test]
    fn test_version_from_status_text() {
        let mut shim = CompatibilityShim::copter();
        let mut msg = status(6, "APM:Copter V3.3.2 (1bcd2e3f)");
        shim.adjust_incoming(&mut msg);
        assert_eq!(shim.version().triple(), Some((3, 3, 2)));
        assert_eq!(
            shim.severity_adjustment(),
            SeverityAdjustment::LegacyAdjustNeeded
        );

        // Only adopted while no version is known.
        shim.adjust_incoming(&mut status(6, "APM:Copter V3.4.0"));
        assert_eq!(shim.version().triple(), Some((3, 3, 2)));
    }

    #[test]
    fn test_version_from_status_text_disabled() {
        let config = AdjusterConfig {
            detect_version_from_status_text: false,
            ..AdjusterConfig::default()
        };
        let mut shim = CompatibilityShim::with_config(VehicleKind::Copter, config);
        shim.adjust_incoming(&mut status(6, "APM:Copter V3.4.0"));
        assert!(!shim.version().is_valid());
    }

    #[test]
    fn test_guided_tracking() {
        let mut shim = CompatibilityShim::copter();
        assert!(!shim.is_guided_mode_active());
        for (code, guided) in [
            (0, false),
            (4, true),
            (4, true),
            (5, false),
            (12, false),
            (4, true),
        ] {
            shim.adjust_incoming(&mut heartbeat(code));
            assert_eq!(shim.is_guided_mode_active(), guided, "code {}", code);
        }
    }

    #[test]
    fn test_unknown_mode_keeps_processing() {
        let mut shim = CompatibilityShim::rover();
        shim.adjust_incoming(&mut heartbeat(99));
        assert_eq!(
            shim.current_mode().map(|m| m.name()),
            Some(UNKNOWN_MODE_NAME)
        );
        shim.adjust_incoming(&mut heartbeat(4));
        assert_eq!(shim.current_mode(), Some(DecodedMode::Known("Hold")));
    }

    #[test]
    fn test_non_autopilot_heartbeat_ignored() {
        let mut shim = CompatibilityShim::copter();
        shim.adjust_incoming(&mut heartbeat(4));
        let mut gcs = MavMessage::Heartbeat(Heartbeat {
            custom_mode: 0,
            mav_type: 6,
            autopilot: MAV_AUTOPILOT_INVALID,
            base_mode: 0,
            system_status: 0,
        });
        shim.adjust_incoming(&mut gcs);
        assert!(shim.is_guided_mode_active());
    }

    #[test]
    fn test_param_encoding_fixup() {
        let mut shim = CompatibilityShim::copter();
        let mut msg = param_value("SERIAL0_BAUD", -5.0, ParamType::Int16);
        shim.adjust_incoming(&mut msg);
        let received = match &msg {
            MavMessage::ParamValue(v) => v.param_value,
            _ => unreachable!(),
        };
        assert_eq!(received.to_bits(), 0xFFFB);

        let mut msg = param_set("SERIAL0_BAUD", received, ParamType::Int16);
        shim.adjust_outgoing(&mut msg);
        match &msg {
            MavMessage::ParamSet(s) => assert_eq!(s.param_value, -5.0),
            _ => unreachable!(),
        }

        let mut msg = param_value("ANGLE_MAX", 4500.5, ParamType::Real32);
        shim.adjust_incoming(&mut msg);
        assert_eq!(msg, param_value("ANGLE_MAX", 4500.5, ParamType::Real32));
    }

    #[test]
    fn test_param_encoding_fixup_disabled() {
        let config = AdjusterConfig {
            fix_param_encoding: false,
            ..AdjusterConfig::default()
        };
        let mut shim = CompatibilityShim::with_config(VehicleKind::Plane, config);
        let mut msg = param_value("RC1_MIN", 1100.0, ParamType::Int16);
        shim.adjust_incoming(&mut msg);
        assert_eq!(msg, param_value("RC1_MIN", 1100.0, ParamType::Int16));
    }

    #[test]
    fn test_encoding_inverse() {
        for (value, ty) in [
            (200.0, ParamType::Uint8),
            (-100.0, ParamType::Int8),
            (60000.0, ParamType::Uint16),
            (-30000.0, ParamType::Int16),
            (70000.0, ParamType::Uint32),
            (-70000.0, ParamType::Int32),
            (0.25, ParamType::Real32),
        ] {
            assert_eq!(bytewise_to_cast(cast_to_bytewise(value, ty), ty), value);
        }
        assert_eq!(cast_to_bytewise(1.5, ParamType::Real64), 1.5);
    }

    #[test]
    fn test_local_version_write_correlated() {
        let mut shim = CompatibilityShim::copter();
        let mut set = param_set(VERSION_PARAM, 3.5, ParamType::Real32);
        shim.adjust_outgoing(&mut set);
        assert_eq!(shim.pending_param_writes.len(), 1);

        shim.adjust_incoming(&mut param_value(VERSION_PARAM, 3.5, ParamType::Real32));
        assert_eq!(shim.last_version_change(), Some(VersionChangeOrigin::LocalWrite));
        assert!(shim.pending_param_writes.is_empty());
        assert_eq!(shim.version().triple(), Some((3, 5, 0)));

        shim.adjust_incoming(&mut param_value(VERSION_PARAM, 3.6, ParamType::Real32));
        assert_eq!(shim.last_version_change(), Some(VersionChangeOrigin::External));
    }

    #[test]
    fn test_pending_writes_bounded() {
        let mut shim = CompatibilityShim::copter();
        let names = ["P0", "P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8", "P9"];
        for name in names {
            shim.adjust_incoming(&mut param_set(name, 1.0, ParamType::Real32));
        }
        assert_eq!(
            shim.pending_param_writes.len(),
            crate::shim::MAX_PENDING_PARAM_WRITES
        );
        // The newest write is still tracked once the table is full.
        assert!(shim.pending_param_writes.contains_key(&param_id("P9")));
    }

    #[test]
    fn test_rejected_write_then_external_change() {
        let mut shim = CompatibilityShim::copter();
        shim.adjust_outgoing(&mut param_set(VERSION_PARAM, 9.0, ParamType::Real32));

        // The vehicle never applied 9.0; the next value it reports came from elsewhere.
        shim.adjust_incoming(&mut param_value(VERSION_PARAM, 3.6, ParamType::Real32));
        assert_eq!(shim.last_version_change(), Some(VersionChangeOrigin::External));
        assert!(shim.pending_param_writes.is_empty());
        assert_eq!(shim.version().triple(), Some((3, 6, 0)));
    }

    #[test]
    fn test_ext_value_write_correlated() {
        let mut shim = CompatibilityShim::plane();
        shim.adjust_outgoing(&mut param_set(VERSION_PARAM, 3.8, ParamType::Real32));
        shim.adjust_incoming(&mut param_ext_value(VERSION_PARAM, "3.8"));
        assert_eq!(shim.last_version_change(), Some(VersionChangeOrigin::LocalWrite));
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::ModernNoAdjust);
    }

    #[test]
    fn test_long_ext_version_value() {
        let mut shim = CompatibilityShim::copter();
        let value = "3.6.0 (0badf00d) ChibiOS 2019-01-01 build with a long tail";
        assert!(value.len() > 53);
        shim.adjust_incoming(&mut param_ext_value(VERSION_PARAM, value));
        assert!(shim.version().is_valid());
        assert_eq!(shim.version().triple(), Some((3, 6, 0)));
        assert_eq!(shim.version().vehicle_type(), "ArduCopter");
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::ModernNoAdjust);
    }

    #[test]
    fn test_numeric_copter_version_param() {
        let mut shim = CompatibilityShim::copter();
        assert!(shim.needs_legacy_severity_adjustment());

        shim.adjust_incoming(&mut param_value(VERSION_PARAM, 3.6, ParamType::Real32));
        assert_eq!(shim.version().triple(), Some((3, 6, 0)));
        assert!(!shim.needs_legacy_severity_adjustment());

        let mut msg = status(2, "Low battery");
        shim.adjust_incoming(&mut msg);
        assert_eq!(severity_of(&msg), 2);
    }

    #[test]
    fn test_status_text_banner_for_other_vehicle_ignored() {
        let mut shim = CompatibilityShim::copter();
        shim.adjust_incoming(&mut status(6, "APM:Plane V3.9.0 (5d4c3b2a)"));
        assert!(!shim.version().is_valid());
        assert_eq!(shim.severity_adjustment(), SeverityAdjustment::Unknown);

        shim.adjust_incoming(&mut status(6, "APM:Copter V3.5.0 (1bcd2e3f)"));
        assert_eq!(shim.version().triple(), Some((3, 5, 0)));
    }

    #[test]
    fn test_pass_through() {
        let mut shim = CompatibilityShim::copter();
        let originals = [
            MavMessage::Other(33),
            MavMessage::SetMode(SetMode {
                target_system: 1,
                base_mode: 1,
                custom_mode: 4,
            }),
            MavMessage::CommandLong(CommandLong {
                target_system: 1,
                target_component: 1,
                command: 400,
                confirmation: 0,
                params: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            }),
        ];
        for original in originals {
            let mut msg = original.clone();
            shim.adjust_incoming(&mut msg);
            assert_eq!(msg, original);
            shim.adjust_outgoing(&mut msg);
            assert_eq!(msg, original);
        }
    }
}
