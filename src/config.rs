//! Per-connection settings for the compatibility layer.

use crate::protocol::DataStream;

/// Telemetry rates, in Hz, requested from the vehicle when it is initialized. A rate of 0
/// stops the stream.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRates {
    pub raw_sensors: u16,
    pub extended_status: u16,
    pub rc_channels: u16,
    pub position: u16,
    /// Attitude.
    pub extra1: u16,
    /// VFR_HUD.
    pub extra2: u16,
    pub extra3: u16,
}

impl Default for StreamRates {
    fn default() -> Self {
        Self {
            raw_sensors: 2,
            extended_status: 2,
            rc_channels: 2,
            position: 3,
            extra1: 10,
            extra2: 10,
            extra3: 3,
        }
    }
}

impl StreamRates {
    /// Streams paired with their rates, in request order.
    pub fn iter(&self) -> impl Iterator<Item = (DataStream, u16)> {
        [
            (DataStream::RawSensors, self.raw_sensors),
            (DataStream::ExtendedStatus, self.extended_status),
            (DataStream::RcChannels, self.rc_channels),
            (DataStream::Position, self.position),
            (DataStream::Extra1, self.extra1),
            (DataStream::Extra2, self.extra2),
            (DataStream::Extra3, self.extra3),
        ]
        .into_iter()
    }
}

/// Knobs for [`crate::CompatibilityShim`]. Nothing here is persisted.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjusterConfig {
    /// APM sends PARAM_VALUE as a float cast of the value, not the bytewise union the rest of
    /// the system expects. If true, incoming values are converted and outgoing PARAM_SET
    /// converted back. Defaults to `true`.
    pub fix_param_encoding: bool,
    /// Adopt a firmware version announced in STATUSTEXT at boot while no version is known
    /// yet. Defaults to `true`.
    pub detect_version_from_status_text: bool,
    pub stream_rates: StreamRates,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            fix_param_encoding: true,
            detect_version_from_status_text: true,
            stream_rates: StreamRates::default(),
        }
    }
}
