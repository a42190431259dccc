//! Process-wide state bundled into one value and threaded explicitly into
//! the dispatcher and pumps, per the "bundle, don't globalize" design note.

use crate::endpoint::PixelFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Standalone,
    Bridged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Full,
    High,
    Super,
}

pub const REQUEST_ERROR_CODE_NONE: u8 = 0x00;
pub const REQUEST_ERROR_CODE_INVALID_CONTROL: u8 = 0x06;
pub const REQUEST_ERROR_CODE_WRONG_REQUEST: u8 = 0x07;

/// Last SET_CUR target awaiting its data phase; `None` if no SET_CUR is
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingControl {
    None,
    Probe,
    Commit,
    Brightness,
}

pub struct DeviceState {
    pub role: Role,
    pub active_pixfmt: PixelFormat,
    pub active_width: u32,
    pub active_height: u32,
    pub image_blob: Option<Vec<u8>>,
    pub color_byte: u8,
    pub brightness: u8,
    pub request_error_code: u8,
    pub pending_control: PendingControl,
    pub first_buffer_queued: bool,
    pub shutdown_requested: bool,
    pub speed: Speed,
    pub bulk_mode: bool,
    pub max_packet: u32,
    pub mult: u8,
    pub burst: u8,
}

impl DeviceState {
    pub fn new(role: Role, active_pixfmt: PixelFormat, active_width: u32, active_height: u32) -> Self {
        DeviceState {
            role,
            active_pixfmt,
            active_width,
            active_height,
            image_blob: None,
            color_byte: 0,
            brightness: 127,
            request_error_code: REQUEST_ERROR_CODE_NONE,
            pending_control: PendingControl::None,
            first_buffer_queued: false,
            shutdown_requested: false,
            speed: Speed::High,
            bulk_mode: false,
            max_packet: 1024,
            mult: 0,
            burst: 0,
        }
    }

    /// Table from spec §6: max packet size as a function of (speed, bulk).
    pub fn max_packet_for(speed: Speed, bulk: bool) -> u32 {
        match (speed, bulk) {
            (Speed::Full, true) => 64,
            (Speed::Full, false) => 1023,
            (Speed::High, true) => 512,
            (Speed::High, false) => 1024,
            (Speed::Super, _) => 1024,
        }
    }

    /// `max_packet x (mult+1) x (burst+1)`; used for isochronous payload
    /// sizing. Bulk mode instead uses the frame size directly (handled by
    /// the caller, not here).
    pub fn isoc_payload_size(&self) -> u32 {
        self.max_packet * (self.mult as u32 + 1) * (self.burst as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_packet_table_matches_spec() {
        assert_eq!(DeviceState::max_packet_for(Speed::Full, true), 64);
        assert_eq!(DeviceState::max_packet_for(Speed::Full, false), 1023);
        assert_eq!(DeviceState::max_packet_for(Speed::High, true), 512);
        assert_eq!(DeviceState::max_packet_for(Speed::High, false), 1024);
        assert_eq!(DeviceState::max_packet_for(Speed::Super, true), 1024);
        assert_eq!(DeviceState::max_packet_for(Speed::Super, false), 1024);
    }

    #[test]
    fn brightness_defaults_to_127() {
        let state = DeviceState::new(Role::Standalone, PixelFormat::Yuyv, 640, 360);
        assert_eq!(state.brightness, 127);
    }
}
