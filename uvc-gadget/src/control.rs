//! USB setup-packet decoding and the (entity, control-selector,
//! request-code) response table from spec §4.3. The table shape follows
//! the design note directly: a lookup with a STALL fallback, not nested
//! `if`s.

use crate::device_state::DeviceState;
use crate::device_state::PendingControl;
use crate::device_state::REQUEST_ERROR_CODE_INVALID_CONTROL;
use crate::device_state::REQUEST_ERROR_CODE_NONE;
use crate::device_state::REQUEST_ERROR_CODE_WRONG_REQUEST;
use crate::endpoint::Response;
use crate::endpoint::SetupPacket;
use crate::streaming::Negotiator;
use crate::streaming::Target;
use crate::streaming::STREAMING_CONTROL_LEN;

const USB_TYPE_MASK: u8 = 0x60;
const USB_TYPE_STANDARD: u8 = 0x00;
const USB_TYPE_CLASS: u8 = 0x20;
const USB_RECIP_MASK: u8 = 0x1f;
const USB_RECIP_INTERFACE: u8 = 0x01;

const UVC_INTF_CONTROL: u8 = 0;
const UVC_INTF_STREAMING: u8 = 1;

const CS_REQUEST_ERROR_CODE: u8 = 0x02;
const CS_AE_MODE: u8 = 0x02;
const CS_BRIGHTNESS: u8 = 0x02;
const CS_PROBE: u8 = 0x01;
const CS_COMMIT: u8 = 0x02;

const REQ_SET_CUR: u8 = 0x01;
const REQ_GET_CUR: u8 = 0x81;
const REQ_GET_MIN: u8 = 0x82;
const REQ_GET_MAX: u8 = 0x83;
const REQ_GET_RES: u8 = 0x84;
const REQ_GET_LEN: u8 = 0x85;
const REQ_GET_INFO: u8 = 0x86;
const REQ_GET_DEF: u8 = 0x87;

const ENTITY_INTERFACE: u8 = 0;
const ENTITY_CAMERA_TERMINAL: u8 = 1;
const ENTITY_PROCESSING_UNIT: u8 = 2;

/// Decode and respond to one SETUP packet, mutating `state`'s error-code
/// register and pending-control-selector as a side effect. Returns the
/// response to hand to `send_response`; `None` means "standard request or
/// unrecognized recipient, no-op" (spec §4.3: "reply empty").
pub fn process_setup(setup: &SetupPacket, negotiator: &mut Negotiator, state: &mut DeviceState) -> Option<Response> {
    let type_bits = setup.request_type & USB_TYPE_MASK;
    let recipient = setup.request_type & USB_RECIP_MASK;

    if type_bits == USB_TYPE_STANDARD {
        return None;
    }
    if !(type_bits == USB_TYPE_CLASS && recipient == USB_RECIP_INTERFACE) {
        return None;
    }

    let interface = (setup.index & 0xff) as u8;
    match interface {
        UVC_INTF_CONTROL => Some(dispatch_control_interface(setup, state)),
        UVC_INTF_STREAMING => Some(dispatch_streaming_interface(setup, negotiator, state)),
        _ => None,
    }
}

fn dispatch_control_interface(setup: &SetupPacket, state: &mut DeviceState) -> Response {
    let entity = (setup.index >> 8) as u8;
    let cs = (setup.value >> 8) as u8;
    let request = setup.request;

    match (entity, cs, request) {
        (ENTITY_INTERFACE, CS_REQUEST_ERROR_CODE, REQ_GET_CUR) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(vec![state.request_error_code])
        }
        (ENTITY_INTERFACE, _, _) => {
            state.request_error_code = REQUEST_ERROR_CODE_INVALID_CONTROL;
            Response::Stall
        }
        (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, REQ_SET_CUR) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(vec![0x01])
        }
        (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, REQ_GET_INFO) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(vec![0x03])
        }
        (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, REQ_GET_CUR) | (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, REQ_GET_DEF) | (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, REQ_GET_RES) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(vec![0x02])
        }
        (ENTITY_CAMERA_TERMINAL, CS_AE_MODE, _) => {
            state.request_error_code = REQUEST_ERROR_CODE_WRONG_REQUEST;
            Response::Stall
        }
        (ENTITY_CAMERA_TERMINAL, _, _) => {
            state.request_error_code = REQUEST_ERROR_CODE_INVALID_CONTROL;
            Response::Stall
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_SET_CUR) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            state.pending_control = PendingControl::Brightness;
            Response::Bytes(vec![0; setup.length as usize])
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_MIN) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(0u16.to_le_bytes().to_vec())
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_MAX) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(255u16.to_le_bytes().to_vec())
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_CUR) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes((state.brightness as u16).to_le_bytes().to_vec())
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_DEF) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(127u16.to_le_bytes().to_vec())
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_RES) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(1u16.to_le_bytes().to_vec())
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, REQ_GET_INFO) => {
            state.request_error_code = REQUEST_ERROR_CODE_NONE;
            Response::Bytes(vec![0x03])
        }
        (ENTITY_PROCESSING_UNIT, CS_BRIGHTNESS, _) => {
            state.request_error_code = REQUEST_ERROR_CODE_WRONG_REQUEST;
            Response::Stall
        }
        _ => {
            state.request_error_code = REQUEST_ERROR_CODE_INVALID_CONTROL;
            Response::Stall
        }
    }
}

fn dispatch_streaming_interface(setup: &SetupPacket, negotiator: &mut Negotiator, state: &mut DeviceState) -> Response {
    let cs = (setup.value >> 8) as u8;
    if cs != CS_PROBE && cs != CS_COMMIT {
        return Response::Bytes(Vec::new());
    }
    let target = if cs == CS_PROBE { Target::Probe } else { Target::Commit };

    match setup.request {
        REQ_SET_CUR => {
            state.pending_control = if cs == CS_PROBE { PendingControl::Probe } else { PendingControl::Commit };
            Response::Bytes(vec![0u8; STREAMING_CONTROL_LEN])
        }
        REQ_GET_CUR => Response::Bytes(zerocopy::AsBytes::as_bytes(negotiator.control(target)).to_vec()),
        REQ_GET_MIN | REQ_GET_DEF => {
            let mut n = Negotiator::new();
            n.fill_streaming_control(Target::Probe, 1, 1, state.image_blob.as_ref().map(|b| b.len()));
            Response::Bytes(zerocopy::AsBytes::as_bytes(&n.probe).to_vec())
        }
        REQ_GET_MAX => {
            let mut n = Negotiator::new();
            let last_format = crate::catalog::format_count();
            let frame_count = crate::catalog::frame_count(crate::catalog::format_at(last_format));
            n.fill_streaming_control(Target::Probe, last_format, frame_count, state.image_blob.as_ref().map(|b| b.len()));
            Response::Bytes(zerocopy::AsBytes::as_bytes(&n.probe).to_vec())
        }
        REQ_GET_RES => Response::Bytes(vec![0u8; STREAMING_CONTROL_LEN]),
        REQ_GET_LEN => Response::Bytes((STREAMING_CONTROL_LEN as u16).to_le_bytes().to_vec()),
        REQ_GET_INFO => Response::Bytes(vec![0x03]),
        _ => Response::Bytes(Vec::new()),
    }
}

/// Data-phase handling (spec §4.3 "Data phase"): dispatches on the pending
/// control selector recorded by the last SET_CUR. Returns `Err` only for
/// the brightness-out-of-range case, which the host-facing dispatcher
/// turns into an error reply rather than propagating further (no
/// `ProtocolViolation` ever reaches `main`).
pub fn process_data(bytes: &[u8], negotiator: &mut Negotiator, state: &mut DeviceState, max_payload_transfer_size: u32) -> Result<(), ()> {
    let pending = state.pending_control;
    state.pending_control = PendingControl::None;

    match pending {
        PendingControl::Probe | PendingControl::Commit => {
            let target = if pending == PendingControl::Probe { Target::Probe } else { Target::Commit };
            if bytes.len() < STREAMING_CONTROL_LEN {
                return Err(());
            }
            let proposed = zerocopy::FromBytes::read_from(&bytes[..STREAMING_CONTROL_LEN])
                .expect("slice length matches StreamingControl size");
            negotiator.apply(target, &proposed, state, max_payload_transfer_size);
            Ok(())
        }
        PendingControl::Brightness | PendingControl::None => {
            let value = match bytes {
                [] => return Ok(()),
                [lo] => *lo as u16,
                [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
            };
            if value > 255 {
                return Err(());
            }
            state.brightness = value as u8;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::Role;
    use crate::endpoint::PixelFormat;

    fn fresh() -> (Negotiator, DeviceState) {
        (Negotiator::new(), DeviceState::new(Role::Standalone, PixelFormat::Yuyv, 640, 360))
    }

    fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
        SetupPacket { request_type, request, value, index, length }
    }

    #[test]
    fn standalone_yuyv_vga_get_def_matches_scenario_s1() {
        let (mut n, mut state) = fresh();
        let pkt = setup(USB_TYPE_CLASS | USB_RECIP_INTERFACE, REQ_GET_DEF, (CS_PROBE as u16) << 8, UVC_INTF_STREAMING as u16, 0);
        let resp = process_setup(&pkt, &mut n, &mut state).expect("class+interface request dispatches");
        let Response::Bytes(bytes) = resp else { panic!("expected data, got STALL") };
        let ctrl: StreamingControlForTest = zerocopy::FromBytes::read_from(&bytes[..]).unwrap();
        let (frame_interval, max_frame_size) = (ctrl.dw_frame_interval, ctrl.dw_max_video_frame_size);
        assert_eq!(ctrl.b_format_index, 1);
        assert_eq!(ctrl.b_frame_index, 1);
        assert_eq!(frame_interval, 666_666);
        assert_eq!(max_frame_size, 640 * 360 * 2);
    }

    type StreamingControlForTest = crate::streaming::StreamingControl;

    #[test]
    fn unsupported_control_selector_stalls_and_sets_error_code_s4() {
        let (_n, mut state) = fresh();
        let pkt = setup(USB_TYPE_CLASS | USB_RECIP_INTERFACE, REQ_GET_CUR, 0x9900, ((ENTITY_PROCESSING_UNIT as u16) << 8) | UVC_INTF_CONTROL as u16, 0);
        let resp = dispatch_control_interface(&pkt, &mut state);
        assert!(matches!(resp, Response::Stall));
        assert_eq!(state.request_error_code, REQUEST_ERROR_CODE_WRONG_REQUEST);
    }

    #[test]
    fn brightness_round_trip_s3() {
        let (_n, mut state) = fresh();
        state.pending_control = PendingControl::Brightness;
        process_data(&[0x42], &mut Negotiator::new(), &mut state, 0).unwrap();
        assert_eq!(state.brightness, 0x42);

        let pkt = setup(USB_TYPE_CLASS | USB_RECIP_INTERFACE, REQ_GET_CUR, (CS_BRIGHTNESS as u16) << 8, ((ENTITY_PROCESSING_UNIT as u16) << 8), 2);
        let resp = dispatch_control_interface(&pkt, &mut state);
        let Response::Bytes(bytes) = resp else { panic!("expected data") };
        assert_eq!(bytes[0], 0x42);
    }

    #[test]
    fn request_error_code_after_any_request_is_in_allowed_set_p3() {
        let (_n, mut state) = fresh();
        let pkt = setup(USB_TYPE_CLASS | USB_RECIP_INTERFACE, 0xff, 0, ((ENTITY_CAMERA_TERMINAL as u16) << 8), 0);
        let _ = dispatch_control_interface(&pkt, &mut state);
        assert!(matches!(state.request_error_code, REQUEST_ERROR_CODE_NONE | REQUEST_ERROR_CODE_INVALID_CONTROL | REQUEST_ERROR_CODE_WRONG_REQUEST));
    }
}
