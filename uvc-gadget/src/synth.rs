//! Standalone-mode frame producer: a solid-color YUYV generator and an
//! MJPEG still-image replicator, per spec §4.6.

use crate::device_state::DeviceState;
use crate::endpoint::PixelFormat;

/// Fills `buf` according to `state`'s active format, returns bytes_used.
/// Advances `state.color_byte` for YUYV so successive calls visibly cycle.
pub fn synthesize(buf: &mut [u8], state: &mut DeviceState) -> usize {
    match state.active_pixfmt {
        PixelFormat::Yuyv => synthesize_yuyv(buf, state),
        PixelFormat::Mjpeg => synthesize_mjpeg(buf, state),
    }
}

fn synthesize_yuyv(buf: &mut [u8], state: &mut DeviceState) -> usize {
    let width = state.active_width as usize;
    let height = state.active_height as usize;
    let row_len = width * 2;
    for row in 0..height {
        let start = row * row_len;
        let end = start + row_len;
        if end > buf.len() {
            break;
        }
        buf[start..end].fill(state.color_byte);
        state.color_byte = state.color_byte.wrapping_add(1);
    }
    row_len * height
}

fn synthesize_mjpeg(buf: &mut [u8], state: &DeviceState) -> usize {
    match &state.image_blob {
        Some(blob) => {
            let n = blob.len().min(buf.len());
            buf[..n].copy_from_slice(&blob[..n]);
            n
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::Role;

    #[test]
    fn yuyv_fills_every_row_and_advances_color() {
        let mut state = DeviceState::new(Role::Standalone, PixelFormat::Yuyv, 4, 2);
        let mut buf = vec![0xffu8; 4 * 2 * 2];
        let used = synthesize(&mut buf, &mut state);
        assert_eq!(used, 4 * 2 * 2);
        assert!(buf[0..8].iter().all(|&b| b == 0));
        assert!(buf[8..16].iter().all(|&b| b == 1));
        assert_eq!(state.color_byte, 2);
    }

    #[test]
    fn color_byte_wraps_mod_256() {
        let mut state = DeviceState::new(Role::Standalone, PixelFormat::Yuyv, 2, 1);
        state.color_byte = 255;
        let mut buf = vec![0u8; 2 * 1 * 2];
        synthesize(&mut buf, &mut state);
        assert_eq!(state.color_byte, 0);
    }

    #[test]
    fn mjpeg_copies_blob_and_reports_its_length() {
        let mut state = DeviceState::new(Role::Standalone, PixelFormat::Mjpeg, 640, 360);
        state.image_blob = Some(vec![1, 2, 3, 4]);
        let mut buf = vec![0u8; 16];
        let used = synthesize(&mut buf, &mut state);
        assert_eq!(used, 4);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn mjpeg_with_no_blob_produces_empty_frame() {
        let mut state = DeviceState::new(Role::Standalone, PixelFormat::Mjpeg, 640, 360);
        let mut buf = vec![0xaau8; 16];
        let used = synthesize(&mut buf, &mut state);
        assert_eq!(used, 0);
    }
}
