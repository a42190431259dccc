//! PROBE/COMMIT negotiation. `StreamingControl` is the 34-byte wire record
//! a UVC host GETs/SETs; the `Negotiator` owns the two live instances
//! (`probe`, `commit`) plus the catalog lookups that fill and clamp them.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

use crate::catalog;
use crate::device_state::DeviceState;
use crate::endpoint::PixelFormat;

pub const STREAMING_CONTROL_LEN: usize = 34;

/// Little-endian, `#[repr(C)]`, no padding: this layout is transmitted to
/// the host verbatim via `AsBytes`/`FromBytes`. Plain `u16`/`u32` fields
/// are sound here because this agent only ever runs on little-endian
/// Linux targets; ordering matches spec §6 field-for-field.
#[repr(C, packed)]
#[derive(Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct StreamingControl {
    pub bm_hint: u16,
    pub b_format_index: u8,
    pub b_frame_index: u8,
    pub dw_frame_interval: u32,
    pub w_key_frame_rate: u16,
    pub w_p_frame_rate: u16,
    pub w_comp_quality: u16,
    pub w_comp_window_size: u16,
    pub w_delay: u16,
    pub dw_max_video_frame_size: u32,
    pub dw_max_payload_transfer_size: u32,
    pub dw_clock_frequency: u32,
    pub bm_framing_info: u8,
    pub b_prefered_version: u8,
    pub b_min_version: u8,
    pub b_max_version: u8,
}

impl Default for StreamingControl {
    fn default() -> Self {
        StreamingControl {
            bm_hint: 0,
            b_format_index: 0,
            b_frame_index: 0,
            dw_frame_interval: 0,
            w_key_frame_rate: 0,
            w_p_frame_rate: 0,
            w_comp_quality: 0,
            w_comp_window_size: 0,
            w_delay: 0,
            dw_max_video_frame_size: 0,
            dw_max_payload_transfer_size: 0,
            dw_clock_frequency: 0,
            bm_framing_info: 0,
            b_prefered_version: 0,
            b_min_version: 0,
            b_max_version: 0,
        }
    }
}

// Hand-written rather than derived: referencing a multi-byte field of a
// `repr(packed)` struct is unaligned and rejected by the compiler, which
// is exactly what `#[derive(Debug)]`/`#[derive(PartialEq)]` would do. Every
// field is copied into a local before use instead.
impl std::fmt::Debug for StreamingControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = *self;
        f.debug_struct("StreamingControl")
            .field("bm_hint", &{ c.bm_hint })
            .field("b_format_index", &{ c.b_format_index })
            .field("b_frame_index", &{ c.b_frame_index })
            .field("dw_frame_interval", &{ c.dw_frame_interval })
            .field("dw_max_video_frame_size", &{ c.dw_max_video_frame_size })
            .field("dw_max_payload_transfer_size", &{ c.dw_max_payload_transfer_size })
            .field("bm_framing_info", &{ c.bm_framing_info })
            .finish_non_exhaustive()
    }
}

impl PartialEq for StreamingControl {
    fn eq(&self, other: &Self) -> bool {
        zerocopy::AsBytes::as_bytes(self) == zerocopy::AsBytes::as_bytes(other)
    }
}

impl Eq for StreamingControl {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Probe,
    Commit,
}

pub struct Negotiator {
    pub probe: StreamingControl,
    pub commit: StreamingControl,
}

impl Negotiator {
    pub fn new() -> Self {
        let mut n = Negotiator { probe: StreamingControl::default(), commit: StreamingControl::default() };
        n.fill_streaming_control(Target::Probe, 1, 1, None);
        n.commit = n.probe;
        n
    }

    pub fn control(&self, target: Target) -> &StreamingControl {
        match target {
            Target::Probe => &self.probe,
            Target::Commit => &self.commit,
        }
    }

    /// Resolves `frame_idx`/`format_idx` through the catalog (negative
    /// indices meaning "from the end" is handled by callers translating
    /// -1 to `usize::MAX` before calling this, so `format_at`/`frame_at`'s
    /// clamp-to-last behavior picks up the "last" semantics uniformly).
    /// Out-of-range positive indices clamp rather than no-op, per DESIGN.md
    /// open-question (b): always zero/recompute unconditionally.
    pub fn fill_streaming_control(&mut self, target: Target, format_idx: usize, frame_idx: usize, mjpeg_blob_len: Option<usize>) {
        let format = catalog::format_at(format_idx.max(1));
        let frame = catalog::frame_at(format, frame_idx.max(1));
        let interval = catalog::smallest_interval(frame);

        let max_video_frame_size = match format.pixfmt {
            PixelFormat::Yuyv => frame.width * frame.height * 2,
            PixelFormat::Mjpeg => mjpeg_blob_len.unwrap_or(0) as u32,
        };

        let ctrl = StreamingControl {
            bm_hint: 0,
            b_format_index: format_index_of(format.pixfmt),
            b_frame_index: frame_index_of(format, frame),
            dw_frame_interval: interval,
            w_key_frame_rate: 0,
            w_p_frame_rate: 0,
            w_comp_quality: 0,
            w_comp_window_size: 0,
            w_delay: 0,
            dw_max_video_frame_size: max_video_frame_size,
            dw_max_payload_transfer_size: 0,
            dw_clock_frequency: 0,
            bm_framing_info: 3,
            b_prefered_version: 1,
            b_min_version: 1,
            b_max_version: 1,
        };
        *self.target_mut(target) = ctrl;
    }

    fn target_mut(&mut self, target: Target) -> &mut StreamingControl {
        match target {
            Target::Probe => &mut self.probe,
            Target::Commit => &mut self.commit,
        }
    }

    /// Applies a host-proposed `StreamingControl` to `target`, clamping
    /// indices and interval per spec §4.2, recomputing both size fields,
    /// and (for `Commit`) latching the resolved format into `state`.
    pub fn apply(&mut self, target: Target, proposed: &StreamingControl, state: &mut DeviceState, max_payload_transfer_size: u32) {
        let format = catalog::format_at(proposed.b_format_index as usize);
        let frame = catalog::frame_at(format, proposed.b_frame_index as usize);
        let interval = catalog::resolve_interval(frame, proposed.dw_frame_interval);

        let max_video_frame_size = match format.pixfmt {
            PixelFormat::Yuyv => frame.width * frame.height * 2,
            PixelFormat::Mjpeg => {
                if state.image_blob.is_none() {
                    log::warn!("committing MJPEG format with no image loaded");
                }
                state.image_blob.as_ref().map(|b| b.len()).unwrap_or(0) as u32
            }
        };

        let resolved = StreamingControl {
            bm_hint: proposed.bm_hint,
            b_format_index: format_index_of(format.pixfmt),
            b_frame_index: frame_index_of(format, frame),
            dw_frame_interval: interval,
            w_key_frame_rate: 0,
            w_p_frame_rate: 0,
            w_comp_quality: 0,
            w_comp_window_size: 0,
            w_delay: 0,
            dw_max_video_frame_size: max_video_frame_size,
            dw_max_payload_transfer_size: max_payload_transfer_size,
            dw_clock_frequency: 0,
            bm_framing_info: 3,
            b_prefered_version: 1,
            b_min_version: 1,
            b_max_version: 1,
        };

        *self.target_mut(target) = resolved;

        if target == Target::Commit {
            state.active_pixfmt = format.pixfmt;
            state.active_width = frame.width;
            state.active_height = frame.height;
        }
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

fn format_index_of(pixfmt: PixelFormat) -> u8 {
    catalog::FORMATS
        .iter()
        .position(|f| f.pixfmt == pixfmt)
        .map(|i| i as u8 + 1)
        .unwrap_or(1)
}

fn frame_index_of(format: &catalog::Format, frame: &catalog::Frame) -> u8 {
    format
        .frames
        .iter()
        .position(|f| std::ptr::eq(f, frame))
        .map(|i| i as u8 + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::Role;

    fn fresh_state() -> DeviceState {
        DeviceState::new(Role::Standalone, PixelFormat::Yuyv, 640, 360)
    }

    #[test]
    fn wire_layout_is_34_bytes() {
        assert_eq!(std::mem::size_of::<StreamingControl>(), STREAMING_CONTROL_LEN);
    }

    #[test]
    fn fill_defaults_to_first_format_and_frame() {
        let mut n = Negotiator::new();
        n.fill_streaming_control(Target::Probe, 1, 1, None);
        let (frame_interval, max_frame_size) = (n.probe.dw_frame_interval, n.probe.dw_max_video_frame_size);
        assert_eq!(n.probe.b_format_index, 1);
        assert_eq!(n.probe.b_frame_index, 1);
        assert_eq!(frame_interval, 666_666);
        assert_eq!(max_frame_size, 640 * 360 * 2);
    }

    #[test]
    fn commit_latches_active_format() {
        let mut n = Negotiator::new();
        let mut state = fresh_state();
        let proposed = StreamingControl { b_format_index: 2, b_frame_index: 2, dw_frame_interval: 50_000_000, ..Default::default() };
        n.apply(Target::Commit, &proposed, &mut state, 0);
        assert_eq!(state.active_pixfmt, PixelFormat::Mjpeg);
        assert_eq!(state.active_width, 1280);
        assert_eq!(state.active_height, 720);
    }

    #[test]
    fn probe_does_not_latch() {
        let mut n = Negotiator::new();
        let mut state = fresh_state();
        let proposed = StreamingControl { b_format_index: 2, b_frame_index: 2, dw_frame_interval: 50_000_000, ..Default::default() };
        n.apply(Target::Probe, &proposed, &mut state, 0);
        assert_eq!(state.active_pixfmt, PixelFormat::Yuyv);
    }
}
