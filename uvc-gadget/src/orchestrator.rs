//! Single-threaded readiness loop driving the whole agent. Bundles the two
//! endpoints, their pools, the negotiator, and `DeviceState` into one value
//! constructed at startup and threaded through every pump/dispatch call,
//! per the "bundle, don't globalize" design note, rather than reaching for
//! ambient globals from each pump function.

use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::time::Duration;

use uvc_base::Interest;
use uvc_base::WaitContext;

use crate::buffer::EndpointPool;
use crate::catalog;
use crate::control;
use crate::device_state::DeviceState;
use crate::device_state::PendingControl;
use crate::device_state::Role;
use crate::endpoint::DequeueOutcome;
use crate::endpoint::EndpointKind;
use crate::endpoint::EnqueueOutcome;
use crate::endpoint::Event;
use crate::endpoint::IoMode;
use crate::endpoint::VideoEndpoint;
use crate::error::FatalError;
use crate::streaming::Negotiator;
use crate::synth;

const BRIDGED_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Gadget,
    Capture,
}

impl uvc_base::EventToken for Token {}

/// `uvc_base::WaitContext` registers descriptors by `&dyn AsRawFd`; our
/// endpoints live behind `Box<dyn VideoEndpoint>`, which does not itself
/// implement that std trait, so this wraps the raw fd just long enough to
/// satisfy the call (the context copies the integer out immediately).
struct FdRef(RawFd);

impl AsRawFd for FdRef {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

pub struct Orchestrator {
    gadget: Box<dyn VideoEndpoint>,
    capture: Option<Box<dyn VideoEndpoint>>,
    pool_out: EndpointPool,
    pool_cap: EndpointPool,
    negotiator: Negotiator,
    state: DeviceState,
    nbufs: usize,
}

impl Orchestrator {
    pub fn new(
        gadget: Box<dyn VideoEndpoint>,
        capture: Option<Box<dyn VideoEndpoint>>,
        gadget_mode: IoMode,
        nbufs: usize,
        state: DeviceState,
    ) -> Self {
        let capture_mode = match gadget_mode {
            IoMode::Mapped => IoMode::UserPtr,
            IoMode::UserPtr => IoMode::Mapped,
        };
        Orchestrator {
            gadget,
            capture,
            pool_out: EndpointPool::empty(gadget_mode),
            pool_cap: EndpointPool::empty(capture_mode),
            negotiator: Negotiator::new(),
            state,
            nbufs,
        }
    }

    /// Runs until a fatal error, a clean STREAMOFF-driven shutdown, or (in
    /// bridged mode) a readiness timeout with nothing to do.
    pub fn run(&mut self) -> Result<(), FatalError> {
        for ty in [
            crate::kernel_abi::UVC_EVENT_CONNECT,
            crate::kernel_abi::UVC_EVENT_DISCONNECT,
            crate::kernel_abi::UVC_EVENT_STREAMON,
            crate::kernel_abi::UVC_EVENT_STREAMOFF,
            crate::kernel_abi::UVC_EVENT_SETUP,
            crate::kernel_abi::UVC_EVENT_DATA,
        ] {
            self.gadget.subscribe_event(ty).map_err(FatalError::Endpoint)?;
        }

        let mut wait_ctx: WaitContext<Token> = WaitContext::new();
        wait_ctx
            .add(&FdRef(self.gadget.as_raw_fd()), Interest::PRIORITY | Interest::WRITABLE, Token::Gadget)
            .map_err(FatalError::Poll)?;

        let timeout = if self.state.role == Role::Bridged { Some(BRIDGED_TIMEOUT) } else { None };

        loop {
            let triggered = wait_ctx.wait(timeout).map_err(FatalError::Poll)?;
            if triggered.is_empty() {
                if let Some(t) = timeout {
                    return Err(FatalError::NoProgress(t));
                }
                continue;
            }

            let gadget_ev = triggered.iter().find(|e| e.token == Token::Gadget).copied();
            let capture_ev = triggered.iter().find(|e| e.token == Token::Capture).copied();

            if let Some(ev) = gadget_ev {
                if ev.is_priority {
                    self.handle_gadget_event(&mut wait_ctx)?;
                }
            }
            if let Some(ev) = gadget_ev {
                if ev.is_writable {
                    self.pump_output()?;
                }
            }
            if let Some(ev) = capture_ev {
                if ev.is_readable {
                    self.pump_capture()?;
                }
            }

            if self.state.shutdown_requested && self.pool_out.in_flight() == 0 {
                self.teardown(&mut wait_ctx);
                return Ok(());
            }
        }
    }

    fn handle_gadget_event(&mut self, wait_ctx: &mut WaitContext<Token>) -> Result<(), FatalError> {
        let event = self.gadget.dequeue_event().map_err(FatalError::Endpoint)?;
        match event {
            Event::Connect => log::info!("gadget connected"),
            Event::Disconnect => {
                log::info!("gadget disconnected");
                self.state.shutdown_requested = true;
            }
            Event::StreamOn => {
                if !self.state.bulk_mode {
                    self.activate_streaming(wait_ctx)?;
                }
            }
            Event::StreamOff => self.teardown(wait_ctx),
            Event::Setup(setup) => {
                if let Some(response) = control::process_setup(&setup, &mut self.negotiator, &mut self.state) {
                    self.gadget.send_response(response).map_err(FatalError::Endpoint)?;
                }
            }
            Event::Data { length, bytes } => {
                let was_commit = self.state.pending_control == PendingControl::Commit;
                let max_payload = self.max_payload_transfer_size();
                let _ = control::process_data(&bytes[..length], &mut self.negotiator, &mut self.state, max_payload);
                if was_commit && self.state.bulk_mode {
                    self.activate_streaming(wait_ctx)?;
                }
            }
        }
        Ok(())
    }

    fn max_payload_transfer_size(&self) -> u32 {
        if self.state.bulk_mode {
            match self.state.active_pixfmt {
                crate::endpoint::PixelFormat::Yuyv => self.state.active_width * self.state.active_height * 2,
                crate::endpoint::PixelFormat::Mjpeg => self.state.image_blob.as_ref().map(|b| b.len()).unwrap_or(0) as u32,
            }
        } else {
            self.state.isoc_payload_size()
        }
    }

    /// STREAMON handling (non-bulk) or its bulk-mode COMMIT-triggered
    /// equivalent: allocate the gadget pool; in bridged mode also allocate
    /// and pre-queue the capture pool and start capture streaming; in
    /// standalone mode synthesize and queue the initial gadget buffers
    /// directly, then start gadget streaming.
    fn activate_streaming(&mut self, wait_ctx: &mut WaitContext<Token>) -> Result<(), FatalError> {
        if !self.pool_out.is_empty() {
            return Ok(());
        }

        self.allocate_gadget_pool()?;

        match self.state.role {
            Role::Standalone => {
                for index in 0..self.pool_out.len() {
                    let bytes_used = {
                        let buf = &mut self.pool_out.buffers[index];
                        // SAFETY: buffer is freshly allocated and not yet
                        // kernel-owned.
                        let slice = unsafe { buf.as_mut_slice() };
                        synth::synthesize(slice, &mut self.state)
                    };
                    let user_ptr = self.pool_out.buffers[index].user_ptr();
                    match self
                        .gadget
                        .enqueue(index, bytes_used, self.pool_out.mode, user_ptr, EndpointKind::GadgetOutput)
                        .map_err(FatalError::Endpoint)?
                    {
                        EnqueueOutcome::Queued => self.pool_out.enqueued += 1,
                        EnqueueOutcome::DeviceGone => {
                            self.state.shutdown_requested = true;
                            break;
                        }
                    }
                }
                self.gadget.stream_on(EndpointKind::GadgetOutput).map_err(FatalError::Endpoint)?;
                self.pool_out.streaming = true;
                self.state.first_buffer_queued = true;
            }
            Role::Bridged => {
                self.allocate_capture_pool()?;
                let capture = self.capture.as_mut().expect("bridged role always has a capture endpoint");
                for index in 0..self.pool_cap.len() {
                    let user_ptr = Self::shared_address(&self.pool_out, &self.pool_cap, index);
                    match capture
                        .enqueue(index, 0, self.pool_cap.mode, user_ptr, EndpointKind::Capture)
                        .map_err(FatalError::Endpoint)?
                    {
                        EnqueueOutcome::Queued => self.pool_cap.enqueued += 1,
                        EnqueueOutcome::DeviceGone => {
                            self.state.shutdown_requested = true;
                            break;
                        }
                    }
                }
                let capture_fd = capture.as_raw_fd();
                capture.stream_on(EndpointKind::Capture).map_err(FatalError::Endpoint)?;
                self.pool_cap.streaming = true;
                wait_ctx
                    .add(&FdRef(capture_fd), Interest::READABLE, Token::Capture)
                    .map_err(FatalError::Poll)?;
            }
        }
        Ok(())
    }

    fn allocate_gadget_pool(&mut self) -> Result<(), FatalError> {
        let (w, h) = (self.state.active_width, self.state.active_height);
        let sizeimage = self.max_payload_transfer_size().max(w * h * 2);
        self.gadget
            .set_format(self.state.active_pixfmt, w, h, sizeimage, EndpointKind::GadgetOutput)
            .map_err(FatalError::Endpoint)?;
        if let Ok(fmt) = self.gadget.get_format(EndpointKind::GadgetOutput) {
            log::debug!("gadget format negotiated: {}x{} fourcc={:#x} sizeimage={}", fmt.width, fmt.height, fmt.pixelformat, fmt.sizeimage);
        }
        let granted = self
            .gadget
            .request_buffers(self.nbufs as u32, self.pool_out.mode, EndpointKind::GadgetOutput)
            .map_err(FatalError::Endpoint)?;

        match self.pool_out.mode {
            IoMode::Mapped => {
                let mut infos = Vec::with_capacity(granted as usize);
                for i in 0..granted as usize {
                    let info = self.gadget.query_buffer(i, EndpointKind::GadgetOutput).map_err(FatalError::Endpoint)?;
                    let mapping = self.gadget.map_buffer(i, &info).map_err(FatalError::Endpoint)?;
                    infos.push((info, mapping));
                }
                self.pool_out.populate_mapped(infos);
            }
            IoMode::UserPtr => {
                let length = frame_buffer_length(&self.state);
                self.pool_out
                    .populate_userptr((0..granted as usize).map(|_| crate::endpoint::BufferInfo { length, offset: 0 }).collect());
            }
        }
        Ok(())
    }

    fn allocate_capture_pool(&mut self) -> Result<(), FatalError> {
        let (w, h) = (self.state.active_width, self.state.active_height);
        let capture = self.capture.as_mut().expect("bridged role always has a capture endpoint");
        capture
            .set_format(self.state.active_pixfmt, w, h, 0, EndpointKind::Capture)
            .map_err(FatalError::Endpoint)?;
        let granted = capture
            .request_buffers(self.nbufs as u32, self.pool_cap.mode, EndpointKind::Capture)
            .map_err(FatalError::Endpoint)?;

        match self.pool_cap.mode {
            IoMode::Mapped => {
                let mut infos = Vec::with_capacity(granted as usize);
                for i in 0..granted as usize {
                    let info = capture.query_buffer(i, EndpointKind::Capture).map_err(FatalError::Endpoint)?;
                    let mapping = capture.map_buffer(i, &info).map_err(FatalError::Endpoint)?;
                    infos.push((info, mapping));
                }
                self.pool_cap.populate_mapped(infos);
            }
            IoMode::UserPtr => {
                let length = frame_buffer_length(&self.state);
                self.pool_cap.populate_linked(granted as usize, length);
            }
        }
        Ok(())
    }

    /// The address/length backing a shared buffer index, taken from
    /// whichever of the two pools owns a real mapping (rule: mode
    /// complementarity means exactly one of them is `Mapped`).
    fn shared_address(pool_out: &EndpointPool, pool_cap: &EndpointPool, index: usize) -> Option<(*mut u8, usize)> {
        if pool_out.mode == IoMode::Mapped {
            pool_out.buffers.get(index).and_then(|b| b.user_ptr())
        } else {
            pool_cap.buffers.get(index).and_then(|b| b.user_ptr())
        }
    }

    /// Gadget write-readiness: a buffer was consumed by the host and is now
    /// free. Standalone mode refills it with a freshly synthesized frame;
    /// bridged mode hands its (shared) backing back to the capture device
    /// so it can be refilled with the next captured frame.
    fn pump_output(&mut self) -> Result<(), FatalError> {
        if self.pool_out.is_empty() {
            return Ok(());
        }
        match self.gadget.dequeue(self.pool_out.mode, EndpointKind::GadgetOutput).map_err(FatalError::Endpoint)? {
            DequeueOutcome::WouldBlock => Ok(()),
            DequeueOutcome::DeviceGone => {
                self.state.shutdown_requested = true;
                Ok(())
            }
            DequeueOutcome::Buffer { index, error_flagged, .. } => {
                self.pool_out.dequeued += 1;
                if error_flagged {
                    // Rule 3: dropped, not re-queued; drain naturally.
                    self.state.shutdown_requested = true;
                    return Ok(());
                }
                if self.state.shutdown_requested {
                    return Ok(());
                }
                match self.state.role {
                    Role::Standalone => {
                        let bytes_used = {
                            let buf = &mut self.pool_out.buffers[index];
                            // SAFETY: buffer was just dequeued; userspace
                            // owns it until the enqueue below.
                            let slice = unsafe { buf.as_mut_slice() };
                            synth::synthesize(slice, &mut self.state)
                        };
                        let user_ptr = self.pool_out.buffers[index].user_ptr();
                        match self
                            .gadget
                            .enqueue(index, bytes_used, self.pool_out.mode, user_ptr, EndpointKind::GadgetOutput)
                            .map_err(FatalError::Endpoint)?
                        {
                            EnqueueOutcome::Queued => self.pool_out.enqueued += 1,
                            EnqueueOutcome::DeviceGone => self.state.shutdown_requested = true,
                        }
                        Ok(())
                    }
                    Role::Bridged => {
                        let user_ptr = Self::shared_address(&self.pool_out, &self.pool_cap, index);
                        let capture = self.capture.as_mut().expect("bridged role always has a capture endpoint");
                        match capture
                            .enqueue(index, 0, self.pool_cap.mode, user_ptr, EndpointKind::Capture)
                            .map_err(FatalError::Endpoint)?
                        {
                            EnqueueOutcome::Queued => self.pool_cap.enqueued += 1,
                            EnqueueOutcome::DeviceGone => self.state.shutdown_requested = true,
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Capture read-readiness (bridged only). Rule 2 (pump invariant):
    /// only forward a frame when capture is streaming and either no
    /// buffer has been queued to the gadget yet (bootstrap), the gadget
    /// queue has room, or shutdown is already in progress.
    fn pump_capture(&mut self) -> Result<(), FatalError> {
        if !self.pool_cap.streaming {
            return Ok(());
        }
        let gate_ok = !self.state.first_buffer_queued
            || self.pool_out.dequeued + 1 >= self.pool_out.enqueued
            || self.state.shutdown_requested;
        if !gate_ok {
            return Ok(());
        }

        let capture = self.capture.as_mut().expect("bridged role always has a capture endpoint");
        match capture.dequeue(self.pool_cap.mode, EndpointKind::Capture).map_err(FatalError::Endpoint)? {
            DequeueOutcome::WouldBlock => Ok(()),
            DequeueOutcome::DeviceGone => {
                self.state.shutdown_requested = true;
                Ok(())
            }
            DequeueOutcome::Buffer { index, bytes_used, .. } => {
                self.pool_cap.dequeued += 1;
                if self.state.shutdown_requested {
                    return Ok(());
                }
                let user_ptr = Self::shared_address(&self.pool_out, &self.pool_cap, index);
                match self
                    .gadget
                    .enqueue(index, bytes_used, self.pool_out.mode, user_ptr, EndpointKind::GadgetOutput)
                    .map_err(FatalError::Endpoint)?
                {
                    EnqueueOutcome::Queued => {
                        self.pool_out.enqueued += 1;
                        if !self.state.first_buffer_queued {
                            // Rule 4: first buffer must land before STREAMON.
                            self.gadget.stream_on(EndpointKind::GadgetOutput).map_err(FatalError::Endpoint)?;
                            self.state.first_buffer_queued = true;
                            self.pool_out.streaming = true;
                        }
                    }
                    EnqueueOutcome::DeviceGone => self.state.shutdown_requested = true,
                }
                Ok(())
            }
        }
    }

    /// Rule 6: STREAMOFF teardown. Stops both endpoints, frees both pools
    /// (request-buffers 0), resets streaming/priming flags. Subscriptions
    /// are left in place.
    fn teardown(&mut self, wait_ctx: &mut WaitContext<Token>) {
        if self.pool_out.streaming {
            if let Err(e) = self.gadget.stream_off(EndpointKind::GadgetOutput) {
                log::warn!("gadget stream_off failed: {}", e);
            }
        }
        let _ = self.gadget.request_buffers(0, self.pool_out.mode, EndpointKind::GadgetOutput);
        self.pool_out.clear();

        if let Some(capture) = self.capture.as_mut() {
            if self.pool_cap.streaming {
                if let Err(e) = capture.stream_off(EndpointKind::Capture) {
                    log::warn!("capture stream_off failed: {}", e);
                }
            }
            let _ = capture.request_buffers(0, self.pool_cap.mode, EndpointKind::Capture);
            wait_ctx.remove(&FdRef(capture.as_raw_fd()));
        }
        self.pool_cap.clear();
        self.state.first_buffer_queued = false;
    }
}

fn frame_buffer_length(state: &DeviceState) -> usize {
    match state.active_pixfmt {
        crate::endpoint::PixelFormat::Yuyv => (state.active_width * state.active_height * 2) as usize,
        crate::endpoint::PixelFormat::Mjpeg => state
            .image_blob
            .as_ref()
            .map(|b| b.len())
            .unwrap_or_else(|| largest_catalog_frame_bytes()),
    }
}

fn largest_catalog_frame_bytes() -> usize {
    catalog::FORMATS
        .iter()
        .flat_map(|f| f.frames.iter())
        .map(|fr| (fr.width * fr.height * 2) as usize)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::endpoint::BufferInfo;
    use crate::endpoint::CurrentFormat;
    use crate::endpoint::PixelFormat;
    use crate::endpoint::Response;

    /// Call counters shared between a `MockEndpoint` and the test that built
    /// it, so assertions can inspect what happened without downcasting the
    /// `Box<dyn VideoEndpoint>` the orchestrator owns.
    #[derive(Default)]
    struct Counters {
        dequeue_calls: Cell<u32>,
        stream_on_calls: Cell<u32>,
        stream_off_calls: Cell<u32>,
    }

    /// `VideoEndpoint` double: `dequeue` plays back a scripted sequence of
    /// outcomes, everything else records call counts via `Counters`. Never
    /// exercises `map_buffer` — tests populate pools directly via
    /// `populate_userptr`/`populate_linked` rather than going through
    /// `allocate_*_pool`, so no real mapping is ever required.
    struct MockEndpoint {
        dequeue_script: RefCell<VecDeque<DequeueOutcome>>,
        counters: Rc<Counters>,
    }

    impl MockEndpoint {
        fn new(dequeue_script: Vec<DequeueOutcome>, counters: Rc<Counters>) -> Self {
            MockEndpoint { dequeue_script: RefCell::new(dequeue_script.into()), counters }
        }
    }

    impl VideoEndpoint for MockEndpoint {
        fn query_capabilities(&self, _kind: EndpointKind) -> crate::endpoint::Result<()> {
            Ok(())
        }

        fn get_format(&self, _kind: EndpointKind) -> crate::endpoint::Result<CurrentFormat> {
            Ok(CurrentFormat { width: 0, height: 0, pixelformat: 0, sizeimage: 0 })
        }

        fn set_format(&self, _pixfmt: PixelFormat, _width: u32, _height: u32, _sizeimage: u32, _kind: EndpointKind) -> crate::endpoint::Result<()> {
            Ok(())
        }

        fn request_buffers(&mut self, n: u32, _mode: IoMode, _kind: EndpointKind) -> crate::endpoint::Result<u32> {
            Ok(n)
        }

        fn query_buffer(&self, _index: usize, _kind: EndpointKind) -> crate::endpoint::Result<BufferInfo> {
            Ok(BufferInfo { length: 0, offset: 0 })
        }

        fn map_buffer(&self, _index: usize, _info: &BufferInfo) -> crate::endpoint::Result<uvc_base::MappedRegion> {
            unimplemented!("tests never allocate Mapped pools through the endpoint")
        }

        fn enqueue(
            &mut self,
            _index: usize,
            _bytes_used: usize,
            _mode: IoMode,
            _user_ptr: Option<(*mut u8, usize)>,
            _kind: EndpointKind,
        ) -> crate::endpoint::Result<EnqueueOutcome> {
            Ok(EnqueueOutcome::Queued)
        }

        fn dequeue(&mut self, _mode: IoMode, _kind: EndpointKind) -> crate::endpoint::Result<DequeueOutcome> {
            self.counters.dequeue_calls.set(self.counters.dequeue_calls.get() + 1);
            Ok(self.dequeue_script.borrow_mut().pop_front().unwrap_or(DequeueOutcome::WouldBlock))
        }

        fn stream_on(&mut self, _kind: EndpointKind) -> crate::endpoint::Result<()> {
            self.counters.stream_on_calls.set(self.counters.stream_on_calls.get() + 1);
            Ok(())
        }

        fn stream_off(&mut self, _kind: EndpointKind) -> crate::endpoint::Result<()> {
            self.counters.stream_off_calls.set(self.counters.stream_off_calls.get() + 1);
            Ok(())
        }

        fn set_control(&self, _id: u32, _value: i32) -> crate::endpoint::Result<()> {
            Ok(())
        }

        fn subscribe_event(&self, _event_type: u32) -> crate::endpoint::Result<()> {
            Ok(())
        }

        fn dequeue_event(&mut self) -> crate::endpoint::Result<Event> {
            Ok(Event::Connect)
        }

        fn send_response(&self, _response: Response) -> crate::endpoint::Result<()> {
            Ok(())
        }

        fn as_raw_fd(&self) -> RawFd {
            -1
        }
    }

    fn bridged_orchestrator(capture_script: Vec<DequeueOutcome>, nbufs: usize) -> (Orchestrator, Rc<Counters>, Rc<Counters>) {
        let gadget_counters = Rc::new(Counters::default());
        let capture_counters = Rc::new(Counters::default());
        let gadget = Box::new(MockEndpoint::new(Vec::new(), Rc::clone(&gadget_counters))) as Box<dyn VideoEndpoint>;
        let capture = Box::new(MockEndpoint::new(capture_script, Rc::clone(&capture_counters))) as Box<dyn VideoEndpoint>;
        let state = DeviceState::new(Role::Bridged, PixelFormat::Yuyv, 640, 360);
        let mut orch = Orchestrator::new(gadget, Some(capture), IoMode::Mapped, nbufs, state);
        // `pool_out.mode` stays `Mapped` so `shared_address` resolves to it;
        // buffers are populated through `populate_userptr` regardless, which
        // gives every buffer `owned_storage` (so `user_ptr()` is `Some`)
        // without ever touching a real mapping.
        orch.pool_out.populate_userptr((0..nbufs).map(|_| BufferInfo { length: 128, offset: 0 }).collect());
        orch.pool_cap.populate_linked(nbufs, 128);
        orch.pool_cap.streaming = true;
        (orch, gadget_counters, capture_counters)
    }

    #[test]
    fn bridged_first_forward_streams_on_exactly_once_p2() {
        let (mut orch, gadget_counters, _capture_counters) = bridged_orchestrator(
            vec![
                DequeueOutcome::Buffer { index: 0, bytes_used: 100, error_flagged: false },
                DequeueOutcome::Buffer { index: 1, bytes_used: 100, error_flagged: false },
            ],
            4,
        );

        orch.pump_capture().unwrap();
        assert!(orch.state.first_buffer_queued);
        assert!(orch.pool_out.streaming);
        assert_eq!(orch.pool_out.enqueued, 1);

        orch.pump_capture().unwrap();
        assert_eq!(orch.pool_out.enqueued, 2);

        assert_eq!(gadget_counters.stream_on_calls.get(), 1, "STREAMON must fire exactly once, on the first forwarded buffer");
    }

    #[test]
    fn bridged_pump_capture_gate_blocks_when_gadget_queue_is_full() {
        let (mut orch, _gadget_counters, capture_counters) =
            bridged_orchestrator(vec![DequeueOutcome::Buffer { index: 0, bytes_used: 100, error_flagged: false }], 4);
        orch.state.first_buffer_queued = true;
        orch.pool_out.enqueued = 5;
        orch.pool_out.dequeued = 3; // in_flight == 2, gate: dequeued + 1 (4) < enqueued (5) -> blocked

        orch.pump_capture().unwrap();

        assert_eq!(capture_counters.dequeue_calls.get(), 0, "gate must prevent dequeuing from capture while the gadget queue is full");
    }

    #[test]
    fn bridged_pump_capture_gate_opens_once_gadget_queue_drains() {
        let (mut orch, _gadget_counters, capture_counters) =
            bridged_orchestrator(vec![DequeueOutcome::Buffer { index: 0, bytes_used: 100, error_flagged: false }], 4);
        orch.state.first_buffer_queued = true;
        orch.pool_out.enqueued = 5;
        orch.pool_out.dequeued = 4; // dequeued + 1 (5) >= enqueued (5) -> gate opens

        orch.pump_capture().unwrap();

        assert_eq!(capture_counters.dequeue_calls.get(), 1);
    }

    #[test]
    fn teardown_resets_pools_and_streaming_flags_p6() {
        let (mut orch, _gadget_counters, _capture_counters) = bridged_orchestrator(Vec::new(), 4);
        orch.pool_out.enqueued = 3;
        orch.pool_out.dequeued = 1;
        orch.pool_out.streaming = true;
        orch.pool_cap.enqueued = 3;
        orch.pool_cap.dequeued = 1;
        orch.state.first_buffer_queued = true;

        let mut wait_ctx: WaitContext<Token> = WaitContext::new();
        orch.teardown(&mut wait_ctx);

        assert!(orch.pool_out.is_empty());
        assert!(!orch.pool_out.streaming);
        assert_eq!(orch.pool_out.enqueued, 0);
        assert_eq!(orch.pool_out.dequeued, 0);
        assert!(orch.pool_cap.is_empty());
        assert!(!orch.pool_cap.streaming);
        assert!(!orch.state.first_buffer_queued);
    }
}
