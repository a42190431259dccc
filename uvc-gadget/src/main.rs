//! Entry point: parses configuration, opens the gadget (and, in bridged
//! mode, the capture) device, builds the initial `DeviceState`, and runs
//! the orchestrator's event loop. Parses args, builds up the pieces, hands
//! off to a `run` that returns a `Result` the top level logs and turns
//! into an exit code.

mod buffer;
mod catalog;
mod cli;
mod control;
mod device_state;
mod endpoint;
mod error;
mod kernel_abi;
mod orchestrator;
mod streaming;
mod synth;

use std::path::Path;
use std::process::ExitCode;

use cli::Config;
use device_state::DeviceState;
use device_state::Role;
use endpoint::EndpointKind;
use endpoint::V4l2Endpoint;
use endpoint::VideoEndpoint;
use error::ConfigurationError;
use orchestrator::Orchestrator;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config: Config = argh::from_env();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> anyhow::Result<()> {
    config.validate_nbufs()?;
    let pixfmt = config.pixel_format()?;
    let resolution = config.resolution()?;
    let (width, height) = resolution.dims();

    let image_blob = match &config.mjpeg_image {
        Some(path) => Some(cli::load_mjpeg(path)?),
        None => None,
    };
    if pixfmt == endpoint::PixelFormat::Mjpeg && image_blob.is_none() {
        log::warn!("--format=1 (MJPEG) selected with no --mjpeg-image; frames will be empty until committed size is known");
    }

    let role = if config.dummy_data { Role::Standalone } else { Role::Bridged };

    let gadget = open_gadget(&config.uvc_device)?;
    let capture = match role {
        Role::Standalone => None,
        Role::Bridged => {
            let path = config
                .capture_device
                .as_ref()
                .ok_or_else(|| ConfigurationError::CaptureOpen { path: String::new(), reason: "--capture-device is required unless --dummy-data is set".into() })?;
            Some(open_capture(path)?)
        }
    };

    let mut state = DeviceState::new(role, pixfmt, width, height);
    state.image_blob = image_blob;
    state.speed = config.speed();
    state.bulk_mode = config.bulk_mode;
    state.mult = config.mult;
    state.burst = config.burst;
    state.max_packet = DeviceState::max_packet_for(state.speed, state.bulk_mode);

    let mut orchestrator = Orchestrator::new(gadget, capture, config.io_mode(), config.nbufs, state);
    orchestrator.run()?;
    Ok(())
}

fn open_gadget(path: &Path) -> Result<Box<dyn VideoEndpoint>, ConfigurationError> {
    let endpoint = V4l2Endpoint::open(path)
        .map_err(|e| ConfigurationError::UvcOpen { path: path.display().to_string(), reason: e.to_string() })?;
    endpoint
        .query_capabilities(EndpointKind::GadgetOutput)
        .map_err(|e| ConfigurationError::UvcOpen { path: path.display().to_string(), reason: e.to_string() })?;
    Ok(Box::new(endpoint))
}

fn open_capture(path: &Path) -> Result<Box<dyn VideoEndpoint>, ConfigurationError> {
    let endpoint = V4l2Endpoint::open(path)
        .map_err(|e| ConfigurationError::CaptureOpen { path: path.display().to_string(), reason: e.to_string() })?;
    endpoint
        .query_capabilities(EndpointKind::Capture)
        .map_err(|e| ConfigurationError::CaptureOpen { path: path.display().to_string(), reason: e.to_string() })?;
    Ok(Box::new(endpoint))
}
