//! Output device discovery.
//!
//! ```no_run
//! use mehrspur::CpalDevice;
//!
//! for device in CpalDevice::list_outputs() {
//!     println!("{} ({} Hz, {} ch)", device.name(), device.sample_rate(), device.channels());
//! }
//! ```

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::EngineResult;
use crate::nodes::CpalSink;

/// An output device and the default stream config it will be opened with.
///
/// Hand it to [`CpalOutput::with_device`](crate::output::CpalOutput::with_device)
/// to play through something other than the system default.
pub struct CpalDevice {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    fn probe(device: cpal::Device) -> Option<Self> {
        let config = match device.default_output_config() {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!(%err, "skipping device without a default output config");
                return None;
            }
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self { device, config, name })
    }

    pub fn default_output() -> Option<Self> {
        Self::probe(cpal::default_host().default_output_device()?)
    }

    /// Every output device with a usable default config
    pub fn list_outputs() -> Vec<Self> {
        match cpal::default_host().output_devices() {
            Ok(devices) => devices.filter_map(Self::probe).collect(),
            Err(err) => {
                tracing::warn!(%err, "could not enumerate output devices");
                Vec::new()
            }
        }
    }

    /// The first output whose name contains `pattern`, ignoring case
    pub fn find_output(pattern: &str) -> Option<Self> {
        let pattern = pattern.to_lowercase();
        Self::list_outputs()
            .into_iter()
            .find(|device| device.name.to_lowercase().contains(&pattern))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Start a stream on this device
    pub fn open_sink(&self) -> EngineResult<CpalSink> {
        CpalSink::open(&self.device, &self.config)
    }
}
