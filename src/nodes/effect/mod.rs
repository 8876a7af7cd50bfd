//! Effect nodes - process audio (inputs → outputs)

mod gain;
mod mixer;
mod pan;

pub use gain::{Gain, GainMessage, DEFAULT_SMOOTHING_MS};
pub use mixer::Mixer;
pub use pan::{Pan, PanMessage};
