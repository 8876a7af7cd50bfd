//! Sink nodes - consume audio with no audio outputs

mod rtrb_sink;
pub use rtrb_sink::RtrbSink;

#[cfg(feature = "cpal_sink")]
mod cpal_sink;
#[cfg(feature = "cpal_sink")]
pub use cpal_sink::CpalSink;
