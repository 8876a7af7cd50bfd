//! Source nodes - generate audio with no audio inputs

mod clip_player;

pub use clip_player::{ClipPlayer, PlayerMessage, Voice, VoiceEvent, VoiceId};
