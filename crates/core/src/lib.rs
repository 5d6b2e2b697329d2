//! Tutoring Session Core
//!
//! Domain logic for voice-assisted walkthroughs of a course: flattening the
//! course outline into numbered steps, gating progress on quiz scores,
//! accumulating the transcript turn by turn, building step-scoped tutor
//! instructions, and the PCM16 codec and playback timeline used by the audio
//! bridge. Network and device access sit behind the traits in [`realtime`] and
//! [`playback`].

pub mod audio;
pub mod error;
pub mod gate;
pub mod generic_types;
pub mod instructions;
pub mod outline;
pub mod playback;
pub mod realtime;
pub mod steps;
pub mod transcript;

pub use error::TutorError;
