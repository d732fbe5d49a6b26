//! Built-in task handlers for the three evaluation follow-up tasks.
//!
//! Each handler owns the providers and caches it needs and is registered
//! in the pool's handler registry under its task kind. Handlers are pure
//! consumers: they never submit tasks themselves.

mod demo_audio;
mod feedback_audio;
mod feedback_text;

pub use demo_audio::DemoAudioHandler;
pub use feedback_audio::FeedbackAudioHandler;
pub use feedback_text::FeedbackTextHandler;
