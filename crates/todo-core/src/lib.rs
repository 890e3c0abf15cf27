pub mod envelope;
pub mod transcript;

pub use envelope::{Envelope, EnvelopeError};
pub use transcript::{Message, Role, Transcript};
