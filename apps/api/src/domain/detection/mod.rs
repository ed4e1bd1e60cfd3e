pub mod errors;
pub mod outcome;
pub mod payload;

pub use errors::DetectionError;
pub use outcome::{Confidence, DetectionOutcome, FailureKind, Label, Verdict};
pub use payload::{ImagePayload, decode_image};
