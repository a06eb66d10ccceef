//! The codeloop turn loop.
//!
//! A [`Session`] answers a query by asking a model for code, running every
//! tagged block it returns, and feeding the (possibly error-annotated) code
//! back into long-term memory so later turns can retrieve it:
//!
//! 1. **Retrieve** similar stored code for the query
//! 2. **Compose** context + recent queries + question into one prompt
//! 3. **Stream** the model's answer, echoing fragments as they arrive
//! 4. **Extract** fenced code blocks
//! 5. **Execute** each block under a wall-clock ceiling
//! 6. **Remember** the code (cache file + store slices) and the query

pub mod events;
pub mod extract;
pub mod feedback;
pub mod prompt;
pub mod session;
pub mod streamer;

#[cfg(test)]
mod test_helpers;

pub use events::TurnEvent;
pub use extract::{CodeExtractor, Extraction};
pub use feedback::{split_chunks, FeedbackReceipt, FeedbackWriter};
pub use prompt::{compose, RequestSettings, SYSTEM_PROMPT};
pub use session::{BlockReport, Session, TurnOutcome, NO_CODE_NOTICE};
pub use streamer::stream_response;
