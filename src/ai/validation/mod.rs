//! Input and Response Validation
//!
//! Two gates around generation:
//! - [`input`]: pre-flight checks that the prompt, system prompt and every
//!   example agree on their placeholder keys. Any failure aborts the batch
//!   before a single request is sent.
//! - [`response`]: post-generation extraction of a JSON object from free text
//!   and deserialization into the caller's schema. Failures never escape; they
//!   become the example's error.

pub mod input;
pub mod response;

pub use input::{validate_input, validate_system_prompt};
pub use response::{ResponseParser, extract_json_candidate};
