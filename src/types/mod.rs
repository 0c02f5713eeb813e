pub mod data;
pub mod error;

pub use data::{InputData, ResponseData};
pub use error::{
    AllmError, ErrorCategory, ErrorClassifier, LlmError, Result, ValidationError,
};
