//! Request and response models
//!
//! Describes what callers hand to the coordinator, how two requests are
//! recognised as the same logical operation, and what comes back.

pub mod descriptor;
pub mod response;
pub mod signature;

// Re-export commonly used types
pub use descriptor::{Method, RequestDescriptor, RequestOptions};
pub use response::HttpResponse;
pub use signature::RequestSignature;
