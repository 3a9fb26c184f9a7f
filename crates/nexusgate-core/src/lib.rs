//! Transport-independent building blocks shared by `NexusGate` crates

mod context;
mod error;

pub use context::{PROVIDER_HEADER, REQUEST_ID_HEADER, RequestContext};
pub use error::HttpError;
