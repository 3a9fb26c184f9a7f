//! Wire format types for the client and provider API protocols
//!
//! Each module contains pure serde structs matching one JSON API format.
//! They only appear at the boundary; everything inside the gateway works on
//! the canonical types.

pub mod anthropic;
pub mod openai;
pub mod responses;
