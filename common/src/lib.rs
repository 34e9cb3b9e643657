//! Common code shared between `frame_server` and `frame_sender`.
pub mod data_url;
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
