//! Object detection on single frames posted over HTTP.

pub mod annotate;
pub mod codec;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod labels;
pub mod meter;
pub mod nn;
pub mod service;
pub mod utils;
