//! Surface fMRI → parcel connectome → connectivity gradients.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod render;

pub use error::{Error, Result};
