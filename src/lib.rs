#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod calibration;
pub mod config;
pub mod editor;
pub mod error;
pub mod flux;
pub mod identity;
pub mod math;
pub mod pipeline;
pub mod quantify;
pub mod report;
pub mod segment;
pub mod series;

pub use error::{DegenerateInput, Error, Operation, UpstreamError, ValidationError};

pub type Result<T> = ::std::result::Result<T, Error>;
