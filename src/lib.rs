pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod data;
pub mod error;
pub mod io;
pub mod loss;
pub mod metric;
pub mod model;
pub mod ops;
pub mod optim;
pub mod pad;
pub mod task;
pub mod train;

pub use error::{Error, Result};
