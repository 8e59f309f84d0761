#![allow(dead_code)]

pub use log::{debug, info, warn};

pub use crate::errors::GraphError;

pub type Mat = nalgebra::DMatrix<f64>;

pub type Result<T> = std::result::Result<T, GraphError>;
