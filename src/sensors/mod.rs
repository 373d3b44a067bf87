pub mod aggregator;
pub mod service;
pub mod validator;

pub use service::{RangeError, SensorService, ServiceError};
