//! Sensor pre-processing for the wrench estimator

pub mod imu;

pub use imu::*;
