#![allow(dead_code)]

pub mod fixtures;
pub mod services;

pub use fixtures::*;
pub use services::*;
