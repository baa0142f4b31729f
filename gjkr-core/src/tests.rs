//! Test modules

pub mod helpers;
pub mod membership;
pub mod proptests;
pub mod serialization;
