//! Service layer: orchestration over repository traits.

pub mod hash;
pub mod token;
