//! Event model definitions

pub mod device;
pub mod events;
pub mod record;
