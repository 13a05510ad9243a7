pub mod analyze;
pub mod devices;
pub mod record;
pub mod replay;
pub mod view;
