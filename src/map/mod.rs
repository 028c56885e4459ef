pub mod diff;
pub mod terrain;
