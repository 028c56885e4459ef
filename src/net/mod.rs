pub mod commands;
pub mod transport;
