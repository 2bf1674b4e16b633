pub mod inspector;
pub mod tables;

pub use inspector::{inspect, ModuleMetadata};
