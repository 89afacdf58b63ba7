//! Mapping module - turns controller state into virtual device events

pub mod button_map;
pub mod config;
pub mod executor;

pub use button_map::{AxisEvent, AxisEventTable, ButtonEvent, ButtonRemapTable};
pub use config::{Config, ConfigError};
pub use executor::MappingExecutor;
