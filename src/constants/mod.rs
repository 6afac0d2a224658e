pub mod command_code;
mod data;
pub mod known_pin;
