// Interactive chat screen: state types and input/response handlers.

pub mod handlers;
pub mod types;
