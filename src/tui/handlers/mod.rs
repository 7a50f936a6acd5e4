pub mod key;
pub mod message;

pub use key::*;
pub use message::*;
