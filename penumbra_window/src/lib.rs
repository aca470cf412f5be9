pub mod error;
pub mod input;
pub mod window;
