pub mod models;
pub mod transcribe;

pub use models::*;
pub use transcribe::*;
