pub mod quality;
pub mod service;

pub use quality::*;
pub use service::*;
