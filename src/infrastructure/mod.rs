pub mod config;
pub mod functions;
pub mod moderation;
pub mod repository;

pub use config::*;
pub use functions::*;
pub use moderation::*;
pub use repository::*;
