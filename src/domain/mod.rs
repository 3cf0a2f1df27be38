pub mod account;
pub mod draft;
pub mod listing;
pub mod moderation;
pub mod notification;
pub mod outbox;

pub use account::*;
pub use draft::*;
pub use listing::*;
pub use moderation::*;
pub use notification::*;
pub use outbox::*;
