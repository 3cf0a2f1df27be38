pub mod drafts;
pub mod outbox;
pub mod publish;
pub mod quota;

pub use drafts::*;
pub use outbox::*;
pub use publish::*;
pub use quota::*;
