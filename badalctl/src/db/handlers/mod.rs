//! Repository implementations for CRUD operations.

pub mod deferrals;
pub mod drafts;
pub mod email_tokens;
pub mod optouts;
pub mod organizations;
pub mod recipients;
pub mod repository;
pub mod submissions;

pub use deferrals::Deferrals;
pub use drafts::Drafts;
pub use email_tokens::EmailTokens;
pub use optouts::OptOuts;
pub use organizations::Organizations;
pub use recipients::Recipients;
pub use repository::Repository;
pub use submissions::Submissions;
