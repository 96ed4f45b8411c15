//! Database record structures matching table schemas.

pub mod deferrals;
pub mod drafts;
pub mod email_tokens;
pub mod optouts;
pub mod organizations;
pub mod recipients;
pub mod submissions;
