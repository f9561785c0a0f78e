/// HTTP middleware utilities for forum-service
///
/// The forum trusts the gateway in front of it for authentication; the
/// extractor here only reads the identity headers it forwards.
pub mod identity;

pub use identity::{ROLE_HEADER, USER_ID_HEADER};
