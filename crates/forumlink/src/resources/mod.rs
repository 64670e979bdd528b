//! API resource endpoints
//!
//! Only the identity lookup the link handshake depends on lives here; every
//! other forum operation goes through the
//! [`Transport`](forumlink_transport::Transport) directly.

pub mod users;

pub use users::{ForumUser, Users};
