//! Session and message storage
//!
//! In-memory, process-lifetime storage of ordered message logs keyed by
//! session id. Sessions are created implicitly on first append and live
//! until explicitly deleted or the process restarts.

mod store;

pub use store::{ChatMessage, ImageAttachment, MessageRole, SessionStore, UserTurn};
