//! Conversation-level operations the runtime applies on behalf of users.

pub mod explode;
pub mod metadata;

pub use explode::{ExplodeOutcome, ExplodeProcessor};
pub use metadata::ConversationMetadataWriter;
