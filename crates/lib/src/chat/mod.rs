//! Natural-language chat: the active transcript, the persisted conversation list, and the
//! workspace that keeps the two consistent.

mod api;
mod conversations;
mod transcript;
mod workspace;

pub use api::{ChatBackend, HttpChat};
pub use conversations::ConversationListController;
pub use transcript::{ConversationController, PendingTurn, SendOutcome, TranscriptState};
pub use workspace::ChatWorkspace;
