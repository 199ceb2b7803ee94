pub mod receipts;
pub mod storage;
pub mod types;

pub use receipts::ReadReceipts;
pub use storage::{FeedbackStore, MemoryFeedbackStore, Snapshot, SnapshotReceiver};
pub use types::{
    newest_first, FeedbackMessage, MessageBody, MessageId, MessageScope, NewMessage, ReadStatus,
    UserId,
};
