pub mod conversation;
pub mod order;

pub use conversation::ConversationId;
pub use order::{CompleteOrder, ItemKind, OrderRecord, RecognizedOrder, Size};
