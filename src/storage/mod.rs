pub mod inbox;
pub mod journal;
pub mod outbox;
pub mod path_utils;
pub mod percepts;
pub mod threads;
pub mod traces;

pub use inbox::Inbox;
pub use outbox::Outbox;
pub use percepts::PerceptStore;
pub use threads::ThreadStore;
pub use traces::TraceStore;
