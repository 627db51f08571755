pub mod mailbox;
pub mod shutdown;

pub use mailbox::{Direction, MailboxMessage};
pub use shutdown::ShutdownState;
