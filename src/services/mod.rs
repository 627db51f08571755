pub mod control;
pub mod listing;
pub mod mailbox;
pub mod namespace;
pub mod power;
pub mod transfer;

pub use control::ControlChannel;
pub use listing::PreviewSet;
pub use mailbox::Mailbox;
pub use namespace::{ResolvedPath, ShareSet};
pub use power::{PowerControl, SystemPower};
