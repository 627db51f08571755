pub mod peer;

pub use peer::PeerAddr;
