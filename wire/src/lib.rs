//! Wire-level types shared by every other crate in the workspace: the member
//! identifier, the message envelope and its type tag, and the value codec
//! contract consumed (never implemented) by the replication engine.
//!
//! Kept dependency-free of `membership`/`entry`/`replica` on purpose — it is
//! the one crate every other crate is allowed to depend on.

pub mod codec;
pub mod error;
pub mod member;
pub mod message;

pub use codec::{BincodeCodec, Resolvers, ValueCodec};
pub use error::WireError;
pub use member::MemberId;
pub use message::{Message, MessageType};
