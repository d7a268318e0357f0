//! Data models for chat groups and their messages

mod group;
mod message;

pub use group::*;
pub use message::*;
