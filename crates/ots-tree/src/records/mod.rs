//! Leaf record types stored under the aggregate tree's index nodes.

pub mod issuer;
pub mod server;
pub mod thread;

pub use issuer::IssuerProfile;
pub use server::{Endpoint, ServerDescriptor};
pub use thread::{Thread, ThreadItem};
