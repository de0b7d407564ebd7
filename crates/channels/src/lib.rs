//! Channel catalog and the message-delivery gateway boundary.

pub mod gateway;
pub mod registry;

pub use gateway::{InMemoryGateway, MessageGateway};
pub use registry::ChannelRegistry;
