//! 基础设施层

pub mod stream_consumer;

pub use stream_consumer::{GameStreamConsumer, StreamConsumerConfig};
