pub mod classifier;
pub mod frame;
pub mod history;
pub mod pipeline;
pub mod store;
pub mod transport;
pub mod types;

pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;
