pub mod channel;
pub mod config;
pub mod numeric;
pub mod record;

pub use channel::{ChannelId, ChannelPolicy, PolicyOverride};
pub use record::Record;
