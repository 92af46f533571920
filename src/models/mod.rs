pub mod channel;

pub use channel::{resolve_channel, ChannelKey, FulfillmentAction};
