pub mod price_feed;
pub mod pair_selection;
pub mod notification_sink;
pub mod bot;

pub use price_feed::{PriceFeed, RefreshStats};
pub use pair_selection::{PairSelection, DEFAULT_TOP_N};
pub use notification_sink::{DeliveryReport, NotificationSink, SinkConfig};
pub use bot::{BotConfig, BotError, BotStatus, CycleReport, SignalBot};
