pub mod publisher;
pub mod outbox_relay;
pub mod cash_balance;

pub use publisher::{ChannelPublisher, EventPublisher, PublishedMessage};
pub use outbox_relay::OutboxRelay;
pub use cash_balance::CashBalanceProjection;
