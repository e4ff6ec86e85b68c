//! Burn notifications: delivery seam, Telegram client and message formatting.

mod message;
mod retry;
mod sink;
pub mod telegram;

pub use message::{MessageContext, format_burn_message};
pub use retry::RetryPolicy;
pub use sink::{DeliveryError, NotificationSink};
pub use telegram::TelegramClient;
