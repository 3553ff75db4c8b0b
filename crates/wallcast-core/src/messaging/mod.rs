//! Outbound chat messaging (Telegram today).

pub mod port;
pub mod throttled;
