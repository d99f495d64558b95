pub mod push;
pub mod time;
pub mod worker;

pub use push::PushSender;
pub use time::TimeProvider;
pub use worker::NotificationHost;
