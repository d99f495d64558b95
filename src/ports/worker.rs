use crate::worker::{DisplayOptions, WindowClient};

/// Browser facilities a service worker calls into: the notification tray,
/// the window clients it controls, and its own registration lifecycle.
///
/// The worker runs on a single-threaded event loop, so none of these futures
/// need to be `Send`.
pub trait NotificationHost {
    type Error: std::fmt::Display;

    fn show_notification(
        &self,
        title: &str,
        options: &DisplayOptions,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn close_notification(&self, tag: Option<&str>);

    fn match_clients(&self) -> impl Future<Output = Vec<WindowClient>>;

    fn focus_client(&self, client_id: &str) -> impl Future<Output = Result<(), Self::Error>>;

    fn open_window(&self, url: &str) -> impl Future<Output = Result<(), Self::Error>>;

    fn skip_waiting(&self) -> impl Future<Output = Result<(), Self::Error>>;

    fn claim_clients(&self) -> impl Future<Output = Result<(), Self::Error>>;
}
