pub mod log_notifier;
pub mod webhook;

pub use log_notifier::LogNotifier;
pub use webhook::WebhookNotifier;
