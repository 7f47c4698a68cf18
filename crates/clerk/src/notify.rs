use tracing::info;

/// Receives one summary per completed batch run. Delivery failures stay inside the
/// implementation; nothing is returned to the engine.
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        info!(subject, body, "batch notification");
    }
}
