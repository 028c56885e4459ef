/// Life-cycle callbacks back to whoever placed an order. Implemented by the
/// external command surface; the core calls these synchronously and never
/// waits on their outcome beyond the call returning.
pub trait Notifier: Send {
    fn on_cancelled(&self, reason: &str, faulted: bool);
    fn on_initializing(&self, note: &str);
    fn on_ready(&self, note: &str, dodo_code: &str);
    fn on_completed(&self, note: &str);
    fn on_notify(&self, note: &str);
}

/// Drops every notification. Used for internally generated work.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn on_cancelled(&self, _reason: &str, _faulted: bool) {}
    fn on_initializing(&self, _note: &str) {}
    fn on_ready(&self, _note: &str, _dodo_code: &str) {}
    fn on_completed(&self, _note: &str) {}
    fn on_notify(&self, _note: &str) {}
}
