use crate::event::SharedEvent;
use tokio::sync::mpsc;

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Sending half of an event stream
pub type EventSender = Sender<SharedEvent>;

/// Receiving half of an event stream
pub type EventReceiver = Receiver<SharedEvent>;

/// Create a bounded channel with the specified buffer size.
///
/// A full channel suspends the sender, which is how a slow destination
/// slows ingestion down instead of dropping events.
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size.max(1))
}
