pub mod events;
pub mod shutdown;

pub use events::{event_queue, Event, EventKind, EventReceiver, EventSender};
pub use shutdown::signalled;
