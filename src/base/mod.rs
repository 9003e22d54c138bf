//! Shared driver infrastructure: the error taxonomy, the wire frame, the
//! ring byte buffer, and the background buffer monitor.

mod error;
mod frame;
mod monitor;
mod ring_byte_buffer;

// Re-export common driver items.
pub use self::error::{Error, Result};
pub use self::frame::Frame;
pub use self::monitor::{BufferMonitor, Mailbox};
pub use self::ring_byte_buffer::RingByteBuffer;
