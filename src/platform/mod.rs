//! Transport plumbing: event dispatch, the shared transport interface, live
//! interception, the replay fake and host input.

pub mod events;
pub mod fake;
pub mod input;
pub mod interceptor;
pub mod memory;
pub mod transport;

pub use events::{
    DeliveryReport, EventHub, EventKind, Listener, ListenerId, ReadyState, TransportEvent,
};
pub use fake::FakeTransport;
pub use input::{
    pointer_for_angle, HeadlessInput, InputSurface, PointerPosition, RecordingInputSurface,
    Viewport,
};
pub use interceptor::{CaptureHook, Connector, InterceptedTransport, RawSocket, SocketEvents};
pub use memory::{MemoryConnector, MemoryPeer};
pub use transport::Transport;
