//! Live update stream.
//!
//! One persistent socket.io connection per source carries four named events:
//! `newTX`, `update`, `updateMilestone` and `updateReattach`.

mod channel;
pub mod codec;
mod transport;

pub use channel::{ChannelState, LiveChannel};
pub use transport::{
    SocketIoConnection, SocketIoConnector, StreamConnection, StreamConnector, StreamMessage,
};
