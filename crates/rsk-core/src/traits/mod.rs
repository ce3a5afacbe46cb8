//! Core trait definitions

mod responder;
mod transport;

pub use responder::{
    BackpressureStrategy, NoopResponder, Responder, ResponderItems, ResponderStream,
};
pub use transport::{FrameSink, FrameStream, Transport};
