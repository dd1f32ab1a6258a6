//! Shell stream classification and reply correlation.

mod demux;
mod echo;
mod reply;

pub use demux::{Demultiplexer, Dispatch, ReplyEvent, StreamState};
pub use echo::{EchoScan, EchoSuppressor};
pub use reply::RemoteDir;

#[cfg(test)]
mod tests;
