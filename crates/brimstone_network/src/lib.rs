//! The transport layer of the server: a single-threaded io_uring reactor,
//! fixed-size buffer pools over anonymous mappings, and the resumable
//! receiver that reassembles length-prefixed packets from a fragmented TCP
//! stream.
//!
//! The reactor owns every connected [`Client`] and performs all network I/O;
//! decoded packet bodies are handed to a [`PacketHandler`] one at a time, in
//! byte-stream order per client. Outbound packets travel through a
//! [`PacketSink`] so the send path can also be driven from tests or, later,
//! from threads other than the reactor.

pub mod buffer_pool;
pub mod client;
pub mod config;
pub mod error;
pub mod receiver;
pub mod send;
pub mod server;

pub use buffer_pool::{BufferPool, MappedBuffer, SharedBufferPool};
pub use client::{Client, ClientId};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use receiver::Receiver;
pub use send::{ClientContext, PacketHandler, PacketSink, SendBuffer};
pub use server::Server;
