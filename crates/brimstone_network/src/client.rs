use std::net::SocketAddrV4;
use std::os::fd::OwnedFd;

use brimstone_protocol::PacketState;

use crate::buffer_pool::MappedBuffer;
use crate::receiver::Receiver;

/// A handle to a client that stays valid across disconnects.
///
/// Slab slots are recycled, so a bare index could be left dangling by a
/// disconnect racing an in-flight completion. Pairing the index with the
/// generation stamped at accept time makes stale handles resolve to nothing
/// instead of to whichever client inherited the slot.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ClientId {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// A connected peer, owned by the reactor from accept until disconnect.
#[derive(Debug)]
pub struct Client {
    /// The accepted socket. Closed when the client is dropped.
    pub(crate) socket: OwnedFd,
    pub(crate) addr: SocketAddrV4,
    /// The protocol stage in force; advanced by the handshake and login
    /// handlers.
    pub(crate) state: PacketState,
    pub(crate) receiver: Receiver,
    /// The TCP receive buffer, checked out of its pool for the lifetime of
    /// the connection.
    pub(crate) recv_buffer: MappedBuffer,
    pub(crate) generation: u64,
}

impl Client {
    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    pub fn state(&self) -> PacketState {
        self.state
    }
}
