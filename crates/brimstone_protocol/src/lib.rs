//! Wire codec for Minecraft protocol revision 757 (game version 1.18.1).
//!
//! Everything on the wire is big-endian; variable-length integers use 7-bit
//! little-endian groups with a continuation bit. A serialized packet begins
//! with a [`VarInt`] packet ID followed by the body; the length prefix that
//! frames packets on a TCP stream is the transport layer's concern and is not
//! part of [`Encode`]/[`Decode`].

mod bounded;
mod impls;
pub mod packets;
mod raw;
pub mod var_int;
mod var_long;

use std::io::Write;

use anyhow::Context;
pub use bounded::Bounded;
pub use raw::RawBytes;
pub use var_int::VarInt;
pub use var_long::VarLong;
pub use {anyhow, uuid};

/// The protocol version this crate targets.
pub const PROTOCOL_VERSION: i32 = 757;

/// The stringified name of the game version this crate targets.
pub const MINECRAFT_VERSION: &str = "1.18.1";

/// The `Encode` trait allows objects to be written to the wire. It is the
/// inverse of [`Decode`].
pub trait Encode {
    /// Writes this object to the provided writer.
    ///
    /// If this type also implements [`Decode`] then successful calls must
    /// decode back to an equal value, consuming exactly the bytes written.
    fn encode(&self, w: impl Write) -> anyhow::Result<()>;
}

/// The `Decode` trait allows objects to be read from the wire. It is the
/// inverse of [`Encode`].
///
/// `Decode` is parameterized by a lifetime so decoded values can borrow from
/// the byte slice they were read from.
pub trait Decode<'a>: Sized {
    /// Reads this object from the provided byte slice, shrinking the slice
    /// from the front as bytes are consumed.
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self>;
}

/// Types considered to be protocol packets.
///
/// The [`Encode`] and [`Decode`] implementations on a packet cover only its
/// body; the leading ID is handled by [`encode_with_id`](Self::encode_with_id)
/// and by the dispatcher on the receive side.
pub trait Packet: std::fmt::Debug {
    /// The leading VarInt ID of this packet.
    const ID: i32;
    /// The name of this packet for diagnostics.
    const NAME: &'static str;
    /// The side this packet is intended for.
    const SIDE: PacketSide;
    /// The protocol stage in which this packet is used.
    const STATE: PacketState;

    /// Encodes this packet's VarInt ID followed by its body.
    fn encode_with_id(&self, mut w: impl Write) -> anyhow::Result<()>
    where
        Self: Encode,
    {
        VarInt(Self::ID)
            .encode(&mut w)
            .context("failed to encode packet ID")?;

        self.encode(w)
    }
}

/// The side a packet is intended for.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketSide {
    /// Server -> client.
    Clientbound,
    /// Client -> server.
    Serverbound,
}

/// The protocol stage a connection is in.
///
/// Stages only ever advance: Handshaking -> Status, Handshaking -> Login,
/// Login -> Play.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub enum PacketState {
    #[default]
    Handshaking,
    Status,
    Login,
    Play,
}
