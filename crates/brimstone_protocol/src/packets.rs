//! Typed packets for the protocol stages the server core speaks.
//!
//! Packets are grouped in submodules according to the protocol stage they're
//! used in. Only the handshaking, status, and login stages have typed bodies
//! here; play-stage traffic is routed by ID alone.

use std::io::Write;

use anyhow::bail;
use uuid::Uuid;

use crate::raw::RawBytes;
use crate::var_int::VarInt;
use crate::{Bounded, Decode, Encode, Packet, PacketSide, PacketState};

pub mod handshaking;
pub mod login;
pub mod status;

/// Wire IDs for every packet the core knows about, keyed by stage and side.
pub mod packet_id {
    // Handshaking, serverbound.
    pub const HANDSHAKE_C2S: i32 = 0x00;

    // Status, serverbound.
    pub const QUERY_REQUEST_C2S: i32 = 0x00;
    pub const QUERY_PING_C2S: i32 = 0x01;

    // Status, clientbound.
    pub const QUERY_RESPONSE_S2C: i32 = 0x00;
    pub const QUERY_PONG_S2C: i32 = 0x01;

    // Login, serverbound.
    pub const LOGIN_HELLO_C2S: i32 = 0x00;
    pub const LOGIN_KEY_C2S: i32 = 0x01;
    pub const LOGIN_QUERY_RESPONSE_C2S: i32 = 0x02;

    // Login, clientbound.
    pub const LOGIN_DISCONNECT_S2C: i32 = 0x00;
    pub const LOGIN_SUCCESS_S2C: i32 = 0x02;
    pub const LOGIN_COMPRESSION_S2C: i32 = 0x03;
}
