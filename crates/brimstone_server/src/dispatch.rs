//! Routes framed packet bodies to typed stage handlers.
//!
//! The first varint of a body is the packet ID; together with the client's
//! protocol stage it selects a parser and a handler. Parsed records are
//! interned into the current tick arena before the handler sees them, so
//! nothing a handler holds can reference the TCP receive buffer once the
//! dispatch returns.

use std::sync::Arc;

use anyhow::anyhow;
use brimstone_network::{ClientContext, Error, PacketHandler, Result, ServerConfig};
use brimstone_protocol::packets::handshaking::HandshakeC2s;
use brimstone_protocol::packets::login::{LoginHelloC2s, LoginKeyC2s, LoginQueryResponseC2s};
use brimstone_protocol::packets::packet_id;
use brimstone_protocol::packets::status::{QueryPingC2s, QueryRequestC2s};
use brimstone_protocol::{Bounded, Decode, Packet, PacketState, RawBytes, VarInt};
use tracing::trace;

use crate::handler::{handshaking, login, status};
use crate::tick_arena::{ArenaGuard, TickArenas};

/// The core's [`PacketHandler`]: stage dispatch over the tick arenas.
pub struct GameHandler {
    arenas: Arc<TickArenas>,
    strict_play_packets: bool,
}

impl GameHandler {
    pub fn new(arenas: Arc<TickArenas>, config: &ServerConfig) -> Self {
        Self {
            arenas,
            strict_play_packets: config.strict_play_packets,
        }
    }
}

impl PacketHandler for GameHandler {
    fn handle_packet(&mut self, cx: &mut ClientContext<'_>, body: &[u8]) -> Result<()> {
        let mut r = body;
        let id = VarInt::decode(&mut r)
            .map_err(|e| Error::Protocol(e.context("failed to decode packet ID")))?
            .0;

        match cx.state() {
            PacketState::Handshaking => self.handle_handshaking(cx, id, r),
            PacketState::Status => self.handle_status(cx, id, r),
            PacketState::Login => self.handle_login(cx, id, r),
            PacketState::Play => self.handle_play(cx, id),
        }
    }
}

impl GameHandler {
    fn handle_handshaking(
        &mut self,
        cx: &mut ClientContext<'_>,
        id: i32,
        mut r: &[u8],
    ) -> Result<()> {
        match id {
            packet_id::HANDSHAKE_C2S => {
                let pkt = decode_body::<HandshakeC2s>(&mut r)?;
                let guard = self.arenas.take_current();
                let pkt = intern_handshake(&guard, &pkt)?;
                handshaking::handle_handshake(cx, pkt)
            }
            other => Err(unexpected_packet(other, PacketState::Handshaking)),
        }
    }

    fn handle_status(&mut self, cx: &mut ClientContext<'_>, id: i32, mut r: &[u8]) -> Result<()> {
        match id {
            packet_id::QUERY_REQUEST_C2S => {
                decode_body::<QueryRequestC2s>(&mut r)?;
                status::handle_query_request(cx)
            }
            packet_id::QUERY_PING_C2S => {
                let pkt = decode_body::<QueryPingC2s>(&mut r)?;
                let guard = self.arenas.take_current();
                let pkt = guard.alloc(pkt).ok_or(Error::Check("tick arena exhausted"))?;
                status::handle_ping(cx, pkt)
            }
            other => Err(unexpected_packet(other, PacketState::Status)),
        }
    }

    fn handle_login(&mut self, cx: &mut ClientContext<'_>, id: i32, mut r: &[u8]) -> Result<()> {
        match id {
            packet_id::LOGIN_HELLO_C2S => {
                let pkt = decode_body::<LoginHelloC2s>(&mut r)?;
                let guard = self.arenas.take_current();
                let pkt = intern_login_hello(&guard, &pkt)?;
                login::handle_hello(cx, pkt)
            }
            packet_id::LOGIN_KEY_C2S => {
                let pkt = decode_body::<LoginKeyC2s>(&mut r)?;
                let guard = self.arenas.take_current();
                let pkt = intern_login_key(&guard, &pkt)?;
                login::handle_key(cx, pkt)
            }
            packet_id::LOGIN_QUERY_RESPONSE_C2S => {
                let pkt = decode_body::<LoginQueryResponseC2s>(&mut r)?;
                let guard = self.arenas.take_current();
                let pkt = intern_login_query_response(&guard, &pkt)?;
                login::handle_query_response(cx, pkt)
            }
            other => Err(unexpected_packet(other, PacketState::Login)),
        }
    }

    /// Play-stage bodies have no typed parsers here; the simulation layer
    /// will claim them. Until then they are dropped, or rejected when the
    /// configuration says to be strict.
    fn handle_play(&mut self, cx: &mut ClientContext<'_>, id: i32) -> Result<()> {
        if self.strict_play_packets {
            return Err(unexpected_packet(id, PacketState::Play));
        }
        trace!("dropping play packet {id:#04x} from {}", cx.addr());
        Ok(())
    }
}

/// Decodes a packet body and rejects bodies with bytes left over.
fn decode_body<'a, P>(r: &mut &'a [u8]) -> Result<P>
where
    P: Packet + Decode<'a>,
{
    let pkt = P::decode(r)
        .map_err(|e| Error::Protocol(e.context(format!("failed to decode {}", P::NAME))))?;

    if !r.is_empty() {
        return Err(Error::Protocol(anyhow!(
            "{} trailing bytes after {}",
            r.len(),
            P::NAME
        )));
    }

    Ok(pkt)
}

fn unexpected_packet(id: i32, state: PacketState) -> Error {
    Error::Protocol(anyhow!("unexpected packet id {id:#04x} in the {state:?} stage"))
}

fn arena_full() -> Error {
    Error::Check("tick arena exhausted")
}

fn intern_handshake<'g>(
    guard: &'g ArenaGuard<'_>,
    pkt: &HandshakeC2s<'_>,
) -> Result<&'g HandshakeC2s<'g>> {
    let server_address = guard.alloc_str(pkt.server_address.0).ok_or_else(arena_full)?;
    let record = guard
        .alloc(HandshakeC2s {
            protocol_version: pkt.protocol_version,
            server_address: Bounded(server_address),
            server_port: pkt.server_port,
            next_state: pkt.next_state,
        })
        .ok_or_else(arena_full)?;
    Ok(record)
}

fn intern_login_hello<'g>(
    guard: &'g ArenaGuard<'_>,
    pkt: &LoginHelloC2s<'_>,
) -> Result<&'g LoginHelloC2s<'g>> {
    let username = guard.alloc_str(pkt.username.0).ok_or_else(arena_full)?;
    let record = guard
        .alloc(LoginHelloC2s {
            username: Bounded(username),
        })
        .ok_or_else(arena_full)?;
    Ok(record)
}

fn intern_login_key<'g>(
    guard: &'g ArenaGuard<'_>,
    pkt: &LoginKeyC2s<'_>,
) -> Result<&'g LoginKeyC2s<'g>> {
    let shared_secret = guard.alloc_slice(pkt.shared_secret).ok_or_else(arena_full)?;
    let verify_token = guard.alloc_slice(pkt.verify_token).ok_or_else(arena_full)?;
    let record = guard
        .alloc(LoginKeyC2s {
            shared_secret,
            verify_token,
        })
        .ok_or_else(arena_full)?;
    Ok(record)
}

fn intern_login_query_response<'g>(
    guard: &'g ArenaGuard<'_>,
    pkt: &LoginQueryResponseC2s<'_>,
) -> Result<&'g LoginQueryResponseC2s<'g>> {
    let data = match pkt.data {
        Some(raw) => {
            let bytes: &[u8] = guard.alloc_slice(raw.0).ok_or_else(arena_full)?;
            Some(RawBytes(bytes))
        }
        None => None,
    };
    let record = guard
        .alloc(LoginQueryResponseC2s {
            message_id: pkt.message_id,
            data,
        })
        .ok_or_else(arena_full)?;
    Ok(record)
}
