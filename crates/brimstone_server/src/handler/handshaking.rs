use anyhow::anyhow;
use brimstone_network::{ClientContext, Error, Result};
use brimstone_protocol::packets::handshaking::{HandshakeC2s, HandshakeNextState};
use brimstone_protocol::{PacketState, PROTOCOL_VERSION};
use tracing::trace;

pub(crate) fn handle_handshake(cx: &mut ClientContext<'_>, pkt: &HandshakeC2s<'_>) -> Result<()> {
    match pkt.next_state {
        HandshakeNextState::Status => cx.set_state(PacketState::Status),
        HandshakeNextState::Login => {
            if pkt.protocol_version.0 != PROTOCOL_VERSION {
                // TODO: answer with LoginDisconnectS2c so the client sees a
                // reason instead of a closed socket.
                return Err(Error::Protocol(anyhow!(
                    "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
                    pkt.protocol_version.0
                )));
            }
            cx.set_state(PacketState::Login);
        }
    }

    trace!("{} entered the {:?} stage", cx.addr(), cx.state());
    Ok(())
}
