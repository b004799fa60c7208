use super::*;

/// The only packet of the handshaking stage. Announces the client's protocol
/// version and which sub-protocol it wants to enter next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HandshakeC2s<'a> {
    pub protocol_version: VarInt,
    pub server_address: Bounded<&'a str, 255>,
    pub server_port: u16,
    pub next_state: HandshakeNextState,
}

impl Packet for HandshakeC2s<'_> {
    const ID: i32 = packet_id::HANDSHAKE_C2S;
    const NAME: &'static str = "HandshakeC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Handshaking;
}

impl Encode for HandshakeC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.protocol_version.encode(&mut w)?;
        self.server_address.encode(&mut w)?;
        self.server_port.encode(&mut w)?;
        self.next_state.encode(w)
    }
}

impl<'a> Decode<'a> for HandshakeC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            protocol_version: VarInt::decode(r)?,
            server_address: Bounded::decode(r)?,
            server_port: u16::decode(r)?,
            next_state: HandshakeNextState::decode(r)?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandshakeNextState {
    Status,
    Login,
}

impl Encode for HandshakeNextState {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        let tag = match self {
            Self::Status => 1,
            Self::Login => 2,
        };
        VarInt(tag).encode(w)
    }
}

impl Decode<'_> for HandshakeNextState {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        match VarInt::decode(r)?.0 {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            other => bail!("invalid next state: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trip() {
        let pkt = HandshakeC2s {
            protocol_version: VarInt(757),
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: HandshakeNextState::Status,
        };

        let mut buf = vec![];
        pkt.encode(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(HandshakeC2s::decode(&mut r).unwrap(), pkt);
        assert!(r.is_empty());
    }

    #[test]
    fn invalid_next_state_rejected() {
        let mut buf = vec![];
        VarInt(757).encode(&mut buf).unwrap();
        "x".encode(&mut buf).unwrap();
        25565_u16.encode(&mut buf).unwrap();
        VarInt(3).encode(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert!(HandshakeC2s::decode(&mut r).is_err());
    }
}
