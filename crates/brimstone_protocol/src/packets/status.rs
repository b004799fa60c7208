use super::*;

/// Requests the server-list JSON document. Empty body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryRequestC2s;

impl Packet for QueryRequestC2s {
    const ID: i32 = packet_id::QUERY_REQUEST_C2S;
    const NAME: &'static str = "QueryRequestC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Status;
}

impl Encode for QueryRequestC2s {
    fn encode(&self, _w: impl Write) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Decode<'_> for QueryRequestC2s {
    fn decode(_r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryResponseS2c<'a> {
    /// The server-list document as a JSON string.
    pub json: &'a str,
}

impl Packet for QueryResponseS2c<'_> {
    const ID: i32 = packet_id::QUERY_RESPONSE_S2C;
    const NAME: &'static str = "QueryResponseS2c";
    const SIDE: PacketSide = PacketSide::Clientbound;
    const STATE: PacketState = PacketState::Status;
}

impl Encode for QueryResponseS2c<'_> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.json.encode(w)
    }
}

impl<'a> Decode<'a> for QueryResponseS2c<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            json: <&str>::decode(r)?,
        })
    }
}

/// Latency probe; the payload is echoed back verbatim in [`QueryPongS2c`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryPingC2s {
    pub payload: i64,
}

impl Packet for QueryPingC2s {
    const ID: i32 = packet_id::QUERY_PING_C2S;
    const NAME: &'static str = "QueryPingC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Status;
}

impl Encode for QueryPingC2s {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.payload.encode(w)
    }
}

impl Decode<'_> for QueryPingC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            payload: i64::decode(r)?,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueryPongS2c {
    pub payload: i64,
}

impl Packet for QueryPongS2c {
    const ID: i32 = packet_id::QUERY_PONG_S2C;
    const NAME: &'static str = "QueryPongS2c";
    const SIDE: PacketSide = PacketSide::Clientbound;
    const STATE: PacketState = PacketState::Status;
}

impl Encode for QueryPongS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.payload.encode(w)
    }
}

impl Decode<'_> for QueryPongS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            payload: i64::decode(r)?,
        })
    }
}
