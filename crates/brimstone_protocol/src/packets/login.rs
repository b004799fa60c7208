use super::*;

/// Starts the login flow. The session layer answers with
/// [`LoginSuccessS2c`] (and optionally [`LoginCompressionS2c`] first).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginHelloC2s<'a> {
    pub username: Bounded<&'a str, 16>,
}

impl Packet for LoginHelloC2s<'_> {
    const ID: i32 = packet_id::LOGIN_HELLO_C2S;
    const NAME: &'static str = "LoginHelloC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginHelloC2s<'_> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.username.encode(w)
    }
}

impl<'a> Decode<'a> for LoginHelloC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            username: Bounded::decode(r)?,
        })
    }
}

/// Answer to an encryption request. Both payloads are RSA-encrypted with the
/// server's public key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginKeyC2s<'a> {
    pub shared_secret: &'a [u8],
    pub verify_token: &'a [u8],
}

impl Packet for LoginKeyC2s<'_> {
    const ID: i32 = packet_id::LOGIN_KEY_C2S;
    const NAME: &'static str = "LoginKeyC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginKeyC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.shared_secret.encode(&mut w)?;
        self.verify_token.encode(w)
    }
}

impl<'a> Decode<'a> for LoginKeyC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            shared_secret: <&[u8]>::decode(r)?,
            verify_token: <&[u8]>::decode(r)?,
        })
    }
}

/// Answer to a login plugin request. `data` is `None` when the client does
/// not understand the channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginQueryResponseC2s<'a> {
    pub message_id: VarInt,
    pub data: Option<RawBytes<'a>>,
}

impl Packet for LoginQueryResponseC2s<'_> {
    const ID: i32 = packet_id::LOGIN_QUERY_RESPONSE_C2S;
    const NAME: &'static str = "LoginQueryResponseC2s";
    const SIDE: PacketSide = PacketSide::Serverbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginQueryResponseC2s<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.message_id.encode(&mut w)?;
        self.data.encode(w)
    }
}

impl<'a> Decode<'a> for LoginQueryResponseC2s<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            message_id: VarInt::decode(r)?,
            data: Option::decode(r)?,
        })
    }
}

/// Kicks a client out of the login flow. The reason is a JSON text component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginDisconnectS2c<'a> {
    pub reason: &'a str,
}

impl Packet for LoginDisconnectS2c<'_> {
    const ID: i32 = packet_id::LOGIN_DISCONNECT_S2C;
    const NAME: &'static str = "LoginDisconnectS2c";
    const SIDE: PacketSide = PacketSide::Clientbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginDisconnectS2c<'_> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.reason.encode(w)
    }
}

impl<'a> Decode<'a> for LoginDisconnectS2c<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            reason: <&str>::decode(r)?,
        })
    }
}

/// Completes login and moves the connection to the play stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginSuccessS2c<'a> {
    pub uuid: Uuid,
    pub username: Bounded<&'a str, 16>,
}

impl Packet for LoginSuccessS2c<'_> {
    const ID: i32 = packet_id::LOGIN_SUCCESS_S2C;
    const NAME: &'static str = "LoginSuccessS2c";
    const SIDE: PacketSide = PacketSide::Clientbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginSuccessS2c<'_> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.uuid.encode(&mut w)?;
        self.username.encode(w)
    }
}

impl<'a> Decode<'a> for LoginSuccessS2c<'a> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Self {
            uuid: Uuid::decode(r)?,
            username: Bounded::decode(r)?,
        })
    }
}

/// Enables compression for all subsequent packets at or above the threshold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoginCompressionS2c {
    pub threshold: VarInt,
}

impl Packet for LoginCompressionS2c {
    const ID: i32 = packet_id::LOGIN_COMPRESSION_S2C;
    const NAME: &'static str = "LoginCompressionS2c";
    const SIDE: PacketSide = PacketSide::Clientbound;
    const STATE: PacketState = PacketState::Login;
}

impl Encode for LoginCompressionS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.threshold.encode(w)
    }
}

impl Decode<'_> for LoginCompressionS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            threshold: VarInt::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_hello_round_trip() {
        let pkt = LoginHelloC2s {
            username: "Steve".into(),
        };

        let mut buf = vec![];
        pkt.encode_with_id(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(VarInt::decode(&mut r).unwrap().0, LoginHelloC2s::ID);
        assert_eq!(LoginHelloC2s::decode(&mut r).unwrap(), pkt);
        assert!(r.is_empty());
    }

    #[test]
    fn login_query_response_round_trip() {
        let data = [0xab, 0xcd];
        for pkt in [
            LoginQueryResponseC2s {
                message_id: VarInt(5),
                data: Some(RawBytes(&data)),
            },
            LoginQueryResponseC2s {
                message_id: VarInt(5),
                data: None,
            },
        ] {
            let mut buf = vec![];
            pkt.encode(&mut buf).unwrap();

            let mut r = buf.as_slice();
            assert_eq!(LoginQueryResponseC2s::decode(&mut r).unwrap(), pkt);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn username_bound_enforced() {
        let mut buf = vec![];
        "ThisNameIsWayTooLongToBeLegal".encode(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert!(LoginHelloC2s::decode(&mut r).is_err());
    }
}
