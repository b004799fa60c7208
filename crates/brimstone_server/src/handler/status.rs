use brimstone_network::{ClientContext, Error, Result};
use brimstone_protocol::packets::status::{QueryPingC2s, QueryPongS2c, QueryResponseS2c};
use brimstone_protocol::{MINECRAFT_VERSION, PROTOCOL_VERSION};
use serde::Serialize;

/// The server-list document, serialized field-by-field in declaration order.
#[derive(Serialize)]
struct StatusResponse<'a> {
    version: Version<'a>,
    description: Description<'a>,
}

#[derive(Serialize)]
struct Version<'a> {
    name: &'a str,
    protocol: i32,
}

#[derive(Serialize)]
struct Description<'a> {
    text: &'a str,
}

// TODO: take the description from the configuration once it grows a field
// for it.
const SERVER_DESCRIPTION: &str = "Hello World!";

pub(crate) fn handle_query_request(cx: &mut ClientContext<'_>) -> Result<()> {
    let response = StatusResponse {
        version: Version {
            name: MINECRAFT_VERSION,
            protocol: PROTOCOL_VERSION,
        },
        description: Description {
            text: SERVER_DESCRIPTION,
        },
    };

    let json = serde_json::to_string(&response)
        .map_err(|_| Error::Check("failed to serialize the status response"))?;

    cx.send_packet(&QueryResponseS2c { json: &json })
}

pub(crate) fn handle_ping(cx: &mut ClientContext<'_>, pkt: &QueryPingC2s) -> Result<()> {
    cx.send_packet(&QueryPongS2c {
        payload: pkt.payload,
    })
}
