use anyhow::anyhow;
use brimstone_network::{ClientContext, Error, Result};
use brimstone_protocol::packets::login::{LoginHelloC2s, LoginKeyC2s, LoginQueryResponseC2s};
use tracing::trace;

/// The session layer owns the reply (compression, then success); the core
/// only records the attempt.
pub(crate) fn handle_hello(cx: &mut ClientContext<'_>, pkt: &LoginHelloC2s<'_>) -> Result<()> {
    trace!("login start from {} as {}", cx.addr(), pkt.username.0);
    Ok(())
}

/// The core never sends an encryption request, so any response is bogus.
pub(crate) fn handle_key(_cx: &mut ClientContext<'_>, _pkt: &LoginKeyC2s<'_>) -> Result<()> {
    Err(Error::Protocol(anyhow!(
        "unsolicited encryption response, no request was sent"
    )))
}

/// Same story for plugin responses: no request was ever issued.
pub(crate) fn handle_query_response(
    _cx: &mut ClientContext<'_>,
    pkt: &LoginQueryResponseC2s<'_>,
) -> Result<()> {
    Err(Error::Protocol(anyhow!(
        "unsolicited login plugin response: message_id={}",
        pkt.message_id.0
    )))
}
