use serde::Deserialize;

/// Runtime configuration of the transport layer.
///
/// Populated by the configuration layer; every field has a sensible default
/// so a bare `ServerConfig::default()` yields a working server.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen port. Port 0 binds an ephemeral port, which
    /// [`Server::local_addr`](crate::Server::local_addr) reports.
    pub port: u16,

    /// Sizes the completion ring and soft-caps concurrent clients. These are
    /// actual players, so the default is generous.
    pub max_connections: usize,

    /// Listen backlog. Too low and clients pinging the server list see
    /// connection refused under load.
    pub max_server_list_pending: u32,

    /// Size of each per-client TCP receive buffer. Much smaller than the
    /// packet cap because a single recv rarely carries more than a few
    /// kilobytes.
    pub recv_buffer_size: usize,

    /// Cap on a single inbound protocol packet. Anything declaring a larger
    /// length is a protocol violation.
    pub max_recv_packet_size: usize,

    /// Cap on a single outbound protocol packet.
    pub max_send_packet_size: usize,

    /// When set, an unrecognized play-stage packet disconnects the client
    /// instead of being dropped.
    pub strict_play_packets: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 25565,
            max_connections: 4096,
            max_server_list_pending: 512,
            recv_buffer_size: 4096,
            max_recv_packet_size: 65536,
            max_send_packet_size: 65536,
            strict_play_packets: false,
        }
    }
}
