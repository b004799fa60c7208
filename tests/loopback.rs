//! End-to-end scenarios over a loopback connection: a real client socket
//! against the live reactor, exercising framing, dispatch, and the send path
//! together.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use brimstone_network::{Server, ServerConfig};
use brimstone_protocol::packets::handshaking::{HandshakeC2s, HandshakeNextState};
use brimstone_protocol::packets::status::{
    QueryPingC2s, QueryPongS2c, QueryRequestC2s, QueryResponseS2c,
};
use brimstone_protocol::{Decode, Encode, Packet, VarInt};
use brimstone_server::{game_loop, GameHandler, TickArenas};

const STATUS_JSON: &str =
    r#"{"version":{"name":"1.18.1","protocol":757},"description":{"text":"Hello World!"}}"#;

/// Boots a server on an ephemeral port and returns its address. The reactor
/// and game loop threads run until the test process exits.
fn start_server() -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };

    let arenas = Arc::new(TickArenas::new().unwrap());
    game_loop::spawn(Arc::clone(&arenas)).unwrap();

    let handler = GameHandler::new(Arc::clone(&arenas), &config);
    let mut server = Server::bind(config, handler).unwrap();
    let addr = server.local_addr();

    thread::spawn(move || {
        if let Err(e) = server.run() {
            panic!("reactor died: {e}");
        }
    });

    addr
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

/// Writes one frame: varint length, then the packet ID and body.
fn write_packet<P: Packet + Encode>(stream: &mut TcpStream, pkt: &P) {
    let mut body = Vec::new();
    pkt.encode_with_id(&mut body).unwrap();

    let mut frame = Vec::new();
    VarInt(body.len() as i32).encode(&mut frame).unwrap();
    frame.extend_from_slice(&body);

    stream.write_all(&frame).unwrap();
}

/// Reads one frame and asserts the length prefix matches the body exactly.
fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut length = 0_i32;
    for shift in 0.. {
        let mut byte = [0_u8; 1];
        stream.read_exact(&mut byte).unwrap();
        length |= (byte[0] as i32 & 0x7f) << (shift * 7);
        if byte[0] & 0x80 == 0 {
            break;
        }
    }

    let mut body = vec![0; length as usize];
    stream.read_exact(&mut body).unwrap();
    body
}

fn read_packet<'a, P: Packet + Decode<'a>>(body: &'a [u8]) -> P {
    let mut r = body;
    assert_eq!(VarInt::decode(&mut r).unwrap().0, P::ID);
    let pkt = P::decode(&mut r).unwrap();
    assert!(r.is_empty(), "trailing bytes after {}", P::NAME);
    pkt
}

fn handshake(next_state: HandshakeNextState, protocol_version: i32) -> HandshakeC2s<'static> {
    HandshakeC2s {
        protocol_version: VarInt(protocol_version),
        server_address: "localhost".into(),
        server_port: 25565,
        next_state,
    }
}

#[test]
fn status_ping_and_latency() {
    let addr = start_server();
    let mut stream = connect(addr);

    write_packet(&mut stream, &handshake(HandshakeNextState::Status, 757));
    write_packet(&mut stream, &QueryRequestC2s);

    let body = read_frame(&mut stream);
    let response: QueryResponseS2c = read_packet(&body);
    assert_eq!(response.json, STATUS_JSON);

    // The connection stays open for the latency probe.
    let payload = 0x1122_3344_5566_7788_i64;
    write_packet(&mut stream, &QueryPingC2s { payload });

    let body = read_frame(&mut stream);
    let pong: QueryPongS2c = read_packet(&body);
    assert_eq!(pong.payload, payload);
}

#[test]
fn wrong_protocol_version_is_disconnected() {
    let addr = start_server();
    let mut stream = connect(addr);

    write_packet(&mut stream, &handshake(HandshakeNextState::Login, 756));

    // The server drops the client; the socket observes EOF (or a reset,
    // depending on timing).
    let mut buf = [0_u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
}

#[test]
fn single_byte_fragments_still_frame() {
    let addr = start_server();
    let mut stream = connect(addr);

    let mut bytes = Vec::new();
    {
        let mut body = Vec::new();
        handshake(HandshakeNextState::Status, 757)
            .encode_with_id(&mut body)
            .unwrap();
        VarInt(body.len() as i32).encode(&mut bytes).unwrap();
        bytes.extend_from_slice(&body);
    }
    bytes.push(0x01); // length of the status request
    bytes.push(0x00); // its packet ID

    for byte in bytes {
        stream.write_all(&[byte]).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let body = read_frame(&mut stream);
    let response: QueryResponseS2c = read_packet(&body);
    assert_eq!(response.json, STATUS_JSON);
}

#[test]
fn oversize_packet_is_disconnected() {
    let addr = start_server();
    let mut stream = connect(addr);

    // Declared length 65537, one byte over the cap.
    stream.write_all(&[0x81, 0x80, 0x04, 0x01]).unwrap();

    let mut buf = [0_u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
}

#[test]
fn multiple_clients_are_isolated() {
    let addr = start_server();

    let mut bad = connect(addr);
    let mut good = connect(addr);

    write_packet(&mut good, &handshake(HandshakeNextState::Status, 757));

    // One client misbehaving must not take the other down.
    bad.write_all(&[0x80, 0x80, 0x80, 0x80, 0x80]).unwrap();
    let mut buf = [0_u8; 16];
    assert_eq!(bad.read(&mut buf).unwrap_or(0), 0);

    write_packet(&mut good, &QueryRequestC2s);
    let body = read_frame(&mut good);
    let response: QueryResponseS2c = read_packet(&body);
    assert_eq!(response.json, STATUS_JSON);
}
