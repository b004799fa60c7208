//! The outbound half of the packet pipeline, decoupled from the reactor so
//! handlers can be exercised without a live ring.

use std::io::{self, Write};
use std::net::SocketAddrV4;

use brimstone_protocol::{Encode, Packet, PacketState};
use tracing::warn;

use crate::buffer_pool::MappedBuffer;
use crate::error::{Error, Result};

/// Receives every framed inbound packet, in byte-stream order per client.
pub trait PacketHandler {
    /// Called with the packet body: the ID varint followed by the fields.
    ///
    /// A [`Error::Protocol`] return disconnects this client only; any other
    /// error is treated as fatal by the reactor.
    fn handle_packet(&mut self, cx: &mut ClientContext<'_>, body: &[u8]) -> Result<()>;
}

/// Where composed packets go. The reactor's sink submits a vectored write;
/// test sinks collect the bytes.
pub trait PacketSink {
    /// Checks a buffer out of the protocol-send pool.
    fn take_buffer(&mut self) -> Result<SendBuffer>;

    /// Takes ownership of the composed buffer and queues it for delivery,
    /// prefixing the varint frame length.
    fn submit(&mut self, buffer: SendBuffer) -> Result<()>;
}

/// The slice of per-client state a handler is allowed to touch during one
/// dispatch.
pub struct ClientContext<'a> {
    state: &'a mut PacketState,
    addr: SocketAddrV4,
    compression: bool,
    sink: &'a mut dyn PacketSink,
}

impl<'a> ClientContext<'a> {
    pub fn new(
        state: &'a mut PacketState,
        addr: SocketAddrV4,
        compression: bool,
        sink: &'a mut dyn PacketSink,
    ) -> Self {
        Self {
            state,
            addr,
            compression,
            sink,
        }
    }

    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    pub fn state(&self) -> PacketState {
        *self.state
    }

    /// Advances the protocol stage. Stages never move backwards.
    pub fn set_state(&mut self, state: PacketState) {
        *self.state = state;
    }

    /// Composes `pkt` (ID varint plus body) into a send buffer and hands it
    /// to the sink.
    pub fn send_packet<P>(&mut self, pkt: &P) -> Result<()>
    where
        P: Packet + Encode,
    {
        if self.compression {
            // With compression negotiated the frame grows a data-length
            // varint and the body is deflated before submission.
            return Err(Error::Check("compression hook is not implemented"));
        }

        let mut buffer = self.sink.take_buffer()?;
        if let Err(e) = pkt.encode_with_id(&mut buffer) {
            warn!("failed to encode {}: {e:#}", P::NAME);
            return Err(Error::Check("failed to encode outbound packet"));
        }

        self.sink.submit(buffer)
    }
}

/// A protocol-send pool buffer being filled with one outbound packet.
///
/// Writes past the buffer's capacity fail, which bounds every outbound
/// packet by `max_send_packet_size` without further checks.
#[derive(Debug)]
pub struct SendBuffer {
    buffer: MappedBuffer,
    len: usize,
}

impl SendBuffer {
    pub fn new(buffer: MappedBuffer) -> Self {
        Self { buffer, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.len]
    }

    /// Splits into the backing pool buffer and the number of bytes written.
    pub fn into_parts(self) -> (MappedBuffer, usize) {
        (self.buffer, self.len)
    }
}

impl Write for SendBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let capacity = self.buffer.len() - self.len;
        if data.len() > capacity {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "outbound packet exceeds the send buffer size",
            ));
        }

        self.buffer.as_mut_slice()[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_buffer_bounds_writes() {
        let mut buffer = SendBuffer::new(MappedBuffer::map(8).unwrap());
        buffer.write_all(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(buffer.as_slice(), [1, 2, 3, 4, 5]);

        assert!(buffer.write_all(&[6, 7, 8, 9]).is_err());

        let (_, len) = buffer.into_parts();
        assert_eq!(len, 5);
    }
}
