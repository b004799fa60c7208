//! The per-client receiver: a resumable state machine that turns an
//! arbitrarily fragmented byte stream into whole protocol packets.
//!
//! [`Receiver::consume`] is called once per successful recv. It frames as
//! many complete packets as the input allows, invoking the emit callback for
//! each, and then suspends by saving its position — no thread ever blocks
//! waiting for the rest of a packet.
//!
//! The fast path never allocates: when a packet's declared length is already
//! available, the body is emitted straight out of the TCP receive buffer.
//! Only a packet spanning multiple recvs checks an assembly buffer out of the
//! protocol-recv pool, and that buffer goes back the moment the packet has
//! been emitted.

use anyhow::anyhow;
use brimstone_protocol::VarInt;

use crate::buffer_pool::{BufferPool, MappedBuffer};
use crate::error::{Error, Result};

/// Which suspension point [`Receiver::consume`] resumes from.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
enum Stage {
    /// Reading the length prefix, one varint byte at a time.
    #[default]
    ReadLength,
    /// Copying a body that spans recvs into the assembly buffer.
    FillBody,
}

/// Per-client framing state. Exactly one of "idle", "mid-length", or
/// "mid-body" holds between calls, selected by the stage.
#[derive(Debug, Default)]
pub struct Receiver {
    stage: Stage,
    /// Partial length-varint accumulator.
    varint_value: i32,
    varint_len: usize,
    /// Declared body length of the packet in progress.
    packet_length: usize,
    /// Slow-path assembly buffer, checked out of the protocol-recv pool.
    body: Option<MappedBuffer>,
    filled: usize,
    /// Hook flag: packet bodies are DEFLATE-compressed past the negotiated
    /// threshold. The codec itself lives upstack; the core never sets this.
    pub compression: bool,
    /// Hook flag: the stream is AES/CFB8 encrypted. Same story.
    pub encryption: bool,
    max_packet_size: usize,
}

impl Receiver {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            ..Self::default()
        }
    }

    /// Frames every whole packet available in `data`, calling `emit` with
    /// each body (packet ID varint included), then suspends.
    ///
    /// On any error the receiver returns its assembly buffer to the pool and
    /// resets, so a subsequent call starts from a clean slate. The caller
    /// decides the client's fate from the error's class.
    pub fn consume(
        &mut self,
        mut data: &[u8],
        pool: &mut BufferPool,
        mut emit: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let res = self.run(&mut data, pool, &mut emit);
        if res.is_err() {
            self.release(pool);
        }
        res
    }

    /// Returns any held assembly buffer and resets to the idle state.
    pub(crate) fn release(&mut self, pool: &mut BufferPool) {
        if let Some(buffer) = self.body.take() {
            pool.put(buffer);
        }
        self.stage = Stage::ReadLength;
        self.varint_value = 0;
        self.varint_len = 0;
        self.packet_length = 0;
        self.filled = 0;
    }

    fn run(
        &mut self,
        data: &mut &[u8],
        pool: &mut BufferPool,
        emit: &mut impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        loop {
            match self.stage {
                Stage::ReadLength => {
                    loop {
                        let Some((&byte, rest)) = data.split_first() else {
                            // Input exhausted mid-varint; resume here.
                            return Ok(());
                        };
                        *data = rest;

                        self.varint_value |= (byte as i32 & 0x7f) << (self.varint_len * 7);
                        self.varint_len += 1;

                        if byte & 0x80 == 0 {
                            break;
                        }

                        if self.varint_len >= VarInt::MAX_SIZE {
                            return Err(Error::Protocol(anyhow!(
                                "packet length varint is longer than {} bytes",
                                VarInt::MAX_SIZE
                            )));
                        }
                    }

                    let length = self.varint_value;
                    self.varint_value = 0;
                    self.varint_len = 0;

                    if length < 0 {
                        return Err(Error::Protocol(anyhow!(
                            "negative packet length: {length}"
                        )));
                    }
                    let length = length as usize;

                    if length <= data.len() {
                        // Fast path: the whole body is already in the TCP
                        // buffer.
                        let (body, rest) = data.split_at(length);
                        *data = rest;
                        self.finish_packet(body, emit)?;
                        continue;
                    }

                    if length > self.max_packet_size {
                        return Err(Error::Protocol(anyhow!(
                            "declared packet length {length} exceeds the {} byte limit",
                            self.max_packet_size
                        )));
                    }

                    self.packet_length = length;
                    self.filled = 0;
                    self.body = Some(pool.take()?);
                    self.stage = Stage::FillBody;
                }
                Stage::FillBody => {
                    let Some(body) = &mut self.body else {
                        return Err(Error::Check("no assembly buffer in the fill stage"));
                    };

                    let take = (self.packet_length - self.filled).min(data.len());
                    let (chunk, rest) = data.split_at(take);
                    body.as_mut_slice()[self.filled..self.filled + take].copy_from_slice(chunk);
                    *data = rest;

                    if self.encryption {
                        // The copied bytes would be decrypted in place here.
                        return Err(Error::Check("encryption hook is not implemented"));
                    }

                    self.filled += take;
                    if self.filled < self.packet_length {
                        // Need another recv; resume here.
                        return Ok(());
                    }

                    self.stage = Stage::ReadLength;
                    let buffer = match self.body.take() {
                        Some(buffer) => buffer,
                        None => return Err(Error::Check("assembly buffer vanished")),
                    };

                    let res = self.finish_packet(&buffer.as_slice()[..self.packet_length], emit);
                    pool.put(buffer);
                    res?;
                }
            }
        }
    }

    fn finish_packet(&mut self, body: &[u8], emit: &mut impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        if self.compression {
            // The body would be inflated here before dispatch.
            return Err(Error::Check("compression hook is not implemented"));
        }
        emit(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 65536;

    /// Feeds `stream` to a fresh receiver in chunks of `chunk` bytes and
    /// collects the emitted packet bodies.
    fn collect(stream: &[u8], chunk: usize) -> Result<Vec<Vec<u8>>> {
        let mut receiver = Receiver::new(MAX);
        let mut pool = BufferPool::new(MAX);
        let mut packets = Vec::new();

        for piece in stream.chunks(chunk.max(1)) {
            receiver.consume(piece, &mut pool, |body| {
                packets.push(body.to_vec());
                Ok(())
            })?;
        }

        Ok(packets)
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        use brimstone_protocol::Encode;

        let mut out = Vec::new();
        VarInt(body.len() as i32).encode(&mut out).unwrap();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn single_packet_byte_by_byte() {
        let packets = collect(&[0x02, 0xf0, 0x9f], 1).unwrap();
        assert_eq!(packets, [vec![0xf0, 0x9f]]);
    }

    #[test]
    fn chunking_is_invariant() {
        let mut stream = Vec::new();
        let bodies: Vec<Vec<u8>> = [3_usize, 1, 200, 0, 77]
            .iter()
            .enumerate()
            .map(|(i, &len)| vec![i as u8 + 1; len])
            .collect();
        for body in &bodies {
            stream.extend_from_slice(&frame(body));
        }

        let whole = collect(&stream, stream.len()).unwrap();
        assert_eq!(whole, bodies);

        for chunk in [1, 2, 3, 7, 64] {
            assert_eq!(collect(&stream, chunk).unwrap(), bodies, "chunk size {chunk}");
        }
    }

    #[test]
    fn slow_path_assembles_across_recvs() {
        // Body longer than any single chunk, so the pool buffer is used.
        let body: Vec<u8> = (0..1000).map(|i| i as u8).collect();
        let stream = frame(&body);

        let packets = collect(&stream, 100).unwrap();
        assert_eq!(packets, [body]);
    }

    #[test]
    fn length_at_cap_is_accepted() {
        let body = vec![0x55; MAX];
        let stream = frame(&body);

        let packets = collect(&stream, 4096).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), MAX);
    }

    #[test]
    fn length_above_cap_is_rejected_before_the_body() {
        // 65537 as a varint, followed by a single stray byte.
        let err = collect(&[0x81, 0x80, 0x04, 0x01], 4).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err}");
    }

    #[test]
    fn overlong_length_varint_is_rejected() {
        let err = collect(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01], 6).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err}");
    }

    #[test]
    fn resets_after_error() {
        let mut receiver = Receiver::new(MAX);
        let mut pool = BufferPool::new(MAX);

        let err = receiver
            .consume(&[0x80, 0x80, 0x80, 0x80, 0x80], &mut pool, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        // A clean stream parses normally after the reset.
        let mut packets = Vec::new();
        receiver
            .consume(&[0x01, 0xaa], &mut pool, |body| {
                packets.push(body.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(packets, [vec![0xaa]]);
    }

    #[test]
    fn emit_error_returns_the_assembly_buffer() {
        let mut receiver = Receiver::new(MAX);
        let mut pool = BufferPool::new(MAX);

        // Force the slow path, then fail dispatch.
        let body = vec![0x11; 300];
        let stream = frame(&body);
        let (first, second) = stream.split_at(10);

        receiver.consume(first, &mut pool, |_| Ok(())).unwrap();
        let err = receiver
            .consume(second, &mut pool, |_| {
                Err(Error::Protocol(anyhow!("rejected")))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        // The buffer made it back: the next take reuses the same mapping.
        let reused = pool.take().unwrap();
        assert_eq!(reused.len(), MAX);
    }

    #[test]
    fn empty_packet_is_emitted() {
        let packets = collect(&[0x00, 0x01, 0x42], 1).unwrap();
        assert_eq!(packets, [vec![], vec![0x42]]);
    }
}
