//! The reactor: a single-threaded completion loop over io_uring.
//!
//! One Accept is always in flight. Every completion carries a boxed request
//! descriptor as its user data; descriptors are recycled through a
//! spin-locked free list so the steady state allocates nothing. The reactor
//! blocks only in `submit_and_wait`.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use brimstone_protocol::{Encode, PacketState, VarInt};
use brimstone_sync::SpinLock;
use io_uring::{cqueue, opcode, squeue, types, IoUring};
use slab::Slab;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{info, trace, warn};

use crate::buffer_pool::{BufferPool, MappedBuffer, SharedBufferPool};
use crate::client::{Client, ClientId};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::receiver::Receiver;
use crate::send::{ClientContext, PacketHandler, PacketSink, SendBuffer};

/// One in-flight I/O operation. The boxed descriptor's address is the
/// completion's user data, so everything the completion handler needs —
/// including every buffer the kernel may still be reading — lives at a
/// stable address until the completion is consumed.
struct Request {
    kind: RequestKind,
}

#[derive(Default)]
enum RequestKind {
    #[default]
    Idle,
    Accept {
        addr: libc::sockaddr_in,
        addr_len: libc::socklen_t,
    },
    Recv {
        client: ClientId,
    },
    Send {
        client: ClientId,
        iovecs: [libc::iovec; 3],
        iovec_count: u32,
        /// Backing storage for the frame-length varint(s) referenced by the
        /// first iovec.
        length_scratch: [u8; VarInt::MAX_SIZE * 2],
        /// The pool buffer holding the packet body. The request owns it from
        /// submission to completion and returns it to the pool itself.
        buffer: Option<MappedBuffer>,
    },
}

// SAFETY: the raw iovec pointers inside refer to the boxed request itself or
// to pool mappings, none of which have thread affinity.
unsafe impl Send for Request {}

/// Spin-locked LIFO of idle request descriptors, refilled from the heap on
/// underflow.
struct RequestPool {
    free: SpinLock<Vec<Box<Request>>>,
}

impl RequestPool {
    fn new() -> Self {
        Self {
            free: SpinLock::new(Vec::new()),
        }
    }

    fn take(&self) -> Box<Request> {
        self.free.lock().pop().unwrap_or_else(|| {
            Box::new(Request {
                kind: RequestKind::Idle,
            })
        })
    }

    fn put(&self, mut request: Box<Request>) {
        request.kind = RequestKind::Idle;
        self.free.lock().push(request);
    }
}

/// The reactor. Owns the listener, the ring, the client table, and the
/// receive-side buffer pools; generic over the handler that consumes framed
/// packets.
pub struct Server<H> {
    config: ServerConfig,
    ring: IoUring,
    listener: TcpListener,
    local_addr: SocketAddr,
    clients: Slab<Client>,
    next_generation: u64,
    tcp_recv_pool: BufferPool,
    protocol_recv_pool: BufferPool,
    send_pool: SharedBufferPool,
    requests: RequestPool,
    handler: H,
    running: bool,
}

impl<H: PacketHandler> Server<H> {
    /// Opens the listening socket and sets up the ring.
    pub fn bind(config: ServerConfig, handler: H) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
        socket.bind(&SocketAddr::V4(addr).into())?;
        socket.listen(config.max_server_list_pending as i32)?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        let ring = IoUring::new(config.max_connections as u32 + 1)?;

        info!("listening on {local_addr}");

        Ok(Self {
            tcp_recv_pool: BufferPool::new(config.recv_buffer_size),
            protocol_recv_pool: BufferPool::new(config.max_recv_packet_size),
            send_pool: SharedBufferPool::new(config.max_send_packet_size),
            requests: RequestPool::new(),
            clients: Slab::with_capacity(config.max_connections.min(1024)),
            next_generation: 0,
            ring,
            listener,
            local_addr,
            handler,
            running: false,
            config,
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Drives the completion loop on the current thread until a fatal error.
    ///
    /// Client-scoped failures (protocol violations, per-client I/O errors)
    /// disconnect the one client and the loop keeps serving; anything else
    /// propagates.
    pub fn run(&mut self) -> Result<()> {
        self.running = true;
        self.submit_accept()?;

        while self.running {
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Os(e)),
            }

            loop {
                let cqe = match self.ring.completion().next() {
                    Some(cqe) => cqe,
                    None => break,
                };
                self.handle_completion(cqe)?;
            }
        }

        Ok(())
    }

    fn handle_completion(&mut self, cqe: cqueue::Entry) -> Result<()> {
        let raw = cqe.user_data() as *mut Request;
        if raw.is_null() {
            return Err(Error::Check("completion carried no request"));
        }

        // SAFETY: the user data was produced by Box::into_raw at submission
        // and each completion is consumed exactly once.
        let mut request = unsafe { Box::from_raw(raw) };
        let result = cqe.result();

        let outcome = match &mut request.kind {
            RequestKind::Idle => Err(Error::Check("completion for an idle request")),
            RequestKind::Accept { addr, .. } => {
                let addr = *addr;
                self.on_accept(result, addr)
            }
            RequestKind::Recv { client } => {
                let client = *client;
                self.on_recv(result, client)
            }
            RequestKind::Send { client, buffer, .. } => {
                let client = *client;
                let buffer = buffer.take();
                self.on_send(result, client, buffer)
            }
        };

        self.requests.put(request);
        outcome
    }

    fn on_accept(&mut self, result: i32, addr: libc::sockaddr_in) -> Result<()> {
        if result < 0 {
            return Err(Error::Os(io::Error::from_raw_os_error(-result)));
        }

        // SAFETY: a non-negative accept result is a fresh fd we now own.
        let socket = unsafe { OwnedFd::from_raw_fd(result) };

        // Re-arm before anything else so the listener never goes quiet.
        self.submit_accept()?;

        if addr.sin_family != libc::AF_INET as libc::sa_family_t {
            return Err(Error::Check("accepted a non-IPv4 connection"));
        }

        let peer = SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
            u16::from_be(addr.sin_port),
        );

        if self.clients.len() >= self.config.max_connections {
            warn!("connection limit reached, dropping {peer}");
            return Ok(());
        }

        trace!("new connection from {peer}");

        let recv_buffer = self.tcp_recv_pool.take()?;
        let generation = self.next_generation;
        self.next_generation += 1;

        let index = self.clients.insert(Client {
            socket,
            addr: peer,
            state: PacketState::Handshaking,
            receiver: Receiver::new(self.config.max_recv_packet_size),
            recv_buffer,
            generation,
        });

        self.submit_recv(ClientId { index, generation })
    }

    fn on_recv(&mut self, result: i32, id: ClientId) -> Result<()> {
        if self.resolve(id).is_none() {
            // The client disconnected while this recv was in flight.
            return Ok(());
        }

        if result <= 0 {
            if result < 0 {
                trace!("recv failed: {}", io::Error::from_raw_os_error(-result));
            }
            self.disconnect(id);
            return Ok(());
        }
        let count = result as usize;

        let Self {
            ring,
            clients,
            requests,
            send_pool,
            protocol_recv_pool,
            handler,
            ..
        } = self;

        let Some(client) = clients.get_mut(id.index) else {
            return Ok(());
        };
        let Client {
            socket,
            addr,
            state,
            receiver,
            recv_buffer,
            ..
        } = client;

        let fd = socket.as_raw_fd();
        let addr = *addr;
        let compression = receiver.compression;
        let data = &recv_buffer.as_slice()[..count];

        let res = receiver.consume(data, protocol_recv_pool, |body| {
            let mut sink = UringSink {
                ring: &mut *ring,
                requests: &*requests,
                send_pool: &*send_pool,
                fd,
                client: id,
            };
            let mut cx = ClientContext::new(&mut *state, addr, compression, &mut sink);
            handler.handle_packet(&mut cx, body)
        });

        match res {
            Ok(()) => self.submit_recv(id),
            Err(Error::Protocol(err)) => {
                warn!("protocol violation from {addr}: {err:#}");
                self.disconnect(id);
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn on_send(&mut self, result: i32, id: ClientId, buffer: Option<MappedBuffer>) -> Result<()> {
        // The request owned the body buffer; give it back no matter how the
        // write went.
        if let Some(buffer) = buffer {
            self.send_pool.put(buffer);
        }

        if result <= 0 {
            if result < 0 {
                trace!("send failed: {}", io::Error::from_raw_os_error(-result));
            }
            self.disconnect(id);
        }

        Ok(())
    }

    fn resolve(&self, id: ClientId) -> Option<&Client> {
        self.clients
            .get(id.index)
            .filter(|client| client.generation == id.generation)
    }

    /// Removes the client, returns its buffers, and shuts the socket down.
    /// Safe to call with a stale handle; later completions for this client
    /// resolve to nothing and are skipped.
    fn disconnect(&mut self, id: ClientId) {
        if self.resolve(id).is_none() {
            return;
        }

        let client = self.clients.remove(id.index);
        trace!("client disconnected: {}", client.addr);

        let Client {
            socket,
            mut receiver,
            recv_buffer,
            ..
        } = client;

        self.tcp_recv_pool.put(recv_buffer);
        receiver.release(&mut self.protocol_recv_pool);

        // SAFETY: the fd is owned and still open; it is closed right after
        // when the OwnedFd drops.
        unsafe {
            libc::shutdown(socket.as_raw_fd(), libc::SHUT_RDWR);
        }
    }

    fn submit_accept(&mut self) -> Result<()> {
        let mut request = self.requests.take();
        request.kind = RequestKind::Accept {
            addr: empty_sockaddr_in(),
            addr_len: mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        };
        let raw = Box::into_raw(request);

        // SAFETY: raw stays live until its completion is consumed, so the
        // sockaddr pointers remain valid for the kernel.
        let (addr_ptr, len_ptr) = match unsafe { &mut (*raw).kind } {
            RequestKind::Accept { addr, addr_len } => (
                ptr::addr_of_mut!(*addr).cast::<libc::sockaddr>(),
                ptr::addr_of_mut!(*addr_len),
            ),
            _ => return self.reclaim(raw, Error::Check("request kind mismatch")),
        };

        let entry = opcode::Accept::new(types::Fd(self.listener.as_raw_fd()), addr_ptr, len_ptr)
            .build()
            .user_data(raw as u64);

        self.push_entry(&entry, raw)
    }

    fn submit_recv(&mut self, id: ClientId) -> Result<()> {
        let Some(client) = self.resolve(id) else {
            return Err(Error::Check("recv submitted for an unknown client"));
        };
        let fd = client.socket.as_raw_fd();
        let buf_ptr = client.recv_buffer.as_ptr();
        let buf_len = client.recv_buffer.len() as u32;

        let mut request = self.requests.take();
        request.kind = RequestKind::Recv { client: id };
        let raw = Box::into_raw(request);

        let entry = opcode::Recv::new(types::Fd(fd), buf_ptr, buf_len)
            .build()
            .user_data(raw as u64);

        self.push_entry(&entry, raw)
    }

    fn push_entry(&mut self, entry: &squeue::Entry, raw: *mut Request) -> Result<()> {
        // SAFETY: every buffer the entry references lives in the boxed
        // request or in client state that outlives the operation.
        if unsafe { self.ring.submission().push(entry) }.is_err() {
            return self.reclaim(raw, Error::Check("submission queue is full"));
        }
        Ok(())
    }

    fn reclaim(&mut self, raw: *mut Request, err: Error) -> Result<()> {
        // SAFETY: raw came from Box::into_raw moments ago and was never
        // submitted.
        let mut request = unsafe { Box::from_raw(raw) };
        if let RequestKind::Send { buffer, .. } = &mut request.kind {
            if let Some(buffer) = buffer.take() {
                self.send_pool.put(buffer);
            }
        }
        self.requests.put(request);
        Err(err)
    }
}

/// The reactor-side [`PacketSink`]: composes into the shared send pool and
/// submits a vectored write of [length varint, body].
struct UringSink<'a> {
    ring: &'a mut IoUring,
    requests: &'a RequestPool,
    send_pool: &'a SharedBufferPool,
    fd: RawFd,
    client: ClientId,
}

impl PacketSink for UringSink<'_> {
    fn take_buffer(&mut self) -> Result<SendBuffer> {
        Ok(SendBuffer::new(self.send_pool.take()?))
    }

    fn submit(&mut self, buffer: SendBuffer) -> Result<()> {
        let (buffer, len) = buffer.into_parts();
        let body_ptr = buffer.as_ptr();

        let mut scratch = [0_u8; VarInt::MAX_SIZE * 2];
        if VarInt(len as i32).encode(&mut scratch[..]).is_err() {
            self.send_pool.put(buffer);
            return Err(Error::Check("failed to encode the frame length"));
        }
        let scratch_len = VarInt(len as i32).written_size();

        let mut request = self.requests.take();
        request.kind = RequestKind::Send {
            client: self.client,
            iovecs: [empty_iovec(); 3],
            iovec_count: 0,
            length_scratch: scratch,
            buffer: Some(buffer),
        };
        let raw = Box::into_raw(request);

        // SAFETY: raw stays live until its completion is consumed; the
        // iovecs point into the boxed request and the pool mapping it owns.
        let entry = match unsafe { &mut (*raw).kind } {
            RequestKind::Send {
                iovecs,
                iovec_count,
                length_scratch,
                ..
            } => {
                iovecs[0] = libc::iovec {
                    iov_base: length_scratch.as_mut_ptr().cast(),
                    iov_len: scratch_len,
                };
                iovecs[1] = libc::iovec {
                    iov_base: body_ptr.cast(),
                    iov_len: len,
                };
                *iovec_count = 2;

                opcode::Writev::new(types::Fd(self.fd), iovecs.as_ptr(), *iovec_count)
                    .build()
                    .user_data(raw as u64)
            }
            _ => {
                // SAFETY: raw was never submitted.
                let request = unsafe { Box::from_raw(raw) };
                self.requests.put(request);
                return Err(Error::Check("request kind mismatch"));
            }
        };

        // SAFETY: see above; the entry's buffers are owned by the request.
        if unsafe { self.ring.submission().push(&entry) }.is_err() {
            // SAFETY: raw was never submitted.
            let mut request = unsafe { Box::from_raw(raw) };
            if let RequestKind::Send { buffer, .. } = &mut request.kind {
                if let Some(buffer) = buffer.take() {
                    self.send_pool.put(buffer);
                }
            }
            self.requests.put(request);
            return Err(Error::Check("submission queue is full"));
        }

        Ok(())
    }
}

fn empty_sockaddr_in() -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: 0,
        sin_port: 0,
        sin_addr: libc::in_addr { s_addr: 0 },
        sin_zero: [0; 8],
    }
}

fn empty_iovec() -> libc::iovec {
    libc::iovec {
        iov_base: ptr::null_mut(),
        iov_len: 0,
    }
}
