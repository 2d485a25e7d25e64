//! Per-peer connection plumbing: a reader task that turns socket bytes into
//! inbound queue records, and a writer task that batches outbound records
//! into single socket writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use orderbook::SpscQueue;
use protocol::{
    encode_frame, split_frame, Id, MessageType, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE_BUFFER,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, warn};

pub const INBOUND_QUEUE_CAPACITY: usize = 4096;
pub const OUTBOUND_QUEUE_CAPACITY: usize = 4096;
/// One socket read per loop lands in a chunk this size.
const READ_CHUNK: usize = 64 * 1024;
/// Outbound frames are batched into writes of at most this many bytes.
const WRITE_BATCH: usize = 64 * 1024;

/// Fixed-size record crossing from an I/O task to the engine thread.
#[derive(Clone, Copy)]
pub struct InboundRecord {
    pub connection_id: Id,
    pub message_type: u8,
    pub payload_size: u16,
    pub payload: [u8; MAX_PAYLOAD_SIZE_BUFFER],
}

impl InboundRecord {
    fn new(connection_id: Id, message_type: MessageType, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE_BUFFER);
        let mut buf = [0u8; MAX_PAYLOAD_SIZE_BUFFER];
        buf[..payload.len()].copy_from_slice(payload);
        Self {
            connection_id,
            message_type: message_type.to_wire(),
            payload_size: payload.len() as u16,
            payload: buf,
        }
    }

    /// Engine-synthesised teardown marker; carries no payload.
    pub fn synthetic_disconnect(connection_id: Id) -> Self {
        Self {
            connection_id,
            message_type: MessageType::Disconnect.to_wire(),
            payload_size: 0,
            payload: [0u8; MAX_PAYLOAD_SIZE_BUFFER],
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_size as usize]
    }
}

/// Fixed-size record crossing from the engine thread to a writer task.
#[derive(Clone, Copy)]
pub struct OutboundRecord {
    pub message_type: u8,
    pub payload_size: u16,
    pub payload: [u8; MAX_PAYLOAD_SIZE_BUFFER],
}

struct Shared {
    id: Id,
    inbound: SpscQueue<InboundRecord>,
    outbound: SpscQueue<OutboundRecord>,
    /// Rare path for frames larger than the inline record capacity
    /// (currently only the book snapshot). Complete frames, heap-owned.
    oversize: Mutex<VecDeque<Box<[u8]>>>,
    write_wake: Notify,
    closed: AtomicBool,
}

impl Shared {
    /// First caller wins; enqueues the synthetic DISCONNECT so teardown is
    /// serialised with engine state.
    fn notify_disconnect_once(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(connection_id = self.id, reason, "connection closed");
        // Best-effort: a full queue means the engine is far behind anyway.
        let _ = self.inbound.push(InboundRecord::synthetic_disconnect(self.id));
        self.write_wake.notify_one();
    }
}

/// Engine-side handle to one connected peer. Dropping it aborts both I/O
/// tasks and releases the socket.
pub struct ClientHandle {
    shared: Arc<Shared>,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl ClientHandle {
    #[inline]
    pub fn id(&self) -> Id {
        self.shared.id
    }

    /// Engine-side consumer of the peer's inbound SPSC queue.
    #[inline]
    pub fn poll_inbound(&self) -> Option<InboundRecord> {
        self.shared.inbound.pop()
    }

    /// Queue one small frame for this peer. Returns false when the record
    /// was dropped because the outbound queue is full.
    pub fn send(&self, message_type: MessageType, payload: &[u8]) -> bool {
        if payload.len() > MAX_PAYLOAD_SIZE_BUFFER {
            debug_assert!(false, "buffered send used for oversize payload");
            return false;
        }
        let mut buf = [0u8; MAX_PAYLOAD_SIZE_BUFFER];
        buf[..payload.len()].copy_from_slice(payload);
        let record = OutboundRecord {
            message_type: message_type.to_wire(),
            payload_size: payload.len() as u16,
            payload: buf,
        };
        if self.shared.outbound.push(record).is_err() {
            debug!(
                connection_id = self.shared.id,
                message_type = message_type.to_wire(),
                "outbound queue full, frame dropped"
            );
            return false;
        }
        self.shared.write_wake.notify_one();
        true
    }

    /// Rare path for oversize frames: the complete frame is heap-allocated
    /// and handed to the writer, which sends it ahead of the next batch.
    pub fn send_unbuffered(&self, message_type: MessageType, payload: &[u8]) {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        encode_frame(&mut frame, message_type, payload);
        match self.shared.oversize.lock() {
            Ok(mut q) => q.push_back(frame.into_boxed_slice()),
            Err(_) => return,
        }
        self.shared.write_wake.notify_one();
    }

    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wire a freshly accepted socket: spawns the reader and writer tasks and
/// returns the engine-side handle.
pub fn spawn_connection(stream: TcpStream, id: Id) -> ClientHandle {
    let shared = Arc::new(Shared {
        id,
        inbound: SpscQueue::with_capacity(INBOUND_QUEUE_CAPACITY),
        outbound: SpscQueue::with_capacity(OUTBOUND_QUEUE_CAPACITY),
        oversize: Mutex::new(VecDeque::new()),
        write_wake: Notify::new(),
        closed: AtomicBool::new(false),
    });
    let (read_half, write_half) = stream.into_split();
    let reader = tokio::spawn(reader_task(read_half, Arc::clone(&shared)));
    let writer = tokio::spawn(writer_task(write_half, Arc::clone(&shared)));
    ClientHandle { shared, reader, writer }
}

async fn reader_task(mut socket: OwnedReadHalf, shared: Arc<Shared>) {
    let mut chunk = vec![0u8; READ_CHUNK];
    // Growable accumulator; `Vec` doubles on demand exactly like the framer
    // contract asks for.
    let mut accum: Vec<u8> = Vec::with_capacity(2 * READ_CHUNK);

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) => {
                shared.notify_disconnect_once("peer closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                shared.notify_disconnect_once(&format!("read error: {e}"));
                return;
            }
        };
        accum.extend_from_slice(&chunk[..n]);

        let mut offset = 0;
        loop {
            match split_frame(&accum[offset..]) {
                Ok(None) => break,
                Ok(Some((message_type, payload, consumed))) => {
                    if payload.len() <= MAX_PAYLOAD_SIZE_BUFFER {
                        let record = InboundRecord::new(shared.id, message_type, payload);
                        if shared.inbound.push(record).is_err() {
                            // Back-pressure policy: on sustained engine
                            // overload, drop the peer.
                            warn!(
                                connection_id = shared.id,
                                "inbound queue full, disconnecting peer"
                            );
                            shared.notify_disconnect_once("inbound backpressure");
                            return;
                        }
                    } else {
                        // No client->server frame is this large; length was
                        // already validated, so just skip it.
                        debug!(
                            connection_id = shared.id,
                            message_type = message_type.to_wire(),
                            "oversize inbound frame ignored"
                        );
                    }
                    offset += consumed;
                }
                Err(e) => {
                    warn!(connection_id = shared.id, error = %e, "protocol violation");
                    shared.notify_disconnect_once("protocol violation");
                    return;
                }
            }
        }
        if offset > 0 {
            accum.drain(..offset);
        }
        if shared.closed.load(Ordering::Acquire) {
            return;
        }
    }
}

async fn writer_task(mut socket: OwnedWriteHalf, shared: Arc<Shared>) {
    let mut staging: Vec<u8> = Vec::with_capacity(WRITE_BATCH);

    loop {
        // Oversize frames jump the batch: they are rare and already framed.
        loop {
            let frame = match shared.oversize.lock() {
                Ok(mut q) => q.pop_front(),
                Err(_) => None,
            };
            let Some(frame) = frame else { break };
            if let Err(e) = socket.write_all(&frame).await {
                shared.notify_disconnect_once(&format!("write error: {e}"));
                return;
            }
        }

        // Batch as many whole frames as fit, then issue one write. If the
        // queue grew during the write, drain again without waiting.
        staging.clear();
        while let Some(record) = shared.outbound.pop() {
            let frame_size = FRAME_HEADER_SIZE + record.payload_size as usize;
            if staging.len() + frame_size > WRITE_BATCH {
                if let Err(e) = socket.write_all(&staging).await {
                    shared.notify_disconnect_once(&format!("write error: {e}"));
                    return;
                }
                staging.clear();
            }
            staging.push(record.message_type);
            staging.extend_from_slice(&record.payload_size.to_be_bytes());
            staging.extend_from_slice(&record.payload[..record.payload_size as usize]);
        }
        if !staging.is_empty() {
            if let Err(e) = socket.write_all(&staging).await {
                shared.notify_disconnect_once(&format!("write error: {e}"));
                return;
            }
            // Re-check the queues before sleeping.
            continue;
        }

        if shared.closed.load(Ordering::Acquire) {
            return;
        }
        shared.write_wake.notified().await;
    }
}
