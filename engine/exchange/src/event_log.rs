//! Binary event log: one file per public message type, payload bytes only.
//!
//! Producers (the engine thread) push into per-type SPSC queues and never
//! block; a single writer thread drains all queues through 64 KiB staging
//! buffers with periodic partial flushes. Overflow drops the record.

use std::fs::{self, File};
use std::io::{self, Write};
use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orderbook::SpscQueue;
use protocol::{
    MessageType, PayloadOrderAmendedEvent, PayloadOrderCancelledEvent, PayloadOrderInsertedEvent,
    PayloadPriceLevelUpdate, PayloadTradeEvent,
};
use tracing::{info, warn};

const LOGGED_TYPES: [MessageType; 5] = [
    MessageType::PriceLevelUpdate,
    MessageType::TradeEvent,
    MessageType::OrderInsertedEvent,
    MessageType::OrderCancelledEvent,
    MessageType::OrderAmendedEvent,
];

const fn max_size(sizes: &[usize]) -> usize {
    let mut m = 0;
    let mut i = 0;
    while i < sizes.len() {
        if sizes[i] > m {
            m = sizes[i];
        }
        i += 1;
    }
    m
}

const MAX_LOGGED_SIZE: usize = max_size(&[
    size_of::<PayloadPriceLevelUpdate>(),
    size_of::<PayloadTradeEvent>(),
    size_of::<PayloadOrderInsertedEvent>(),
    size_of::<PayloadOrderCancelledEvent>(),
    size_of::<PayloadOrderAmendedEvent>(),
]);

const QUEUE_CAPACITY: usize = 1 << 14;
const STAGING_BYTES: usize = 64 * 1024;
/// Partial flush threshold when the writer goes idle.
const IDLE_FLUSH_BYTES: usize = 4096;
const DRAIN_BATCH: usize = 256;

#[derive(Clone, Copy)]
struct LogRecord {
    len: u16,
    bytes: [u8; MAX_LOGGED_SIZE],
}

struct SinkSet {
    queues: [SpscQueue<LogRecord>; 5],
}

pub struct BinaryEventLogger {
    sinks: Arc<SinkSet>,
    running: Arc<AtomicBool>,
    writer: Option<std::thread::JoinHandle<()>>,
}

impl BinaryEventLogger {
    fn queue_index(message_type: MessageType) -> Option<usize> {
        LOGGED_TYPES.iter().position(|&t| t == message_type)
    }

    /// Opens `<dir>/<Y%m%d_%H%M%S>_<type_name>.bin` for each logged type and
    /// starts the writer thread.
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut files = Vec::with_capacity(LOGGED_TYPES.len());
        for message_type in LOGGED_TYPES {
            let path = dir.join(format!("{stamp}_{}.bin", message_type.log_name()));
            files.push(File::create(&path)?);
        }
        info!(dir = %dir.display(), stamp, "binary event log opened");

        let sinks = Arc::new(SinkSet {
            queues: std::array::from_fn(|_| SpscQueue::with_capacity(QUEUE_CAPACITY)),
        });
        let running = Arc::new(AtomicBool::new(true));

        let writer = {
            let sinks = Arc::clone(&sinks);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("event-log".into())
                .spawn(move || writer_loop(sinks, files, running))?
        };

        Ok(Self { sinks, running, writer: Some(writer) })
    }

    /// Producer entry point. Copies the payload bytes; drops on overflow.
    pub fn log(&self, message_type: MessageType, payload: &[u8]) {
        let Some(idx) = Self::queue_index(message_type) else {
            return;
        };
        if payload.len() > MAX_LOGGED_SIZE {
            return;
        }
        let mut bytes = [0u8; MAX_LOGGED_SIZE];
        bytes[..payload.len()].copy_from_slice(payload);
        let record = LogRecord { len: payload.len() as u16, bytes };
        let _ = self.sinks.queues[idx].push(record);
    }

    pub fn backlog_approx(&self) -> usize {
        self.sinks.queues.iter().map(SpscQueue::len).sum()
    }
}

impl Drop for BinaryEventLogger {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn writer_loop(sinks: Arc<SinkSet>, mut files: Vec<File>, running: Arc<AtomicBool>) {
    let mut staging: Vec<Vec<u8>> =
        (0..LOGGED_TYPES.len()).map(|_| Vec::with_capacity(STAGING_BYTES)).collect();

    loop {
        let alive = running.load(Ordering::Acquire);
        let mut did_work = false;

        for (idx, queue) in sinks.queues.iter().enumerate() {
            for _ in 0..DRAIN_BATCH {
                let Some(record) = queue.pop() else { break };
                did_work = true;
                let buf = &mut staging[idx];
                if buf.len() + record.len as usize > STAGING_BYTES {
                    flush(&mut files[idx], buf);
                }
                buf.extend_from_slice(&record.bytes[..record.len as usize]);
            }
        }

        if !did_work {
            // Idle: opportunistically flush partial buffers so latency stays
            // bounded without busy writing.
            for (idx, buf) in staging.iter_mut().enumerate() {
                if buf.len() >= IDLE_FLUSH_BYTES || (!alive && !buf.is_empty()) {
                    flush(&mut files[idx], buf);
                }
            }
            if !alive {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    for (idx, buf) in staging.iter_mut().enumerate() {
        flush(&mut files[idx], buf);
        let _ = files[idx].sync_all();
    }
}

fn flush(file: &mut File, buf: &mut Vec<u8>) {
    if buf.is_empty() {
        return;
    }
    if let Err(e) = file.write_all(buf) {
        warn!(error = %e, "event log write failed, bytes dropped");
    }
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Side;
    use zerocopy::AsBytes;

    #[test]
    fn writes_payload_bytes_per_type_file() {
        let dir = std::env::temp_dir().join(format!("evlog_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let update = PayloadPriceLevelUpdate {
            sequence_number: 1,
            side: Side::Buy.to_wire(),
            price: 100,
            total_volume: 5,
            timestamp: 42,
        };
        {
            let logger = BinaryEventLogger::create(&dir).unwrap();
            for _ in 0..3 {
                logger.log(MessageType::PriceLevelUpdate, update.as_bytes());
            }
            // Unlogged types are ignored.
            logger.log(MessageType::Subscribe, &[0u8; 4]);
            // Dropped writer drains and flushes.
        }

        let entry = fs::read_dir(&dir)
            .unwrap()
            .filter_map(Result::ok)
            .find(|e| e.file_name().to_string_lossy().ends_with("_price_level_update.bin"))
            .expect("price level update log file");
        let contents = fs::read(entry.path()).unwrap();
        assert_eq!(contents.len(), 3 * size_of::<PayloadPriceLevelUpdate>());
        assert_eq!(&contents[..update.as_bytes().len()], update.as_bytes());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn queue_overflow_drops_not_blocks() {
        let dir = std::env::temp_dir().join(format!("evlog_overflow_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let logger = BinaryEventLogger::create(&dir).unwrap();

        let trade = PayloadTradeEvent {
            sequence_number: 0,
            trade_id: 0,
            price: 1,
            quantity: 1,
            taker_side: 0,
            timestamp: 0,
        };
        // Far more than the queue holds; must return promptly regardless.
        for _ in 0..(QUEUE_CAPACITY * 4) {
            logger.log(MessageType::TradeEvent, trade.as_bytes());
        }
        drop(logger);
        let _ = fs::remove_dir_all(&dir);
    }
}
