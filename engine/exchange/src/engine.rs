//! The engine thread: drains every peer's inbound queue, dispatches onto the
//! matching engine, and translates book callbacks into wire frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use orderbook::{Order, OrderBook, OrderBookCallbacks};
use protocol::{
    ErrorCode, Id, Lifespan, MessageType, PayloadAmendOrder, PayloadCancelOrder,
    PayloadConfirmOrderAmended, PayloadConfirmOrderCancelled, PayloadConfirmOrderInserted,
    PayloadError, PayloadInsertOrder, PayloadOrderAmendedEvent, PayloadOrderBookSnapshot,
    PayloadOrderCancelledEvent, PayloadOrderInsertedEvent, PayloadPartialFill,
    PayloadPriceLevelUpdate, PayloadTradeEvent, Price, Side, Timestamp, Volume, MAX_CONNECTIONS,
};
use tracing::{debug, info, warn};
use zerocopy::{AsBytes, FromBytes};

use crate::connection::{ClientHandle, InboundRecord};
use crate::event_log::BinaryEventLogger;

/// Engine-confined routing state: live client handles, the market-data
/// subscriber list, and the global monotonic counters.
pub(crate) struct Publisher {
    clients: Vec<Option<ClientHandle>>,
    subscribers: Vec<Id>,
    next_trade_id: Id,
    sequence_number: Id,
    event_log: Option<BinaryEventLogger>,
}

impl Publisher {
    fn new(event_log: Option<BinaryEventLogger>) -> Self {
        Self {
            clients: (0..MAX_CONNECTIONS).map(|_| None).collect(),
            subscribers: Vec::new(),
            next_trade_id: 0,
            sequence_number: 0,
            event_log,
        }
    }

    fn admit(&mut self, handle: ClientHandle) {
        let id = handle.id() as usize;
        if id >= MAX_CONNECTIONS {
            warn!(connection_id = id, "connection id out of range, dropping");
            return;
        }
        if self.clients[id].is_some() {
            warn!(connection_id = id, "connection id reused while slot occupied");
        }
        self.clients[id] = Some(handle);
    }

    fn poll_client(&mut self, idx: usize) -> Option<InboundRecord> {
        self.clients[idx].as_ref()?.poll_inbound()
    }

    fn remove_client(&mut self, connection_id: Id) {
        self.unsubscribe(connection_id);
        if let Some(handle) = self
            .clients
            .get_mut(connection_id as usize)
            .and_then(Option::take)
        {
            handle.close();
            info!(connection_id, "client disconnected");
        }
    }

    fn subscribe(&mut self, connection_id: Id) {
        if !self.subscribers.contains(&connection_id) {
            self.subscribers.push(connection_id);
        }
    }

    fn unsubscribe(&mut self, connection_id: Id) {
        self.subscribers.retain(|&id| id != connection_id);
    }

    #[inline]
    fn next_sequence(&mut self) -> Id {
        let seq = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        seq
    }

    fn send_to(&self, connection_id: Id, message_type: MessageType, payload: &[u8]) {
        if let Some(Some(handle)) = self.clients.get(connection_id as usize) {
            if !handle.send(message_type, payload) {
                debug!(connection_id, "private frame dropped on full outbound queue");
            }
        }
    }

    fn broadcast(&self, message_type: MessageType, payload: &[u8]) {
        for &connection_id in &self.subscribers {
            self.send_to(connection_id, message_type, payload);
        }
        if let Some(log) = &self.event_log {
            log.log(message_type, payload);
        }
    }

    /// Snapshot goes out synchronously on subscribe, stamped with the
    /// current sequence number (no increment), via the unbuffered path.
    fn send_snapshot(&self, connection_id: Id, snapshot: &orderbook::BookSnapshot) {
        let payload = PayloadOrderBookSnapshot {
            ask_prices: snapshot.ask_prices,
            ask_volumes: snapshot.ask_volumes,
            bid_prices: snapshot.bid_prices,
            bid_volumes: snapshot.bid_volumes,
            sequence_number: self.sequence_number,
        };
        if let Some(Some(handle)) = self.clients.get(connection_id as usize) {
            handle.send_unbuffered(MessageType::OrderBookSnapshot, payload.as_bytes());
        }
    }
}

impl OrderBookCallbacks for Publisher {
    fn on_trade(
        &mut self,
        maker: &Order,
        taker_client_id: Id,
        taker_order_id: Id,
        price: Price,
        taker_total_quantity: Volume,
        taker_cumulative_quantity: Volume,
        traded_quantity: Volume,
        timestamp: Timestamp,
    ) {
        let trade_id = self.next_trade_id;
        self.next_trade_id = self.next_trade_id.wrapping_add(1);
        let sequence_number = self.next_sequence();

        let maker_fill = PayloadPartialFill {
            exchange_order_id: maker.order_id,
            trade_id,
            last_price: price,
            last_quantity: traded_quantity,
            leaves_quantity: maker.quantity_remaining,
            cumulative_quantity: maker.quantity_cumulative,
            timestamp,
        };
        self.send_to(maker.client_id, MessageType::PartialFillOrder, maker_fill.as_bytes());

        let taker_fill = PayloadPartialFill {
            exchange_order_id: taker_order_id,
            trade_id,
            last_price: price,
            last_quantity: traded_quantity,
            leaves_quantity: taker_total_quantity - taker_cumulative_quantity,
            cumulative_quantity: taker_cumulative_quantity,
            timestamp,
        };
        self.send_to(taker_client_id, MessageType::PartialFillOrder, taker_fill.as_bytes());

        let trade = PayloadTradeEvent {
            sequence_number,
            trade_id,
            price,
            quantity: traded_quantity,
            taker_side: maker.side.opposite().to_wire(),
            timestamp,
        };
        self.broadcast(MessageType::TradeEvent, trade.as_bytes());
    }

    fn on_order_inserted(&mut self, client_request_id: Id, order: &Order, timestamp: Timestamp) {
        let sequence_number = self.next_sequence();

        let confirm = PayloadConfirmOrderInserted {
            client_request_id,
            exchange_order_id: order.order_id,
            side: order.side.to_wire(),
            price: order.price,
            total_quantity: order.quantity_total,
            leaves_quantity: order.quantity_remaining,
            timestamp,
        };
        self.send_to(order.client_id, MessageType::ConfirmOrderInserted, confirm.as_bytes());

        let event = PayloadOrderInsertedEvent {
            sequence_number,
            order_id: order.order_id,
            side: order.side.to_wire(),
            price: order.price,
            quantity: order.quantity_remaining,
            timestamp,
        };
        self.broadcast(MessageType::OrderInsertedEvent, event.as_bytes());
    }

    fn on_order_cancelled(&mut self, client_request_id: Id, order: &Order, timestamp: Timestamp) {
        let sequence_number = self.next_sequence();

        let confirm = PayloadConfirmOrderCancelled {
            client_request_id,
            exchange_order_id: order.order_id,
            leaves_quantity: order.quantity_remaining,
            price: order.price,
            side: order.side.to_wire(),
            timestamp,
        };
        self.send_to(order.client_id, MessageType::ConfirmOrderCancelled, confirm.as_bytes());

        let event = PayloadOrderCancelledEvent {
            sequence_number,
            order_id: order.order_id,
            remaining_quantity: order.quantity_remaining,
            timestamp,
        };
        self.broadcast(MessageType::OrderCancelledEvent, event.as_bytes());
    }

    fn on_order_amended(
        &mut self,
        client_request_id: Id,
        quantity_old: Volume,
        order: &Order,
        timestamp: Timestamp,
    ) {
        let sequence_number = self.next_sequence();

        let confirm = PayloadConfirmOrderAmended {
            client_request_id,
            exchange_order_id: order.order_id,
            old_total_quantity: quantity_old,
            new_total_quantity: order.quantity_total,
            leaves_quantity: order.quantity_remaining,
            timestamp,
        };
        self.send_to(order.client_id, MessageType::ConfirmOrderAmended, confirm.as_bytes());

        let event = PayloadOrderAmendedEvent {
            sequence_number,
            order_id: order.order_id,
            quantity_new: order.quantity_total,
            quantity_old,
            timestamp,
        };
        self.broadcast(MessageType::OrderAmendedEvent, event.as_bytes());
    }

    fn on_level_update(&mut self, side: Side, price: Price, total_quantity: Volume, timestamp: Timestamp) {
        let sequence_number = self.next_sequence();
        let update = PayloadPriceLevelUpdate {
            sequence_number,
            side: side.to_wire(),
            price,
            total_volume: total_quantity,
            timestamp,
        };
        self.broadcast(MessageType::PriceLevelUpdate, update.as_bytes());
    }

    fn on_error(
        &mut self,
        client_id: Id,
        client_request_id: Id,
        code: ErrorCode,
        message: &str,
        timestamp: Timestamp,
    ) {
        let payload = PayloadError::new(client_request_id, code.to_wire(), message, timestamp);
        self.send_to(client_id, MessageType::ErrorMsg, payload.as_bytes());
    }
}

pub(crate) struct EngineCore {
    book: OrderBook,
    publisher: Publisher,
    registrations: Receiver<ClientHandle>,
    running: Arc<AtomicBool>,
}

impl EngineCore {
    pub(crate) fn new(
        registrations: Receiver<ClientHandle>,
        running: Arc<AtomicBool>,
        event_log: Option<BinaryEventLogger>,
    ) -> Self {
        Self {
            book: OrderBook::new(),
            publisher: Publisher::new(event_log),
            registrations,
            running,
        }
    }

    /// Spin over registrations and every live peer's inbound queue; back off
    /// ~50us when a full pass finds nothing.
    pub(crate) fn run(mut self) {
        info!("engine thread started");
        while self.running.load(Ordering::Acquire) {
            let mut did_work = false;

            while let Ok(handle) = self.registrations.try_recv() {
                self.publisher.admit(handle);
                did_work = true;
            }

            for idx in 0..MAX_CONNECTIONS {
                while let Some(record) = self.publisher.poll_client(idx) {
                    did_work = true;
                    self.dispatch(record);
                }
            }

            if !did_work {
                std::thread::sleep(Duration::from_micros(50));
            }
        }
        info!("engine thread stopped");
    }

    fn dispatch(&mut self, record: InboundRecord) {
        let Some(message_type) = MessageType::from_wire(record.message_type) else {
            return;
        };
        match message_type {
            MessageType::InsertOrder => {
                let Some(p) = PayloadInsertOrder::read_from(record.payload()) else {
                    return;
                };
                let (Some(side), Some(lifespan)) =
                    (Side::from_wire(p.side), Lifespan::from_wire(p.lifespan))
                else {
                    warn!(
                        connection_id = record.connection_id,
                        "insert with invalid side/lifespan byte ignored"
                    );
                    return;
                };
                self.book.submit_order(
                    &mut self.publisher,
                    p.price,
                    p.quantity,
                    side,
                    lifespan,
                    record.connection_id,
                    p.client_request_id,
                );
            }
            MessageType::CancelOrder => {
                let Some(p) = PayloadCancelOrder::read_from(record.payload()) else {
                    return;
                };
                self.book.cancel_order(
                    &mut self.publisher,
                    record.connection_id,
                    p.client_request_id,
                    p.exchange_order_id,
                );
            }
            MessageType::AmendOrder => {
                let Some(p) = PayloadAmendOrder::read_from(record.payload()) else {
                    return;
                };
                self.book.amend_order(
                    &mut self.publisher,
                    record.connection_id,
                    p.client_request_id,
                    p.exchange_order_id,
                    p.new_total_quantity,
                );
            }
            MessageType::Subscribe => {
                self.publisher.subscribe(record.connection_id);
                let snapshot = self.book.build_snapshot();
                self.publisher.send_snapshot(record.connection_id, &snapshot);
            }
            MessageType::Unsubscribe => {
                self.publisher.unsubscribe(record.connection_id);
            }
            MessageType::Disconnect => {
                self.publisher.remove_client(record.connection_id);
            }
            // Server->client types never arrive here; the framer validated
            // their sizes, the engine just ignores them.
            _ => {}
        }
    }
}
