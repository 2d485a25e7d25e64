//! Fixed-layout payload records.
//!
//! Layouts are `repr(C, packed)` with little-endian integer fields, so a
//! record can be reinterpreted to/from wire bytes without a serializer.
//! `Side` and `Lifespan` travel as single raw bytes and are validated at the
//! point of use, never at the framing layer.

use core::mem::size_of;

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::types::{Id, Price, Timestamp, Volume, ERROR_TEXT_LEN, ORDER_BOOK_MESSAGE_DEPTH};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    Disconnect = 2,
    InsertOrder = 3,
    CancelOrder = 4,
    AmendOrder = 5,
    Subscribe = 6,
    Unsubscribe = 7,

    ConfirmOrderInserted = 12,
    ConfirmOrderCancelled = 13,
    ConfirmOrderAmended = 14,
    PartialFillOrder = 15,
    ErrorMsg = 17,

    OrderBookSnapshot = 21,
    TradeEvent = 23,
    OrderInsertedEvent = 24,
    OrderCancelledEvent = 25,
    OrderAmendedEvent = 26,
    PriceLevelUpdate = 27,
}

impl MessageType {
    pub fn from_wire(b: u8) -> Option<MessageType> {
        Some(match b {
            2 => MessageType::Disconnect,
            3 => MessageType::InsertOrder,
            4 => MessageType::CancelOrder,
            5 => MessageType::AmendOrder,
            6 => MessageType::Subscribe,
            7 => MessageType::Unsubscribe,
            12 => MessageType::ConfirmOrderInserted,
            13 => MessageType::ConfirmOrderCancelled,
            14 => MessageType::ConfirmOrderAmended,
            15 => MessageType::PartialFillOrder,
            17 => MessageType::ErrorMsg,
            21 => MessageType::OrderBookSnapshot,
            23 => MessageType::TradeEvent,
            24 => MessageType::OrderInsertedEvent,
            25 => MessageType::OrderCancelledEvent,
            26 => MessageType::OrderAmendedEvent,
            27 => MessageType::PriceLevelUpdate,
            _ => return None,
        })
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// File-name stem used by the binary event log.
    pub fn log_name(self) -> &'static str {
        match self {
            MessageType::PriceLevelUpdate => "price_level_update",
            MessageType::TradeEvent => "trade",
            MessageType::OrderInsertedEvent => "insert_order",
            MessageType::OrderCancelledEvent => "cancel_order",
            MessageType::OrderAmendedEvent => "amend_order",
            _ => "other",
        }
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadDisconnect {
    pub client_request_id: Id,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadInsertOrder {
    pub client_request_id: Id,
    pub side: u8,
    pub price: Price,
    pub quantity: Volume,
    pub lifespan: u8,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadCancelOrder {
    pub client_request_id: Id,
    pub exchange_order_id: Id,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadAmendOrder {
    pub client_request_id: Id,
    pub exchange_order_id: Id,
    pub new_total_quantity: Volume,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadSubscribe {
    pub client_request_id: Id,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadUnsubscribe {
    pub client_request_id: Id,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadError {
    pub client_request_id: Id,
    pub code: u16,
    pub message: [u8; ERROR_TEXT_LEN],
    pub timestamp: Timestamp,
}

impl PayloadError {
    pub fn new(client_request_id: Id, code: u16, message: &str, timestamp: Timestamp) -> Self {
        let mut buf = [0u8; ERROR_TEXT_LEN];
        let n = message.len().min(ERROR_TEXT_LEN - 1);
        buf[..n].copy_from_slice(&message.as_bytes()[..n]);
        Self { client_request_id, code, message: buf, timestamp }
    }

    /// The message text up to the first NUL.
    pub fn message_str(&self) -> &str {
        let end = self.message.iter().position(|&b| b == 0).unwrap_or(ERROR_TEXT_LEN);
        core::str::from_utf8(&self.message[..end]).unwrap_or("")
    }
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadConfirmOrderInserted {
    pub client_request_id: Id,
    pub exchange_order_id: Id,
    pub side: u8,
    pub price: Price,
    pub total_quantity: Volume,
    pub leaves_quantity: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadConfirmOrderCancelled {
    pub client_request_id: Id,
    pub exchange_order_id: Id,
    pub leaves_quantity: Volume,
    pub price: Price,
    pub side: u8,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadConfirmOrderAmended {
    pub client_request_id: Id,
    pub exchange_order_id: Id,
    pub old_total_quantity: Volume,
    pub new_total_quantity: Volume,
    pub leaves_quantity: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadPartialFill {
    pub exchange_order_id: Id,
    pub trade_id: Id,
    pub last_price: Price,
    pub last_quantity: Volume,
    pub leaves_quantity: Volume,
    pub cumulative_quantity: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadOrderBookSnapshot {
    pub ask_prices: [Price; ORDER_BOOK_MESSAGE_DEPTH],
    pub ask_volumes: [Volume; ORDER_BOOK_MESSAGE_DEPTH],
    pub bid_prices: [Price; ORDER_BOOK_MESSAGE_DEPTH],
    pub bid_volumes: [Volume; ORDER_BOOK_MESSAGE_DEPTH],
    pub sequence_number: Id,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadTradeEvent {
    pub sequence_number: Id,
    pub trade_id: Id,
    pub price: Price,
    pub quantity: Volume,
    pub taker_side: u8,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadOrderInsertedEvent {
    pub sequence_number: Id,
    pub order_id: Id,
    pub side: u8,
    pub price: Price,
    pub quantity: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadOrderCancelledEvent {
    pub sequence_number: Id,
    pub order_id: Id,
    pub remaining_quantity: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadOrderAmendedEvent {
    pub sequence_number: Id,
    pub order_id: Id,
    pub quantity_new: Volume,
    pub quantity_old: Volume,
    pub timestamp: Timestamp,
}

#[repr(C, packed)]
#[derive(Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct PayloadPriceLevelUpdate {
    pub sequence_number: Id,
    pub side: u8,
    pub price: Price,
    pub total_volume: Volume,
    pub timestamp: Timestamp,
}

/// Payload length for a wire type. Pure function of the type byte; `None`
/// for types that never appear on the wire.
pub fn payload_size_for_type(t: MessageType) -> usize {
    match t {
        MessageType::Disconnect => size_of::<PayloadDisconnect>(),
        MessageType::InsertOrder => size_of::<PayloadInsertOrder>(),
        MessageType::CancelOrder => size_of::<PayloadCancelOrder>(),
        MessageType::AmendOrder => size_of::<PayloadAmendOrder>(),
        MessageType::Subscribe => size_of::<PayloadSubscribe>(),
        MessageType::Unsubscribe => size_of::<PayloadUnsubscribe>(),
        MessageType::ConfirmOrderInserted => size_of::<PayloadConfirmOrderInserted>(),
        MessageType::ConfirmOrderCancelled => size_of::<PayloadConfirmOrderCancelled>(),
        MessageType::ConfirmOrderAmended => size_of::<PayloadConfirmOrderAmended>(),
        MessageType::PartialFillOrder => size_of::<PayloadPartialFill>(),
        MessageType::ErrorMsg => size_of::<PayloadError>(),
        MessageType::OrderBookSnapshot => size_of::<PayloadOrderBookSnapshot>(),
        MessageType::TradeEvent => size_of::<PayloadTradeEvent>(),
        MessageType::OrderInsertedEvent => size_of::<PayloadOrderInsertedEvent>(),
        MessageType::OrderCancelledEvent => size_of::<PayloadOrderCancelledEvent>(),
        MessageType::OrderAmendedEvent => size_of::<PayloadOrderAmendedEvent>(),
        MessageType::PriceLevelUpdate => size_of::<PayloadPriceLevelUpdate>(),
    }
}

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

/// Largest payload of any wire type.
pub const MAX_PAYLOAD_SIZE: usize = max_size(&[
    size_of::<PayloadDisconnect>(),
    size_of::<PayloadInsertOrder>(),
    size_of::<PayloadCancelOrder>(),
    size_of::<PayloadAmendOrder>(),
    size_of::<PayloadSubscribe>(),
    size_of::<PayloadUnsubscribe>(),
    size_of::<PayloadError>(),
    size_of::<PayloadConfirmOrderInserted>(),
    size_of::<PayloadConfirmOrderCancelled>(),
    size_of::<PayloadConfirmOrderAmended>(),
    size_of::<PayloadPartialFill>(),
    size_of::<PayloadOrderBookSnapshot>(),
    size_of::<PayloadTradeEvent>(),
    size_of::<PayloadOrderInsertedEvent>(),
    size_of::<PayloadOrderCancelledEvent>(),
    size_of::<PayloadOrderAmendedEvent>(),
    size_of::<PayloadPriceLevelUpdate>(),
]);

/// Largest payload that fits the inline queue records. The snapshot is
/// excluded: it takes the unbuffered heap path and never enters a queue.
pub const MAX_PAYLOAD_SIZE_BUFFER: usize = max_size(&[
    size_of::<PayloadDisconnect>(),
    size_of::<PayloadInsertOrder>(),
    size_of::<PayloadCancelOrder>(),
    size_of::<PayloadAmendOrder>(),
    size_of::<PayloadSubscribe>(),
    size_of::<PayloadUnsubscribe>(),
    size_of::<PayloadError>(),
    size_of::<PayloadConfirmOrderInserted>(),
    size_of::<PayloadConfirmOrderCancelled>(),
    size_of::<PayloadConfirmOrderAmended>(),
    size_of::<PayloadPartialFill>(),
    size_of::<PayloadTradeEvent>(),
    size_of::<PayloadOrderInsertedEvent>(),
    size_of::<PayloadOrderCancelledEvent>(),
    size_of::<PayloadOrderAmendedEvent>(),
    size_of::<PayloadPriceLevelUpdate>(),
]);

const _: () = assert!(MAX_PAYLOAD_SIZE_BUFFER <= 64, "queue record payload capacity exceeded");
const _: () = assert!(MAX_PAYLOAD_SIZE <= u16::MAX as usize);
