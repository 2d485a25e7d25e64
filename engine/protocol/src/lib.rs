//! Wire protocol for the single-instrument exchange.
//!
//! Every TCP frame is `type:u8 | size:u16 (big-endian) | payload`, where the
//! payload is a packed little-endian record whose size is a pure function of
//! the type. The same codec runs on both ends of the socket.

mod frame;
mod messages;
mod types;

pub use frame::{
    encode_frame, split_frame, FrameError, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use messages::{
    payload_size_for_type, MessageType, PayloadAmendOrder, PayloadCancelOrder,
    PayloadConfirmOrderAmended, PayloadConfirmOrderCancelled, PayloadConfirmOrderInserted,
    PayloadDisconnect, PayloadError, PayloadInsertOrder, PayloadOrderAmendedEvent,
    PayloadOrderBookSnapshot, PayloadOrderCancelledEvent, PayloadOrderInsertedEvent,
    PayloadPartialFill, PayloadPriceLevelUpdate, PayloadSubscribe, PayloadTradeEvent,
    PayloadUnsubscribe, MAX_PAYLOAD_SIZE, MAX_PAYLOAD_SIZE_BUFFER,
};
pub use types::{
    ErrorCode, Id, Lifespan, Price, Side, Timestamp, Volume, ERROR_TEXT_LEN, MAXIMUM_ASK,
    MAX_CONNECTIONS, MAX_ORDERS, MINIMUM_BID, NUM_BOOK_LEVELS, ORDER_BOOK_MESSAGE_DEPTH,
    TICK_SIZE,
};
