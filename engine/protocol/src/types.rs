use core::fmt;

pub type Id = u32;
pub type Price = i64;
pub type Volume = u32;
pub type Timestamp = u64;

pub const MAX_ORDERS: usize = 100_000;
pub const MINIMUM_BID: Price = 1;
pub const MAXIMUM_ASK: Price = 10_000;
pub const TICK_SIZE: Price = 1;
pub const NUM_BOOK_LEVELS: usize = ((MAXIMUM_ASK - MINIMUM_BID) / TICK_SIZE) as usize + 1;
pub const ORDER_BOOK_MESSAGE_DEPTH: usize = 10;
pub const ERROR_TEXT_LEN: usize = 32;
pub const MAX_CONNECTIONS: usize = 512;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    Sell = 0,
    Buy = 1,
}

impl Side {
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline]
    pub fn from_wire(b: u8) -> Option<Side> {
        match b {
            0 => Some(Side::Sell),
            1 => Some(Side::Buy),
            _ => None,
        }
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        })
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifespan {
    FillAndKill = 0,
    GoodForDay = 1,
}

impl Lifespan {
    #[inline]
    pub fn from_wire(b: u8) -> Option<Lifespan> {
        match b {
            0 => Some(Lifespan::FillAndKill),
            1 => Some(Lifespan::GoodForDay),
            _ => None,
        }
    }

    #[inline]
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifespan::FillAndKill => "FAK",
            Lifespan::GoodForDay => "GFD",
        })
    }
}

/// Error codes carried by `ERROR_MSG` payloads.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    OrderBookFull = 1,
    InvalidVolume = 2,
    OrderNotFound = 3,
    Unauthorised = 4,
    InvalidPrice = 5,
}

impl ErrorCode {
    #[inline]
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::OrderBookFull => "order book full",
            ErrorCode::InvalidVolume => "invalid volume",
            ErrorCode::OrderNotFound => "order not found",
            ErrorCode::Unauthorised => "unauthorised",
            ErrorCode::InvalidPrice => "invalid price",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_wire_roundtrip() {
        assert_eq!(Side::from_wire(Side::Buy.to_wire()), Some(Side::Buy));
        assert_eq!(Side::from_wire(Side::Sell.to_wire()), Some(Side::Sell));
        assert_eq!(Side::from_wire(7), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn lifespan_wire_roundtrip() {
        assert_eq!(Lifespan::from_wire(0), Some(Lifespan::FillAndKill));
        assert_eq!(Lifespan::from_wire(1), Some(Lifespan::GoodForDay));
        assert_eq!(Lifespan::from_wire(2), None);
    }

    #[test]
    fn ladder_covers_price_grid() {
        assert_eq!(NUM_BOOK_LEVELS, 10_000);
    }
}
