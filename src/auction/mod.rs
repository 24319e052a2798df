//! Auction core: the bid ledger and its Open/Closed lifecycle

pub mod ledger;
pub mod state;

pub use ledger::{BidRecord, Ledger};
pub use state::{AuctionResult, AuctionState, AuctionStatus, Bid, SubmitOutcome};
