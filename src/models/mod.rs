pub mod account;
pub mod transfer;

pub use account::{LinkedAccount, Provider};
pub use transfer::{
    ParsedTitle, PlaylistSummary, SourceTrack, TrackReference, TransferRequest, TransferResult,
    TransferTally,
};
