#![forbid(unsafe_code)]

pub mod catalog;
pub mod catch_table;
pub mod clock;
pub mod config;
pub mod gear;
pub mod player;
pub mod records;
pub mod session;
pub mod store;
pub mod weather;

pub use config::Config;
pub use player::{Player, PlayerId};
pub use session::{
    CastRequest, FishingEngine, Location, Outcome, Phase, PlayerAction, SessionError,
    SessionEvent, SessionEventKind,
};
pub use store::{Ledger, MemoryStore, PlayerStore};
