mod engine;
mod fight;
mod machine;

pub use engine::{CastRequest, FishingEngine, Location, SessionEvent, SessionEventKind};
pub use fight::{fish_factor, Fight, FightStatus, FightTurn};
pub use machine::{check_gear, Outcome, Phase, PlayerAction, Session};

use crate::{catalog::WaterType, player::PlayerId, store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No rod equipped")]
    NoRodEquipped,

    #[error("No lure equipped or the lure is used up")]
    NoLureOrLureEmpty,

    #[error("The equipped rod is broken")]
    RodBroken,

    #[error("The equipped rod is not made for {0:?} water")]
    IncompatibleGear(WaterType),

    #[error("Player {0} is already fishing")]
    SessionAlreadyActive(PlayerId),

    #[error("That does nothing while {0}")]
    InvalidTransition(Phase),

    #[error("Player {0} is not fishing")]
    SessionNotFound(PlayerId),

    #[error("Could not read player state")]
    Store(#[from] StoreError),
}
