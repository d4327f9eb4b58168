use std::{fmt::Display, sync::Arc};

use log::{debug, trace};
use rand::Rng;
use tokio::time::Instant;

use super::{
    fight::{fish_factor, Fight, FightStatus, FightTurn},
    SessionError,
};
use crate::{
    catalog::WaterType,
    catch_table::{apply_luck, eligible_species, sample_catch, SampledCatch, WeightedSpecies},
    clock::Season,
    config::Config,
    gear::{GearEffects, GearSnapshot, ItemId},
    player::{Player, PlayerId, Settlement},
    weather::Weather,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Cast,
    AwaitingBite,
    Strike,
    HookAttempt,
    Fighting,
    Landed,
    Escaped,
    Snapped,
    TimedOut,
}

impl Phase {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Cast | Self::AwaitingBite | Self::Strike | Self::HookAttempt | Self::Fighting
        )
    }

    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Self::Landed => Some(Outcome::Landed),
            Self::Escaped => Some(Outcome::Escaped),
            Self::Snapped => Some(Outcome::Snapped),
            Self::TimedOut => Some(Outcome::TimedOut),
            _ => None,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Cast => "casting",
            Self::AwaitingBite => "waiting for a bite",
            Self::Strike => "striking",
            Self::HookAttempt => "setting the hook",
            Self::Fighting => "fighting",
            Self::Landed => "landed",
            Self::Escaped => "escaped",
            Self::Snapped => "snapped",
            Self::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Landed,
    Escaped,
    Snapped,
    TimedOut,
}

impl From<Outcome> for Phase {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Landed => Self::Landed,
            Outcome::Escaped => Self::Escaped,
            Outcome::Snapped => Self::Snapped,
            Outcome::TimedOut => Self::TimedOut,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Phase::from(*self).fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerAction {
    Reel,
    /// Cut the line.
    Release,
}

/// Checks the cast preconditions, in the order they are reported.
pub fn check_gear(player: &Player, water: WaterType) -> Result<GearSnapshot, SessionError> {
    let (_, rod) = player.equipped_rod().ok_or(SessionError::NoRodEquipped)?;
    if rod.is_broken() {
        return Err(SessionError::RodBroken);
    }

    match player.equipped_lure() {
        Some((_, lure)) if !lure.is_empty() => {}
        _ => return Err(SessionError::NoLureOrLureEmpty),
    }

    if !rod.habitat.accepts(water) {
        return Err(SessionError::IncompatibleGear(water));
    }

    player.gear_snapshot().ok_or(SessionError::NoRodEquipped)
}

/// One player's fishing session, advanced by actions and deadlines.
///
/// The session never sleeps and never touches the player store. Its owner
/// feeds it the current instant and persists the [`Settlement`] once the
/// session is terminal.
#[derive(Debug)]
pub struct Session {
    player: PlayerId,
    config: Arc<Config>,
    phase: Phase,
    rod_id: ItemId,
    lure_id: ItemId,
    effects: GearEffects,
    weather: Weather,
    pool: Vec<WeightedSpecies>,
    /// Deadline of the current phase. In a fight this is the turn deadline.
    deadline: Instant,
    next_poll: Instant,
    fight_deadline: Instant,
    catch: Option<SampledCatch>,
    fight: Option<Fight>,
    rod_wear: u32,
    lure_charges: u32,
    transitions: Vec<Phase>,
}

impl Session {
    /// Casts the line. The gear must already have passed [`check_gear`].
    pub fn cast(
        player: PlayerId,
        gear: &GearSnapshot,
        water: WaterType,
        season: Season,
        weather: Weather,
        config: Arc<Config>,
        now: Instant,
    ) -> Self {
        let mut pool = eligible_species(water, season, &weather, &gear.lure);
        apply_luck(&mut pool, gear.luck_bonus);
        debug!(
            "Player {player} cast into {water:?} water during {weather} with {} species about",
            pool.len()
        );

        let mut session = Self {
            player,
            phase: Phase::Cast,
            rod_id: gear.rod_id,
            lure_id: gear.lure_id,
            effects: GearEffects::new(gear, water),
            weather,
            pool,
            deadline: now + config.session.bite_window,
            next_poll: now + config.session.bite_poll,
            fight_deadline: now,
            catch: None,
            fight: None,
            rod_wear: 0,
            lure_charges: 0,
            transitions: vec![Phase::Cast],
            config,
        };
        session.enter(Phase::AwaitingBite);
        session
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn catch(&self) -> Option<&SampledCatch> {
        self.catch.as_ref()
    }

    pub fn fight_status(&self) -> Option<FightStatus> {
        self.fight.as_ref().map(Fight::status)
    }

    /// Phases entered since the last call, oldest first.
    pub fn drain_transitions(&mut self) -> Vec<Phase> {
        std::mem::take(&mut self.transitions)
    }

    fn enter(&mut self, phase: Phase) {
        trace!("Player {} session: {} -> {}", self.player, self.phase, phase);
        self.phase = phase;
        self.transitions.push(phase);
    }

    /// The next instant the session must be woken at, if it is still running.
    pub fn next_wake(&self) -> Option<Instant> {
        match self.phase {
            Phase::AwaitingBite => Some(self.next_poll.min(self.deadline)),
            Phase::HookAttempt => Some(self.deadline),
            Phase::Fighting => Some(self.deadline.min(self.fight_deadline)),
            _ => None,
        }
    }

    /// Handles every deadline that has passed by `now`.
    pub fn on_timer<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        while let Some(wake) = self.next_wake() {
            if wake > now {
                break;
            }
            self.tick(now, rng);
        }
    }

    fn tick<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        match self.phase {
            Phase::AwaitingBite => {
                while self.next_poll < self.deadline && self.next_poll <= now {
                    if self.roll_bite(rng) {
                        self.strike(now, rng);
                        return;
                    }
                    self.next_poll += self.config.session.bite_poll;
                }
                if now >= self.deadline {
                    debug!("Player {} got no bite", self.player);
                    self.enter(Phase::Escaped);
                }
            }
            Phase::HookAttempt if now >= self.deadline => {
                debug!("Player {} was too slow to set the hook", self.player);
                self.enter(Phase::Escaped);
            }
            Phase::Fighting if self.fight_deadline <= self.deadline => {
                if now >= self.fight_deadline {
                    debug!("Player {} ran out of time", self.player);
                    self.enter(Phase::TimedOut);
                }
            }
            Phase::Fighting if now >= self.deadline => {
                // idle turns are counted on their own schedule, however late we are
                let turn_end = self.deadline;
                let turn = match self.fight.as_mut() {
                    Some(fight) => fight.idle(&self.config.fight, turn_end),
                    None => FightTurn::Escaped,
                };
                self.deadline = turn_end + self.config.fight.turn_window;
                self.finish_turn(turn);
            }
            _ => {}
        }
    }

    fn roll_bite<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        if self.pool.is_empty() {
            return false;
        }

        let chance = self.config.session.base_bite_rate
            * self.weather.catch_multiplier
            * self.effects.bite_multiplier;
        rng.gen_bool(f64::from(chance.clamp(0.0, 1.0)))
    }

    fn strike<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        self.enter(Phase::Strike);

        let Some(catch) = sample_catch(&self.pool, rng) else {
            self.enter(Phase::Escaped);
            return;
        };
        debug!("Player {} has a bite from a {catch}", self.player);

        self.catch = Some(catch);
        self.lure_charges = self.effects.lure_cost;
        self.deadline = now + self.config.session.hook_window;
        self.enter(Phase::HookAttempt);
    }

    /// Applies a player action. Deadlines due by `now` are handled first.
    pub fn on_action<R: Rng + ?Sized>(
        &mut self,
        action: PlayerAction,
        now: Instant,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        self.on_timer(now, rng);

        match (action, self.phase) {
            (PlayerAction::Release, phase) if phase.is_active() => {
                debug!("Player {} cut the line", self.player);
                self.enter(Phase::Escaped);
            }
            (PlayerAction::Reel, Phase::HookAttempt) => {
                let chance = (self.config.session.base_hook_chance + self.effects.hook_bonus)
                    .clamp(0.0, 1.0);
                if !rng.gen_bool(f64::from(chance)) {
                    debug!("Player {} missed the hook", self.player);
                    self.enter(Phase::Escaped);
                    return Ok(());
                }

                let factor = self.catch.as_ref().map_or(1.0, fish_factor);
                self.fight = Some(Fight::new(factor, now));
                self.deadline = now + self.config.fight.turn_window;
                self.fight_deadline = now + self.config.fight.fight_deadline;
                self.enter(Phase::Fighting);
            }
            (PlayerAction::Reel, Phase::Fighting) => {
                let turn = match self.fight.as_mut() {
                    Some(fight) => fight.reel(&self.config.fight, &self.effects, now),
                    None => FightTurn::Escaped,
                };
                self.deadline = now + self.config.fight.turn_window;
                self.finish_turn(turn);
            }
            (_, phase) => return Err(SessionError::InvalidTransition(phase)),
        }

        Ok(())
    }

    fn finish_turn(&mut self, turn: FightTurn) {
        match turn {
            FightTurn::Holding => {}
            FightTurn::Landed => self.enter(Phase::Landed),
            FightTurn::Escaped => self.enter(Phase::Escaped),
            FightTurn::Snapped => {
                self.rod_wear = self.effects.rod_wear;
                self.enter(Phase::Snapped);
            }
        }
    }

    /// The resource changes to persist, once the session has ended.
    pub fn settlement(&self) -> Option<Settlement> {
        let outcome = self.phase.outcome()?;

        Some(Settlement {
            rod_id: self.rod_id,
            lure_id: self.lure_id,
            rod_wear: self.rod_wear,
            lure_charges: self.lure_charges,
            catch: match outcome {
                Outcome::Landed => self.catch.clone(),
                _ => None,
            },
        })
    }
}
