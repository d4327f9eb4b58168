use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use chrono::Utc;
use log::{debug, error, info, trace};
use rand::{rngs::StdRng, thread_rng, Rng, SeedableRng};
use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
    time::{sleep_until, Instant},
};

use super::{
    fight::FightStatus,
    machine::{check_gear, Outcome, Phase, PlayerAction, Session},
    SessionError,
};
use crate::{
    catalog::WaterType,
    clock::{ClockRegistry, GuildId},
    config::Config,
    player::{PlayerId, SettlementReport},
    store::{Ledger, PlayerStore, StoreError},
    weather::{self, Conditions},
};

/// Pending actions a session buffers before senders have to wait.
const COMMAND_BUFFER: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub water: WaterType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastRequest {
    pub player: PlayerId,
    pub guild: GuildId,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    PhaseChanged {
        phase: Phase,
        fight: Option<FightStatus>,
    },
    /// The meters moved during a fight.
    FightProgress(FightStatus),
    /// The session ended and its costs and rewards are stored.
    Terminated {
        outcome: Outcome,
        report: SettlementReport,
    },
    /// The session ended but storing its result failed. Nothing was applied.
    SettlementFailed { outcome: Outcome, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub player: PlayerId,
    pub guild: GuildId,
    pub kind: SessionEventKind,
}

struct Command {
    action: PlayerAction,
    reply: oneshot::Sender<Result<Phase, SessionError>>,
}

struct SessionHandle {
    commands: mpsc::Sender<Command>,
    phase: watch::Receiver<Phase>,
}

enum Slot {
    /// Claimed by a cast that is still checking the player's gear.
    Reserved,
    Running(SessionHandle),
}

type Registry = Arc<Mutex<HashMap<PlayerId, Slot>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<PlayerId, Slot>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a player's reserved slot if the cast never got its session running,
/// including when the caller stops waiting for it.
struct Reservation<'a> {
    player: PlayerId,
    sessions: &'a Registry,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut sessions = lock(self.sessions);
        if matches!(sessions.get(&self.player), Some(Slot::Reserved)) {
            trace!("Releasing the reservation of player {}", self.player);
            sessions.remove(&self.player);
        }
    }
}

/// Runs fishing sessions, at most one per player.
pub struct FishingEngine<S> {
    config: Arc<Config>,
    ledger: Arc<Ledger<S>>,
    clocks: ClockRegistry,
    sessions: Registry,
    events: mpsc::UnboundedSender<SessionEvent>,
    base_seed: u64,
    started: AtomicU64,
}

impl<S: PlayerStore> FishingEngine<S> {
    /// Creates an engine and the stream its sessions report to.
    pub fn new(config: Config, store: S) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let base_seed = config.rng_seed.unwrap_or_else(|| thread_rng().gen());

        let engine = Self {
            clocks: ClockRegistry::new(config.clock.clone()),
            config: Arc::new(config),
            ledger: Arc::new(Ledger::new(store)),
            sessions: Arc::default(),
            events,
            base_seed,
            started: AtomicU64::new(0),
        };

        (engine, receiver)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The serialized mutator every other command touching players must use.
    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn clocks(&self) -> &ClockRegistry {
        &self.clocks
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// The phase of a player's session, or [`Phase::Idle`] when they are not fishing.
    pub fn phase(&self, player: PlayerId) -> Phase {
        match lock(&self.sessions).get(&player) {
            None => Phase::Idle,
            Some(Slot::Reserved) => Phase::Cast,
            Some(Slot::Running(handle)) => *handle.phase.borrow(),
        }
    }

    /// Casts a line for a player.
    ///
    /// Fails without touching the player if they are already fishing or their
    /// gear is not ready. On success returns the conditions at the water.
    pub async fn start(&self, request: CastRequest) -> Result<Conditions, SessionError> {
        let player = request.player;

        {
            let mut sessions = lock(&self.sessions);
            if sessions.contains_key(&player) {
                debug!("Player {player} tried to cast twice");
                return Err(SessionError::SessionAlreadyActive(player));
            }
            sessions.insert(player, Slot::Reserved);
        }

        let mut reservation = Reservation {
            player,
            sessions: &self.sessions,
            armed: true,
        };
        let result = self.launch(request).await;
        reservation.armed = result.is_err();

        result
    }

    async fn launch(&self, request: CastRequest) -> Result<Conditions, SessionError> {
        let CastRequest {
            player,
            guild,
            location,
        } = request;

        let state = self.ledger.read(player).await?;
        let gear = check_gear(&state, location.water)?;

        let clock = self.clocks.get(guild);
        let conditions = weather::conditions(&clock, guild, Utc::now());
        info!(
            "Player {player} casts at {} on {}, {} {}",
            location.name, conditions.date, conditions.time_of_day, conditions.weather
        );

        let session = Session::cast(
            player,
            &gear,
            location.water,
            conditions.date.season,
            conditions.weather,
            self.config.clone(),
            Instant::now(),
        );

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (phase_tx, phase_rx) = watch::channel(session.phase());
        lock(&self.sessions).insert(
            player,
            Slot::Running(SessionHandle {
                commands,
                phase: phase_rx,
            }),
        );

        let seed = self
            .base_seed
            .wrapping_add(self.started.fetch_add(1, Ordering::Relaxed));
        let controller = Controller {
            player,
            guild,
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            sessions: self.sessions.clone(),
            events: self.events.clone(),
            phase: phase_tx,
            rng: StdRng::seed_from_u64(seed),
        };
        tokio::spawn(controller.run(session, receiver));

        Ok(conditions)
    }

    /// Delivers an action to a player's session and returns the phase it led to.
    pub async fn act(&self, player: PlayerId, action: PlayerAction) -> Result<Phase, SessionError> {
        let (commands, phase) = match lock(&self.sessions).get(&player) {
            None => return Err(SessionError::SessionNotFound(player)),
            Some(Slot::Reserved) => return Err(SessionError::InvalidTransition(Phase::Cast)),
            Some(Slot::Running(handle)) => (handle.commands.clone(), handle.phase.clone()),
        };

        let (reply, response) = oneshot::channel();
        if commands.send(Command { action, reply }).await.is_err() {
            return Err(SessionError::InvalidTransition(*phase.borrow()));
        }

        response
            .await
            .unwrap_or_else(|_| Err(SessionError::InvalidTransition(*phase.borrow())))
    }
}

/// Owns one running session until it ends.
struct Controller<S> {
    player: PlayerId,
    guild: GuildId,
    config: Arc<Config>,
    ledger: Arc<Ledger<S>>,
    sessions: Registry,
    events: mpsc::UnboundedSender<SessionEvent>,
    phase: watch::Sender<Phase>,
    rng: StdRng,
}

impl<S: PlayerStore> Controller<S> {
    async fn run(mut self, mut session: Session, mut commands: mpsc::Receiver<Command>) {
        self.publish(&mut session);

        let mut last_reply = None;
        while let Some(wake) = session.next_wake() {
            select! {
                command = commands.recv() => match command {
                    Some(Command { action, reply }) => {
                        let result = session
                            .on_action(action, Instant::now(), &mut self.rng)
                            .map(|()| session.phase());
                        if let Err(err) = &result {
                            debug!("Player {} sent {action:?}: {err}", self.player);
                        }
                        last_reply = Some((reply, result));
                    }
                    None => {
                        // the engine is gone, nobody can reel any more
                        let _ = session.on_action(PlayerAction::Release, Instant::now(), &mut self.rng);
                    }
                },
                _ = sleep_until(wake) => session.on_timer(Instant::now(), &mut self.rng),
            }

            self.publish(&mut session);

            if session.phase().is_terminal() {
                break;
            }
            if let Some((reply, result)) = last_reply.take() {
                let _ = reply.send(result);
            }
        }

        let phase = session.phase();
        self.settle(&session).await;

        // the ending action is answered only once the session is gone
        if let Some((reply, result)) = last_reply {
            let _ = reply.send(result);
        }
        commands.close();
        while let Ok(Command { reply, .. }) = commands.try_recv() {
            let _ = reply.send(Err(SessionError::InvalidTransition(phase)));
        }
    }

    fn publish(&self, session: &mut Session) {
        let transitions = session.drain_transitions();
        if transitions.is_empty() && session.phase() == Phase::Fighting {
            if let Some(status) = session.fight_status() {
                self.emit(SessionEventKind::FightProgress(status));
            }
        }

        for phase in transitions {
            debug!("Player {} is {phase}", self.player);
            self.phase.send_replace(phase);
            if phase.is_terminal() {
                continue;
            }
            self.emit(SessionEventKind::PhaseChanged {
                phase,
                fight: session.fight_status(),
            });
        }
    }

    fn emit(&self, kind: SessionEventKind) {
        let event = SessionEvent {
            player: self.player,
            guild: self.guild,
            kind,
        };
        if self.events.send(event).is_err() {
            trace!("Nobody is listening for session events");
        }
    }

    /// Stores the session's result, frees the player and reports the outcome.
    async fn settle(&self, session: &Session) {
        let (Some(outcome), Some(settlement)) = (session.phase().outcome(), session.settlement())
        else {
            error!("Player {} session stopped while {}", self.player, session.phase());
            lock(&self.sessions).remove(&self.player);
            return;
        };

        let tokens_per_record = self.config.records.tokens_per_record;
        let result = self
            .ledger
            .update(self.player, |player| {
                Ok::<_, StoreError>(player.settle(&settlement, Utc::now(), tokens_per_record))
            })
            .await;

        lock(&self.sessions).remove(&self.player);

        match result {
            Ok(report) => {
                info!("Player {} session {outcome}", self.player);
                if let Some(fish) = &report.caught {
                    info!(
                        "Player {} landed a {} of {:.2}kg{}",
                        self.player,
                        fish.species,
                        fish.weight,
                        if fish.trophy { ", a new record" } else { "" }
                    );
                }
                self.emit(SessionEventKind::Terminated { outcome, report });
            }
            Err(err) => {
                error!("Could not settle session of player {}: {err}", self.player);
                self.emit(SessionEventKind::SettlementFailed {
                    outcome,
                    reason: err.to_string(),
                });
            }
        }
    }
}
