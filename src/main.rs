#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use dotenvy::dotenv;
use eyre::{eyre, Result, WrapErr};
use fishinge_engine::{
    catalog::{Habitat, WaterType},
    clock::GuildId,
    config::ConfigError,
    gear::{Item, Rod, RodAction},
    session::FightStatus,
    weather, CastRequest, Config, FishingEngine, Location, MemoryStore, Phase, Player, PlayerAction,
    PlayerId, SessionEvent, SessionEventKind,
};
use futures_lite::stream::StreamExt;
use log::{debug, error, info, trace, warn};
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, seq::SliceRandom, thread_rng, Rng, SeedableRng};
use regex::Regex;
use signal_hook::consts::*;
use signal_hook_tokio::Signals;
use tokio::{
    select,
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::sleep,
};

type Engine = FishingEngine<MemoryStore>;

const GUILD: GuildId = 1;
/// Sell the catch once this many fish are held.
const SELL_AT: usize = 5;

static QUITTING: AtomicBool = AtomicBool::new(false);

static LOCATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<name>[^=]+?)\s*=\s*(?P<water>fresh|salt)(?:water)?\s*$").unwrap()
});

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Could not register signal handler")]
    Signals(#[source] std::io::Error),

    #[error("Could not load config")]
    Config(#[from] ConfigError),

    #[error("Could not join thread")]
    JoinThread(#[from] tokio::task::JoinError),

    #[error("Invalid location {0:?}, expected `name=fresh` or `name=salt`")]
    InvalidLocation(String),

    #[error("Environment variable {name} is not a number")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
}

fn parse_locations(text: &str) -> Result<Vec<Location>, Error> {
    text.split(',')
        .map(|part| {
            let captures = LOCATION_REGEX
                .captures(part)
                .ok_or_else(|| Error::InvalidLocation(part.to_string()))?;
            let water = match &captures["water"] {
                "salt" => WaterType::Saltwater,
                _ => WaterType::Freshwater,
            };
            Ok(Location {
                name: captures["name"].to_string(),
                water,
            })
        })
        .collect()
}

fn locations() -> Result<Vec<Location>, Error> {
    match env::var("LOCATIONS") {
        Ok(text) => parse_locations(&text),
        Err(_) => parse_locations("Mirror Lake=fresh, Old Mill Pond=fresh, Gull Pier=salt"),
    }
}

fn angler_count() -> Result<u64, Error> {
    match env::var("ANGLERS") {
        Ok(text) => text.trim().parse().map_err(|source| Error::InvalidNumber {
            name: "ANGLERS",
            source,
        }),
        Err(_) => Ok(3),
    }
}

/// A starter kit plus a rod for the coast.
fn new_angler(id: PlayerId) -> Player {
    let mut player = Player::with_starter_kit(id);
    player.add_item(Item::Rod(Rod {
        name: "Surf Rod".to_string(),
        durability: 15,
        max_durability: 15,
        power: 1.4,
        action: RodAction::Fast,
        habitat: Habitat::Saltwater,
    }));
    player
}

async fn handle_signals(mut signals: Signals, quit_signal: Arc<Notify>) {
    info!("Starting signal handler");
    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM | SIGINT | SIGQUIT => {
                // Shutdown the system
                QUITTING.store(true, Ordering::Relaxed);
                quit_signal.notify_waiters();
                break;
            }
            _ => unreachable!(),
        }
    }
}

/// Logs every session event and hands it to the angler it belongs to.
async fn route_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    anglers: HashMap<PlayerId, mpsc::UnboundedSender<SessionEventKind>>,
) {
    while let Some(event) = events.recv().await {
        match &event.kind {
            SessionEventKind::PhaseChanged { phase, .. } => {
                debug!("Angler {} is {phase}", event.player)
            }
            SessionEventKind::FightProgress(status) => trace!(
                "Angler {} fight: tension {:.0}, progress {:.0}",
                event.player,
                status.tension,
                status.progress
            ),
            SessionEventKind::Terminated { outcome, report } => match &report.caught {
                Some(fish) => info!(
                    "Angler {} {outcome}: {} {:.2}kg {:.0}cm{}",
                    event.player,
                    fish.species,
                    fish.weight,
                    fish.length,
                    if fish.trophy { " (record!)" } else { "" }
                ),
                None => info!("Angler {} {outcome}", event.player),
            },
            SessionEventKind::SettlementFailed { outcome, reason } => {
                error!("Angler {} {outcome} but nothing was saved: {reason}", event.player)
            }
        }

        if let Some(angler) = anglers.get(&event.player) {
            let _ = angler.send(event.kind);
        }
    }
}

/// Equips a rod for the water and fixes up worn gear before a cast.
async fn prepare(engine: &Engine, id: PlayerId, water: WaterType) -> Result<()> {
    engine
        .ledger()
        .update(id, |player| -> Result<()> {
            let rod_index = player
                .items()
                .position(|item| matches!(item, Item::Rod(rod) if rod.habitat.accepts(water)))
                .ok_or_else(|| eyre!("angler {id} owns no rod for {water:?} water"))?;
            player.equip(rod_index)?;

            if player.equipped_rod().map_or(false, |(_, rod)| rod.is_broken()) {
                let durability = player.repair_rod(rod_index)?;
                debug!("Angler {id} repaired their rod to {durability}");
            }

            let empty_lure = player
                .equipped_lure()
                .filter(|(_, lure)| lure.is_empty())
                .map(|(index, _)| index);
            if let Some(index) = empty_lure {
                player.restock_lure(index, 1)?;
                debug!("Angler {id} restocked their lure");
            }

            if player.catches.len() >= SELL_AT {
                let earned = player.sell_catches();
                info!("Angler {id} sold their catch for {earned:.2} FishPoints");
            }

            Ok(())
        })
        .await
}

/// How long to let tension ease before reeling again.
fn cooldown(engine: &Engine, status: &FightStatus) -> Duration {
    let fight = &engine.config().fight;
    let comfortable = fight.safe_tension * 0.8;
    if status.tension < comfortable || fight.idle_decay_per_sec <= 0.0 {
        return Duration::ZERO;
    }

    let seconds = (status.tension - comfortable * 0.5) / fight.idle_decay_per_sec;
    let limit = fight.turn_window.saturating_sub(Duration::from_secs(2));
    Duration::from_secs_f32(seconds).min(limit)
}

async fn reel(engine: &Engine, id: PlayerId) {
    match engine.act(id, PlayerAction::Reel).await {
        Ok(phase) => trace!("Angler {id} reeled, now {phase}"),
        Err(err) => debug!("Angler {id} could not reel: {err}"),
    }
}

/// Plays one session to its end.
async fn play(
    engine: &Engine,
    id: PlayerId,
    events: &mut mpsc::UnboundedReceiver<SessionEventKind>,
    quit: &Notify,
    rng: &mut StdRng,
) {
    loop {
        let kind = select! {
            kind = events.recv() => kind,
            _ = quit.notified() => {
                let _ = engine.act(id, PlayerAction::Release).await;
                continue;
            }
        };

        let status = match kind {
            None => return,
            Some(SessionEventKind::Terminated { .. } | SessionEventKind::SettlementFailed { .. }) => {
                return
            }
            Some(SessionEventKind::PhaseChanged {
                phase: Phase::HookAttempt,
                ..
            }) => {
                sleep(Duration::from_millis(rng.gen_range(300..3_000))).await;
                reel(engine, id).await;
                continue;
            }
            Some(SessionEventKind::PhaseChanged {
                phase: Phase::Fighting,
                fight: Some(status),
            })
            | Some(SessionEventKind::FightProgress(status)) => status,
            Some(_) => continue,
        };

        sleep(cooldown(engine, &status) + Duration::from_millis(rng.gen_range(200..800))).await;
        reel(engine, id).await;
    }
}

async fn angler(
    engine: Arc<Engine>,
    id: PlayerId,
    locations: Arc<Vec<Location>>,
    mut events: mpsc::UnboundedReceiver<SessionEventKind>,
    quit: Arc<Notify>,
) {
    let mut rng = StdRng::seed_from_u64(thread_rng().gen());

    while !QUITTING.load(Ordering::Relaxed) {
        let Some(location) = locations.choose(&mut rng).cloned() else {
            return;
        };

        if let Err(err) = prepare(&engine, id, location.water).await {
            error!("Could not prepare angler {id}: {err:?}");
            return;
        }

        let request = CastRequest {
            player: id,
            guild: GUILD,
            location,
        };
        match engine.start(request).await {
            Ok(conditions) => debug!(
                "Angler {id} is out in {} at {}",
                conditions.weather, conditions.time_of_day
            ),
            Err(err) => {
                warn!("Angler {id} could not cast: {err}");
                sleep(Duration::from_secs(5)).await;
                continue;
            }
        }

        play(&engine, id, &mut events, &quit, &mut rng).await;

        select! {
            _ = sleep(Duration::from_secs(rng.gen_range(2..10))) => {}
            _ = quit.notified() => {}
        }
    }
}

async fn report(engine: &Engine, ids: impl Iterator<Item = PlayerId>) {
    for id in ids {
        let player = match engine.ledger().read(id).await {
            Ok(player) => player,
            Err(err) => {
                error!("Could not read angler {id}: {err}");
                continue;
            }
        };

        let best = player
            .best_catch()
            .map_or_else(|| "nothing".to_string(), |fish| format!("{} {:.2}kg", fish.species, fish.weight));
        info!(
            "Angler {id}: {:.2} FishPoints, {} FishMaster tokens, {} records, best held catch {best}",
            player.fish_points,
            player.tokens,
            player.records.len()
        );
    }
}

async fn run() -> Result<()> {
    let signals = Signals::new(&[SIGTERM, SIGINT, SIGQUIT]).map_err(Error::Signals)?;
    let quit_signal = Arc::new(Notify::new());

    let config = Config::load().map_err(Error::from)?;
    let locations = Arc::new(locations()?);
    let ids = (1..=angler_count()?).collect::<Vec<PlayerId>>();

    let store = MemoryStore::with_players(ids.iter().copied().map(new_angler));
    let (engine, events) = FishingEngine::new(config, store);
    let engine = Arc::new(engine);

    let clock = engine.clocks().get(GUILD);
    for (at, conditions) in weather::forecast(&clock, GUILD, Utc::now(), 6) {
        info!(
            "{} {}: {} {} {}",
            at.format("%H:%M"),
            conditions.date,
            conditions.time_of_day.glyph(),
            conditions.time_of_day,
            conditions.weather
        );
    }

    let handle = signals.handle();
    let signals_task = tokio::spawn(handle_signals(signals, quit_signal.clone()));

    let mut routes = HashMap::new();
    let mut anglers: Vec<JoinHandle<()>> = Vec::new();
    for &id in &ids {
        let (sender, receiver) = mpsc::unbounded_channel();
        routes.insert(id, sender);
        anglers.push(tokio::spawn(angler(
            engine.clone(),
            id,
            locations.clone(),
            receiver,
            quit_signal.clone(),
        )));
    }
    let router_task = tokio::spawn(route_events(events, routes));

    info!("Simulating {} anglers, press Ctrl-C to stop", ids.len());

    // keep the tokio executor alive.
    for task in anglers {
        task.await.map_err(Error::from)?;
    }
    router_task.abort();

    report(&engine, ids.into_iter()).await;

    // Terminate the signal stream.
    handle.close();
    signals_task.await.map_err(Error::from)?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    dotenv().ok();

    run().await.wrap_err("failed to run simulator")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_location_lists() {
        let locations = parse_locations("Mirror Lake=fresh, Gull Pier = saltwater").unwrap();

        assert_eq!(
            locations,
            vec![
                Location {
                    name: "Mirror Lake".to_string(),
                    water: WaterType::Freshwater,
                },
                Location {
                    name: "Gull Pier".to_string(),
                    water: WaterType::Saltwater,
                },
            ]
        );
    }

    #[test]
    fn rejects_unknown_water() {
        assert!(matches!(
            parse_locations("Lava Lake=magma"),
            Err(Error::InvalidLocation(_))
        ));
    }
}
