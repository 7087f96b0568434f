use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

use race_sim::net::start_websocket_server;
use race_sim::state::{RaceSnapshot, SharedRaceState};
use race_sim::{Race, SimConfig, SimResult, Track};

fn load_config() -> SimResult<SimConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let config = SimConfig::load(&path)?;
            info!(%path, "config loaded");
            Ok(config)
        }
        None => {
            info!("no config file given, using defaults");
            Ok(SimConfig::default())
        }
    }
}

#[tokio::main]
async fn main() {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        cars = config.race.num_cars,
        humans = config.race.num_humans,
        difficulty = config.difficulty.as_str(),
        "starting race server"
    );

    let track = Arc::new(Track::ring(8, 5));
    let step_ms = config.physics.step_ms;
    let broadcast_every = u64::from(config.server.broadcast_every_ticks);
    let bind_addr = config.server.bind_addr.clone();

    let state = Arc::new(Mutex::new(SharedRaceState::new(config.race.num_humans)));
    let mut race = Race::new(config, Arc::clone(&track));
    race.start();

    // WebSocket server
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(err) = start_websocket_server(bind_addr, server_state).await {
            error!(%err, "websocket server stopped");
        }
    });

    // Fixed timestep
    let mut ticker = interval(Duration::from_millis(u64::from(step_ms)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_events = Vec::new();

    loop {
        ticker.tick().await;

        let mut game = state.lock().await;
        game.drain_inputs_into(&mut race);

        pending_events.extend(race.step(step_ms));

        if race.tick() % broadcast_every == 0 {
            let snapshot = RaceSnapshot::capture(&race, std::mem::take(&mut pending_events));
            game.broadcast_snapshot(&snapshot);
        }

        if race.is_race_completed() {
            info!(order = ?race.standings(), time_ms = race.timing().time_ms(), "race over, restarting");
            race.load_track(Arc::clone(&track));
            race.start();
        }
    }
}
