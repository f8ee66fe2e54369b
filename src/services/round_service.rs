use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    dto::ws::PlayTimerUpdate,
    services::{
        clock::{Clock, Tick, unix_millis},
        ws_events,
    },
    state::{SharedState, core::ServerCore, hub::Hub},
};

/// Drive the Play/Lobby cadence from the clock's tick stream.
///
/// This task is the only writer of the round state; it takes the core lock
/// once per tick, emits that second's broadcasts, then recalibrates the
/// clock.
pub async fn run(state: SharedState, clock: Clock, mut ticks: mpsc::Receiver<Tick>) {
    let mut first = true;
    while let Some(_tick) = ticks.recv().await {
        let now = SystemTime::now();
        {
            let mut core = state.lock_core();
            handle_tick(
                &mut core,
                state.hub(),
                state.config(),
                first,
                unix_millis(now),
            );
        }
        clock.calibrate(now);
        first = false;
    }
    debug!("tick stream closed; round scheduler stopping");
}

/// Advance the countdown by one second and emit everything that second owes.
///
/// The one-shot first tick lands mid-cycle, so it replays the entry into
/// whichever phase the wall clock says is current. After any tick returns,
/// `round_in_progress` agrees with `secs_remaining > lobby`.
pub(crate) fn handle_tick(
    core: &mut ServerCore,
    hub: &Hub,
    config: &AppConfig,
    first: bool,
    now_ms: u64,
) {
    let lobby = config.lobby_secs;

    if first {
        if core.round.secs_remaining == 0 {
            core.round.secs_remaining = config.cycle_secs;
        }
        if core.round.secs_remaining > lobby {
            enter_play(core, hub, config);
        } else {
            enter_lobby(core, hub, config);
        }
        core.round.secs_remaining -= 1;
        return;
    }

    let secs = core.round.secs_remaining;
    if secs > lobby {
        play_tick(core, hub, config);
        core.round.secs_remaining -= 1;
        if core.round.secs_remaining == lobby {
            enter_lobby(core, hub, config);
        }
    } else if secs + 1 == lobby {
        coarse_adjust(core, config, now_ms);
        lobby_tick(core, hub);
        core.round.secs_remaining = core.round.secs_remaining.saturating_sub(1);
    } else {
        lobby_tick(core, hub);
        if core.round.secs_remaining == 0 {
            core.round.secs_remaining = config.cycle_secs;
            enter_play(core, hub, config);
        }
        core.round.secs_remaining -= 1;
    }
}

/// Start a round: wipe the scoreboards, then announce and tick Play.
fn enter_play(core: &mut ServerCore, hub: &Hub, config: &AppConfig) {
    for player in core.registry.players_mut() {
        player.points = 0;
        player.incomplete_round = false;
    }
    core.round.round_in_progress = true;
    info!(play_secs = config.play_secs(), "round started");
    ws_events::broadcast_round_started(hub, config.play_secs());
    play_tick(core, hub, config);
}

/// End a round: freeze scores, publish results, then tick Lobby.
fn enter_lobby(core: &mut ServerCore, hub: &Hub, config: &AppConfig) {
    core.round.round_in_progress = false;
    info!(lobby_secs = config.lobby_secs, "round ended");
    ws_events::broadcast_round_ended(hub, config.lobby_secs);

    let rooms: Vec<_> = core.rooms.ids().collect();
    for room in rooms {
        let results = core.leaders(room);
        core.round.set_last_results(room, results.clone());
        if core.rooms.occupancy(room) > 0 && !results.is_empty() {
            ws_events::broadcast_room_results(hub, room, core.rooms.members(room), &results);
        }
    }
    lobby_tick(core, hub);
}

/// Broadcast the Play countdown and scoreboard to each occupied room.
fn play_tick(core: &ServerCore, hub: &Hub, config: &AppConfig) {
    let time_remaining = core.round.secs_remaining - config.lobby_secs;
    for room in core.rooms.ids() {
        if core.rooms.occupancy(room) == 0 {
            continue;
        }
        let update = PlayTimerUpdate {
            time_remaining,
            leaders: core.leaders(room),
        };
        ws_events::broadcast_play_timer(hub, room, core.rooms.members(room), &update);
    }
}

/// Broadcast the Lobby countdown to each occupied room.
fn lobby_tick(core: &ServerCore, hub: &Hub) {
    for room in core.rooms.ids() {
        if core.rooms.occupancy(room) == 0 {
            continue;
        }
        ws_events::broadcast_lobby_timer(
            hub,
            room,
            core.rooms.members(room),
            core.round.secs_remaining,
        );
    }
}

/// Once per cycle, re-time the Lobby so the countdown re-converges with the
/// absolute modulo-cycle schedule.
fn coarse_adjust(core: &mut ServerCore, config: &AppConfig, now_ms: u64) {
    let ms_until = ms_until_next_cycle(now_ms, core.round.secs_remaining, config.cycle_secs * 1000);
    let target = coarse_target(
        core.round.secs_remaining,
        ms_until,
        config.lobby_secs,
        config.max_skip_fwd_secs,
    );
    if target != core.round.secs_remaining {
        info!(
            from = core.round.secs_remaining,
            to = target,
            ms_until,
            "coarse cadence correction"
        );
        core.round.secs_remaining = target;
    }
}

/// Signed milliseconds until the cycle boundary this countdown is targeting:
/// the schedule multiple nearest to `now + secs_remaining`. Negative once the
/// wall clock has run past that boundary.
fn ms_until_next_cycle(now_ms: u64, secs_remaining: u64, cycle_ms: u64) -> i64 {
    let believed = now_ms as i64 + secs_remaining as i64 * 1000;
    let cycle = cycle_ms as i64;
    let boundary = (believed + cycle / 2).div_euclid(cycle) * cycle;
    boundary - now_ms as i64
}

/// Where the countdown should move to, given how many whole seconds actually
/// remain. Forward skips are capped per cycle; backward skips cap at
/// restarting the Lobby from its beginning.
fn coarse_target(secs_remaining: u64, ms_until: i64, lobby_secs: u64, max_skip_fwd: u64) -> u64 {
    let actual = (ms_until + 500).div_euclid(1000);
    if actual == secs_remaining as i64 {
        return secs_remaining;
    }
    let skip_floor = secs_remaining as i64 - max_skip_fwd as i64;
    skip_floor.max((lobby_secs as i64).min(actual)).max(0) as u64
}
