//! Merge Drop headless runner
//!
//! Plays a seeded game with a simple autoplayer and prints a summary. Used
//! for soak runs and determinism checks (same seed, same output).
//!
//! Usage: `merge-drop [seed] [max_ticks] [tuning.json]`

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use merge_drop::Tuning;
    use merge_drop::sim::{GameState, ResourcePool, TickInput, tick};

    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let seed = args.first().and_then(|s| s.parse().ok()).unwrap_or(12345u64);
    let max_ticks = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(60 * 60 * 5u64);

    let tuning = match args.get(2) {
        Some(path) => match std::fs::read_to_string(path)
            .map_err(|e| merge_drop::EngineError::InvalidTuning(e.to_string()))
            .and_then(|json| Tuning::from_json(&json))
        {
            Ok(t) => t,
            Err(err) => {
                log::warn!("Ignoring tuning file {}: {}", path, err);
                Tuning::default()
            }
        },
        None => Tuning::default(),
    };

    let mut state = match GameState::with_tuning(seed, tuning) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Invalid tuning: {}", err);
            std::process::exit(2);
        }
    };
    log::info!("Merge Drop (headless) starting with seed {}", seed);

    let mut resources = ResourcePool::new(100.0, 0.0);
    while state.time_ticks < max_ticks && !state.is_game_over() {
        // Progression stand-in: the container slowly refills
        resources.available = (resources.available + 0.05).min(resources.capacity);

        let input = TickInput {
            launch: autoplay::pick_launch(&state),
            ability: autoplay::pick_ability(&state, &resources),
            ..Default::default()
        };
        tick(&mut state, &input, &mut resources);
        state.drain_events();
    }

    let summary = serde_json::json!({
        "seed": seed,
        "ticks": state.time_ticks,
        "elapsed_ms": merge_drop::ticks_to_ms(state.time_ticks),
        "score": state.score(),
        "game_over": state.is_game_over(),
        "bodies": state.world.body_count(),
        "stats": state.stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
}

#[cfg(not(target_arch = "wasm32"))]
mod autoplay {
    use glam::Vec2;
    use merge_drop::sim::{Abilities, AbilityKind, GameState, LaunchRequest, ResourcePool};

    /// Drop onto the highest body of the preview's level, else sweep the field
    pub fn pick_launch(state: &GameState) -> Option<LaunchRequest> {
        if state.factory.cooldown_remaining(&state.tuning, state.time_ticks) > 0 {
            return None;
        }
        let preview = state.preview();
        let radius = state.tuning.radius_for_level(preview.level);
        let width = state.tuning.field_width;

        let target = state
            .world
            .bodies()
            .filter(|b| b.is_active() && b.level == preview.level && b.kind.is_normal())
            .max_by(|a, b| a.pos.y.total_cmp(&b.pos.y))
            .map(|b| b.pos.x);
        let x = target.unwrap_or_else(|| {
            let lanes = 7u64;
            let lane = (state.time_ticks / 30) % lanes;
            width * (lane as f32 + 0.5) / lanes as f32
        });
        Some(LaunchRequest::drop_at(x.clamp(radius, width - radius), &state.tuning))
    }

    /// Blast whatever sits closest to the danger line once it gets close
    pub fn pick_ability(state: &GameState, resources: &ResourcePool) -> Option<(AbilityKind, Option<Vec2>)> {
        let kind = AbilityKind::AreaDestroyer;
        if state.abilities.ensure_available(kind).is_err()
            || Abilities::check_affordable(kind, &state.tuning, resources).is_err()
        {
            return None;
        }
        let alarm = state.tuning.danger_line - 60.0;
        state
            .world
            .bodies()
            .filter(|b| b.is_active() && b.pos.y > alarm)
            .filter(|b| !b.in_grace(state.time_ticks, state.tuning.grace_ticks()))
            .max_by(|a, b| a.pos.y.total_cmp(&b.pos.y))
            .map(|b| (kind, Some(b.pos)))
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The browser entry point is `web::start`; this only satisfies the compiler
}
