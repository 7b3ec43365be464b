use std::collections::BTreeMap;

use glam::Vec2;
use proptest::prelude::*;

use merge_drop::Tuning;
use merge_drop::sim::{
    AbilityKind, Body, BodyId, BodyKind, ContactLedger, ContactRules, GameState, LaunchRequest,
    RawContact, ResourcePool, ScoreCurve, TickInput, resolve_contacts, tick,
};

/// One scripted frame: maybe launch, maybe fire an ability
#[derive(Debug, Clone)]
struct Step {
    launch_x: Option<f32>,
    ability: Option<(u8, f32, f32)>,
    idle: u8,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (
        prop::option::of(20.0f32..400.0),
        prop::option::weighted(0.1, (0u8..3, 0.0f32..420.0, 0.0f32..700.0)),
        0u8..20,
    )
        .prop_map(|(launch_x, ability, idle)| Step {
            launch_x,
            ability,
            idle,
        })
}

fn input_for(step: &Step, tuning: &Tuning) -> TickInput {
    TickInput {
        launch: step.launch_x.map(|x| LaunchRequest::drop_at(x, tuning)),
        ability: step.ability.map(|(k, x, y)| {
            let kind = AbilityKind::ALL[k as usize % AbilityKind::ALL.len()];
            (kind, Some(Vec2::new(x, y)))
        }),
        ..Default::default()
    }
}

fn play(seed: u64, steps: &[Step], mut on_tick: impl FnMut(&GameState)) -> GameState {
    let mut state = GameState::new(seed);
    let mut pool = ResourcePool::full(100.0);
    for step in steps {
        let input = input_for(step, &state.tuning);
        tick(&mut state, &input, &mut pool);
        on_tick(&state);
        for _ in 0..step.idle {
            tick(&mut state, &TickInput::default(), &mut pool);
            on_tick(&state);
        }
        pool.available = (pool.available + 5.0).min(pool.capacity);
    }
    state
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_score_never_decreases(seed in any::<u64>(), steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut last = 0u64;
        let mut ok = true;
        play(seed, &steps, |state| {
            ok &= state.score() >= last;
            last = state.score();
        });
        prop_assert!(ok);
    }

    #[test]
    fn prop_same_seed_same_game(seed in any::<u64>(), steps in prop::collection::vec(step_strategy(), 1..30)) {
        let a = play(seed, &steps, |_| {});
        let b = play(seed, &steps, |_| {});
        prop_assert_eq!(a.time_ticks, b.time_ticks);
        prop_assert_eq!(a.score(), b.score());
        prop_assert_eq!(a.stats, b.stats);
        prop_assert_eq!(a.body_snapshot(), b.body_snapshot());
    }

    #[test]
    fn prop_repeated_contacts_merge_once(
        repeats in 1usize..16,
        frames in 1u64..15,
        level in 1u8..12,
        swap in any::<bool>(),
    ) {
        let tuning = Tuning::default();
        let rules = ContactRules {
            grace_ticks: 0,
            dedup_ticks: 15,
            merge_delay_ticks: 0,
        };
        let r = tuning.radius_for_level(level);
        let (a, b) = (BodyId(1), BodyId(2));
        let mut registry = BTreeMap::new();
        registry.insert(a, Body::new(a, Vec2::new(100.0, 100.0), r, level, BodyKind::Normal, 0));
        registry.insert(b, Body::new(b, Vec2::new(100.0 + 2.0 * r - 1.0, 100.0), r, level, BodyKind::Normal, 0));

        let contact = if swap {
            RawContact::bodies(b, a, Vec2::new(100.0 + r, 100.0))
        } else {
            RawContact::bodies(a, b, Vec2::new(100.0 + r, 100.0))
        };
        let raw = vec![contact; repeats];

        // Same unresolved pair, touching every frame inside the dedup window
        let mut ledger = ContactLedger::new();
        let mut merges = 0;
        for now in 100..100 + frames {
            let resolution = resolve_contacts(&raw, &registry, &ledger, &rules, now);
            ledger.commit(&resolution);
            merges += resolution.merges.len();
        }
        prop_assert_eq!(merges, 1);
    }

    #[test]
    fn prop_merge_points_are_monotonic(base in 1u64..100, growth in 1.0f64..4.0) {
        let mut tuning = Tuning::default();
        tuning.score.merge_base = base;
        tuning.score.merge_growth = growth;
        let curve = ScoreCurve::new(tuning.score.clone());
        for level in 1..tuning.max_level() {
            prop_assert!(curve.merge_points(level) > 0);
            prop_assert!(curve.merge_points(level + 1) >= curve.merge_points(level));
        }
        prop_assert!(curve.ceiling_points(tuning.max_level()) > curve.merge_points(tuning.max_level()));
    }
}
