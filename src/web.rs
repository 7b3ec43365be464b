//! Browser bindings
//!
//! The page owns rendering, input and persistence. It feeds frame times and
//! player actions in and reads snapshots and events back as JSON.

use glam::Vec2;
use wasm_bindgen::prelude::*;

use crate::error::EngineError;
use crate::sim::{AbilityKind, FixedStepper, GameState, LaunchRequest, ResourcePool, TickInput, tick};
use crate::tuning::Tuning;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // A second init (hot reload) just keeps the existing logger
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("Merge Drop core loaded");
}

fn to_js(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_ability(name: &str) -> Result<AbilityKind, JsValue> {
    AbilityKind::parse(name).ok_or_else(|| JsValue::from_str(&format!("unknown ability: {}", name)))
}

#[wasm_bindgen]
pub struct WebGame {
    state: GameState,
    stepper: FixedStepper,
    /// Commands collected between frames; consumed by the next tick
    input: TickInput,
    resources: ResourcePool,
}

#[wasm_bindgen]
impl WebGame {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: Option<f64>, tuning_json: Option<String>) -> Result<WebGame, JsValue> {
        let seed = seed.map(|s| s as u64).unwrap_or_else(|| js_sys::Date::now() as u64);
        let tuning = match tuning_json {
            Some(json) => Tuning::from_json(&json).map_err(to_js)?,
            None => Tuning::default(),
        };
        let state = GameState::with_tuning(seed, tuning).map_err(to_js)?;
        log::info!("Game initialized with seed: {}", seed);
        Ok(Self {
            state,
            stepper: FixedStepper::new(),
            input: TickInput::default(),
            resources: ResourcePool::full(0.0),
        })
    }

    /// Advance by a frame's elapsed seconds; returns ticks run
    pub fn frame(&mut self, dt: f32) -> u32 {
        let Self {
            state,
            stepper,
            input,
            resources,
        } = self;
        stepper.advance(dt, || {
            // One-shot commands apply to the first tick only
            let current = std::mem::take(input);
            tick(&mut *state, &current, &mut *resources);
        })
    }

    /// Queue a launch from the dispenser at `x`
    pub fn launch(&mut self, x: f32, vx: f32, vy: f32) {
        self.input.launch = Some(LaunchRequest {
            position: Vec2::new(x, self.state.tuning.dispenser_height),
            velocity: Vec2::new(vx, vy),
        });
    }

    pub fn arm(&mut self, ability: &str) -> Result<(), JsValue> {
        self.input.arm = Some(parse_ability(ability)?);
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.input.disarm = true;
    }

    /// Fire an ability right away; fails while paused or after game over
    pub fn activate(&mut self, ability: &str, x: Option<f32>, y: Option<f32>) -> Result<String, JsValue> {
        let kind = parse_ability(ability)?;
        let target = x.zip(y).map(|(x, y)| Vec2::new(x, y));
        let outcome = self
            .state
            .activate_ability(kind, target, &mut self.resources)
            .map_err(to_js)?;
        serde_json::to_string(&outcome).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn toggle_pause(&mut self) {
        self.input.pause = true;
    }

    /// Mirror the progression layer's resource container
    pub fn set_resources(&mut self, capacity: f32, available: f32) {
        self.resources = ResourcePool::new(capacity, available);
    }

    pub fn resources_available(&self) -> f32 {
        self.resources.available
    }

    pub fn score(&self) -> f64 {
        self.state.score() as f64
    }

    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// Leftover fraction of a tick, for interpolation
    pub fn alpha(&self) -> f32 {
        self.stepper.alpha()
    }

    pub fn bodies_json(&self) -> String {
        serde_json::to_string(&self.state.body_snapshot()).unwrap_or_default()
    }

    pub fn preview_json(&self) -> String {
        serde_json::to_string(&self.state.preview()).unwrap_or_default()
    }

    /// Take buffered events
    pub fn take_events_json(&mut self) -> String {
        serde_json::to_string(&self.state.drain_events()).unwrap_or_default()
    }

    pub fn stats_json(&self) -> String {
        serde_json::to_string(&self.state.stats).unwrap_or_default()
    }

    pub fn tuning_json(&self) -> String {
        self.state.tuning.to_json()
    }

    pub fn restart(&mut self, seed: Option<f64>) {
        let seed = seed.map(|s| s as u64).unwrap_or_else(|| js_sys::Date::now() as u64);
        self.state.restart_with_seed(seed);
        self.stepper.reset();
        self.input = TickInput::default();
    }
}
