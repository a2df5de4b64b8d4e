//! Interfaces to the collaborators around the simulation core.
//!
//! The core only ever talks to terrain, input, rendering, audio and the
//! network through these traits, so hosts can plug in their own engines
//! and tests can use the flat implementations below.

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::events::SimEvent;
use crate::ids::VehicleId;

/// Height field and material lookups.
pub trait TerrainProvider: Send + Sync {
    /// Terrain height below `(x, z)`.
    fn height_at(&self, x: f32, z: f32) -> f32;

    /// Surface normal at a point on or near the terrain.
    fn normal_at(&self, _x: f32, _y: f32, _z: f32) -> Vec3 {
        Vec3::Y
    }

    /// Name of the ground model at `(x, z)`; `None` selects the default.
    fn ground_model_at(&self, _x: f32, _z: f32) -> Option<&str> {
        None
    }

    /// Water surface height above `pos`, if there is water.
    fn water_height_at(&self, _pos: Vec3) -> Option<f32> {
        None
    }
}

/// A horizontal plane, optionally flooded.
#[derive(Debug, Clone, Default)]
pub struct FlatTerrain {
    pub height: f32,
    pub ground_model: Option<String>,
    pub water_level: Option<f32>,
}

impl FlatTerrain {
    pub fn new(height: f32) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    pub fn with_ground_model(mut self, name: &str) -> Self {
        self.ground_model = Some(name.to_string());
        self
    }

    pub fn with_water(mut self, level: f32) -> Self {
        self.water_level = Some(level);
        self
    }
}

impl TerrainProvider for FlatTerrain {
    fn height_at(&self, _x: f32, _z: f32) -> f32 {
        self.height
    }

    fn ground_model_at(&self, _x: f32, _z: f32) -> Option<&str> {
        self.ground_model.as_deref()
    }

    fn water_height_at(&self, _pos: Vec3) -> Option<f32> {
        self.water_level
    }
}

/// No terrain at all; nodes fall forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct Void;

impl TerrainProvider for Void {
    fn height_at(&self, _x: f32, _z: f32) -> f32 {
        f32::NEG_INFINITY
    }
}

/// Stable identifiers of the controls the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEvent {
    Accelerate,
    Brake,
    SteerLeft,
    SteerRight,
    Clutch,
    ParkingBrake,
    ShiftUp,
    ShiftDown,
    Starter,
    ToggleContact,
    SwitchTransmission,
    AutoShiftUp,
    AutoShiftDown,
    TractionControl,
    AntiLock,
    CruiseToggle,
    CruiseAccelerate,
    CruiseDecelerate,
    CruiseReadjust,
    ToggleAxleLock,
    HookToggle,
    HookLock,
    HookUnlock,
    TieToggle,
    RopeToggle,
    SlideNodeToggle,
    Horn,
    Lights,
    Beacons,
    BlinkLeft,
    BlinkRight,
    BlinkWarn,
    AileronLeft,
    AileronRight,
    RudderLeft,
    RudderRight,
    ElevatorUp,
    ElevatorDown,
    /// Command key 1..=84.
    Command(u8),
    Reset,
}

/// Per-frame control values.
pub trait InputProvider {
    /// Analog value in `[0, 1]`.
    fn value(&self, event: InputEvent) -> f32;

    fn is_pressed(&self, event: InputEvent) -> bool {
        self.value(event) > 0.5
    }
}

/// Fixed input values, for scripted runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    values: FxHashMap<InputEvent, f32>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, event: InputEvent, value: f32) {
        self.values.insert(event, value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl InputProvider for ScriptedInput {
    fn value(&self, event: InputEvent) -> f32 {
        self.values.get(&event).copied().unwrap_or(0.0)
    }
}

/// Debounces toggle-style inputs: once a press is accepted, further
/// presses of the same event are ignored for `dead_time` seconds.
#[derive(Debug, Clone)]
pub struct BounceFilter {
    dead_time: f32,
    last_accepted: FxHashMap<InputEvent, f64>,
}

impl BounceFilter {
    pub fn new(dead_time: f32) -> Self {
        Self {
            dead_time: dead_time.max(0.0),
            last_accepted: FxHashMap::default(),
        }
    }

    pub fn dead_time(&self) -> f32 {
        self.dead_time
    }

    /// True if `event` is pressed and was not accepted within the dead time
    /// before `now` (seconds).
    pub fn pressed(&mut self, input: &dyn InputProvider, event: InputEvent, now: f64) -> bool {
        if !input.is_pressed(event) {
            return false;
        }
        if let Some(&last) = self.last_accepted.get(&event)
            && now - last < f64::from(self.dead_time)
        {
            return false;
        }
        self.last_accepted.insert(event, now);
        true
    }
}

/// Render-side view of a beam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamVisual {
    pub p1: Vec3,
    pub p2: Vec3,
    pub broken: bool,
    pub scale: f32,
}

/// Receives node positions, beam visuals and events at the visual rate.
pub trait RendererAdapter {
    fn update_nodes(&mut self, vehicle: VehicleId, positions: &[Vec3]);

    fn update_beams(&mut self, vehicle: VehicleId, beams: &[BeamVisual]);

    fn on_event(&mut self, event: &SimEvent);
}

/// Sound ids handed to [`AudioAdapter`].
pub mod sounds {
    /// Modulated with engine rpm.
    pub const ENGINE: i32 = 0;
    pub const BRAKE: i32 = 1;
    pub const BEAM_BREAK: i32 = 2;
    pub const ANTILOCK: i32 = 3;
    pub const TRACTION: i32 = 4;
}

/// Per-vehicle sound triggers. Driven by [`crate::audio::AudioRelay`].
pub trait AudioAdapter {
    fn trig_start(&mut self, vehicle: VehicleId, sound: i32);

    fn trig_stop(&mut self, vehicle: VehicleId, sound: i32);

    fn modulate(&mut self, vehicle: VehicleId, sound: i32, value: f32);
}

/// Transport for encoded vehicle stream frames.
pub trait NetworkAdapter {
    fn send(&mut self, vehicle: VehicleId, payload: &[u8]);

    /// Frames received since the last call.
    fn receive(&mut self) -> Vec<(VehicleId, Vec<u8>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_terrain() {
        let terrain = FlatTerrain::new(2.0).with_ground_model("gravel").with_water(1.0);
        assert_eq!(terrain.height_at(10.0, -4.0), 2.0);
        assert_eq!(terrain.normal_at(0.0, 0.0, 0.0), Vec3::Y);
        assert_eq!(terrain.ground_model_at(0.0, 0.0), Some("gravel"));
        assert_eq!(terrain.water_height_at(Vec3::ZERO), Some(1.0));
        assert_eq!(Void.height_at(0.0, 0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_bounce_filter_dead_time() {
        let mut input = ScriptedInput::new();
        input.set(InputEvent::HookToggle, 1.0);
        let mut filter = BounceFilter::new(0.2);
        assert!(filter.pressed(&input, InputEvent::HookToggle, 1.0));
        assert!(!filter.pressed(&input, InputEvent::HookToggle, 1.1));
        assert!(filter.pressed(&input, InputEvent::HookToggle, 1.25));
        assert!(!filter.pressed(&input, InputEvent::Horn, 2.0));
    }
}
