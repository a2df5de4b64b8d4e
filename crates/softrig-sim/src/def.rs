//! Vehicle descriptions.
//!
//! A [`VehicleDef`] is the parsed, file-format independent description of a
//! vehicle. It is plain data persisted as RON; [`crate::builder`] validates
//! it and turns it into a simulated [`crate::Vehicle`]. Every section uses
//! `#[serde(default)]` so hand-written files only need what they change.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::beam::{BeamKind, BoundedKind};
use crate::brakes::BrakesDef;
use crate::constants::{
    BEAM_BREAK, BEAM_DEFORM, DEFAULT_COLLISION_RANGE, DEFAULT_DAMP, DEFAULT_RIGIDIFIER_DAMP,
    DEFAULT_RIGIDIFIER_SPRING, DEFAULT_SPRING, HOOK_FORCE_DEFAULT, HOOK_LOCK_TIMER_DEFAULT,
    HOOK_RANGE_DEFAULT, HOOK_SPEED_DEFAULT, NODE_LOCKGROUP_DEFAULT,
};
use crate::differential::DiffKind;
use crate::engine::EngineDef;
use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleDef {
    pub name: String,
    pub nodes: Vec<NodeDef>,
    pub beams: Vec<BeamDef>,
    pub shocks: Vec<ShockDef>,
    pub triggers: Vec<TriggerDef>,
    pub hydros: Vec<HydroDef>,
    pub commands: Vec<CommandDef>,
    pub rotators: Vec<RotatorDef>,
    pub rigidifiers: Vec<RigidifierDef>,
    /// Collision triangles as node index triples.
    pub cabs: Vec<[usize; 3]>,
    pub collision_range: f32,
    pub wheels: Vec<WheelDef>,
    pub axles: Vec<AxleDef>,
    pub engine: Option<EngineDef>,
    pub brakes: BrakesDef,
    pub cruise: CruiseDef,
    pub stabilizer: Option<StabilizerDef>,
    pub hooks: Vec<HookDef>,
    pub ties: Vec<TieDef>,
    pub ropes: Vec<RopeDef>,
    pub ropables: Vec<RopableDef>,
    pub rails: Vec<RailDef>,
    pub slide_nodes: Vec<SlideNodeDef>,
}

impl Default for VehicleDef {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            nodes: Vec::new(),
            beams: Vec::new(),
            shocks: Vec::new(),
            triggers: Vec::new(),
            hydros: Vec::new(),
            commands: Vec::new(),
            rotators: Vec::new(),
            rigidifiers: Vec::new(),
            cabs: Vec::new(),
            collision_range: DEFAULT_COLLISION_RANGE,
            wheels: Vec::new(),
            axles: Vec::new(),
            engine: None,
            brakes: BrakesDef::default(),
            cruise: CruiseDef::default(),
            stabilizer: None,
            hooks: Vec::new(),
            ties: Vec::new(),
            ropes: Vec::new(),
            ropables: Vec::new(),
            rails: Vec::new(),
            slide_nodes: Vec::new(),
        }
    }
}

impl VehicleDef {
    pub fn from_ron(text: &str) -> Result<Self, SimError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimError::construction(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_ron(&text)
    }

    pub fn to_ron(&self) -> Result<String, SimError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SimError::construction(format!("cannot serialize description: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDef {
    pub position: [f32; 3],
    pub mass: f32,
    pub contacter: bool,
    pub contactless: bool,
    /// Held in place, never integrated.
    pub locked: bool,
    pub lock_group: i32,
    pub friction_coef: f32,
    pub surface_coef: f32,
    pub volume_coef: f32,
    pub buoyancy: f32,
}

impl Default for NodeDef {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            mass: 10.0,
            contacter: false,
            contactless: false,
            locked: false,
            lock_group: NODE_LOCKGROUP_DEFAULT,
            friction_coef: 1.0,
            surface_coef: 1.0,
            volume_coef: 1.0,
            buoyancy: 0.0,
        }
    }
}

impl NodeDef {
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamDef {
    pub nodes: [usize; 2],
    pub spring: f32,
    pub damp: f32,
    pub deform: f32,
    pub strength: f32,
    pub plastic_coef: f32,
    pub bounded: BoundedKind,
    pub kind: BeamKind,
    pub short_bound: f32,
    /// Support beams: break limit as a multiple of the rest length.
    pub long_bound: f32,
    /// Rest length; the node distance when absent.
    pub length: Option<f32>,
    pub detacher_group: i32,
    pub disabled: bool,
}

impl Default for BeamDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0],
            spring: DEFAULT_SPRING,
            damp: DEFAULT_DAMP,
            deform: BEAM_DEFORM,
            strength: BEAM_BREAK,
            plastic_coef: 0.0,
            bounded: BoundedKind::Normal,
            kind: BeamKind::Normal,
            short_bound: 0.0,
            long_bound: 0.0,
            length: None,
            detacher_group: 0,
            disabled: false,
        }
    }
}

impl BeamDef {
    pub fn between(a: usize, b: usize) -> Self {
        Self {
            nodes: [a, b],
            ..Self::default()
        }
    }
}

/// Which way an active stabiliser shock moves with a positive ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockSide {
    #[default]
    Passive,
    Left,
    Right,
}

/// In/out curves of a progressive shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressiveDef {
    pub spring_in: f32,
    pub damp_in: f32,
    pub progress_spring_in: f32,
    pub progress_damp_in: f32,
    pub spring_out: f32,
    pub damp_out: f32,
    pub progress_spring_out: f32,
    pub progress_damp_out: f32,
}

impl Default for ProgressiveDef {
    fn default() -> Self {
        Self {
            spring_in: 100_000.0,
            damp_in: 5_000.0,
            progress_spring_in: 0.0,
            progress_damp_in: 0.0,
            spring_out: 100_000.0,
            damp_out: 5_000.0,
            progress_spring_out: 0.0,
            progress_damp_out: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShockDef {
    pub nodes: [usize; 2],
    pub spring: f32,
    pub damp: f32,
    pub short_bound: f32,
    pub long_bound: f32,
    /// Rest length as a fraction of the node distance.
    pub precompression: f32,
    /// Present for shock-2 curves; shock-1 blending otherwise.
    pub progressive: Option<ProgressiveDef>,
    pub soft_bump: bool,
    /// Bottom-stop stiffness past the bounds.
    pub hard_stop: bool,
    pub side: ShockSide,
    pub stop_spring: Option<f32>,
    pub stop_damp: Option<f32>,
    pub detacher_group: i32,
}

impl Default for ShockDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0],
            spring: 100_000.0,
            damp: 5_000.0,
            short_bound: 0.1,
            long_bound: 0.1,
            precompression: 1.0,
            progressive: None,
            soft_bump: false,
            hard_stop: true,
            side: ShockSide::Passive,
            stop_spring: None,
            stop_damp: None,
            detacher_group: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOption {
    /// Disables the following triggers while outside its bounds.
    Blocker,
    /// Enables the following triggers while outside its bounds.
    InvertedBlocker,
    CmdBlocker,
    CmdSwitch,
    HookLock,
    HookUnlock,
    Engine,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerDef {
    pub nodes: [usize; 2],
    /// Contraction limit as a fraction of the rest length.
    pub short_bound: f32,
    /// Expansion limit as a fraction of the rest length.
    pub long_bound: f32,
    pub cmd_short: i32,
    pub cmd_long: i32,
    pub boundary_time: f32,
    pub options: Vec<TriggerOption>,
    pub start_disabled: bool,
}

impl Default for TriggerDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0],
            short_bound: 0.1,
            long_bound: 0.1,
            cmd_short: 1,
            cmd_long: -1,
            boundary_time: 1.0,
            options: Vec::new(),
            start_disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertiaDef {
    pub start_delay: f32,
    pub stop_delay: f32,
    pub start_function: String,
    pub stop_function: String,
}

impl Default for InertiaDef {
    fn default() -> Self {
        Self {
            start_delay: 1.0,
            stop_delay: 1.0,
            start_function: "linear".to_string(),
            stop_function: "linear".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydroInput {
    Dir,
    SpeedDir,
    Aileron,
    Rudder,
    Elevator,
    InvAileron,
    InvRudder,
    InvElevator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydroDef {
    pub nodes: [usize; 2],
    /// Length change per unit of control state.
    pub ratio: f32,
    pub inputs: Vec<HydroInput>,
    /// Clamp the length factor to `[1 - short_bound, 1 + long_bound]`.
    pub bounds: Option<(f32, f32)>,
    pub spring: f32,
    pub damp: f32,
    pub inertia: Option<InertiaDef>,
}

impl Default for HydroDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0],
            ratio: 0.1,
            inputs: vec![HydroInput::Dir],
            bounds: None,
            spring: DEFAULT_SPRING,
            damp: DEFAULT_DAMP,
            inertia: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressMode {
    /// Moves while the key is held.
    #[default]
    Hold,
    /// One press starts the motion, the next stops it.
    OnePress,
    /// One press starts the motion; it stops at the centre length.
    OnePressCenter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDef {
    pub nodes: [usize; 2],
    /// Contraction rate, m/s.
    pub rate_short: f32,
    /// Extension rate, m/s.
    pub rate_long: f32,
    /// Shortest length as a fraction of the spawn length.
    pub short_bound: f32,
    pub long_bound: f32,
    pub key_short: usize,
    pub key_long: usize,
    pub engine_coupling: f32,
    pub needs_engine: bool,
    pub force_restricted: bool,
    pub centering: bool,
    pub press_mode: PressMode,
    pub spring: f32,
    pub damp: f32,
    pub inertia: Option<InertiaDef>,
}

impl Default for CommandDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0],
            rate_short: 0.5,
            rate_long: 0.5,
            short_bound: 0.5,
            long_bound: 1.5,
            key_short: 1,
            key_long: 2,
            engine_coupling: 1.0,
            needs_engine: false,
            force_restricted: false,
            centering: false,
            press_mode: PressMode::Hold,
            spring: DEFAULT_SPRING,
            damp: DEFAULT_DAMP,
            inertia: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorDef {
    pub axis: [usize; 2],
    /// Four nodes of the fixed plate.
    pub base_plate: [usize; 4],
    /// Four nodes of the rotating plate.
    pub rotating_plate: [usize; 4],
    /// Radians per second at full command.
    pub rate: f32,
    pub key_left: usize,
    pub key_right: usize,
    pub force: f32,
    /// Arms shorter than this exert no force.
    pub tolerance: f32,
    pub engine_coupling: f32,
    pub needs_engine: bool,
}

impl Default for RotatorDef {
    fn default() -> Self {
        Self {
            axis: [0, 0],
            base_plate: [0; 4],
            rotating_plate: [0; 4],
            rate: 1.0,
            key_left: 1,
            key_right: 2,
            force: 10_000_000.0,
            tolerance: 0.0,
            engine_coupling: 1.0,
            needs_engine: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidifierDef {
    pub nodes: [usize; 3],
    pub spring: f32,
    pub damp: f32,
}

impl Default for RigidifierDef {
    fn default() -> Self {
        Self {
            nodes: [0, 0, 0],
            spring: DEFAULT_RIGIDIFIER_SPRING,
            damp: DEFAULT_RIGIDIFIER_DAMP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propulsion {
    #[default]
    None,
    Forward,
    Backward,
}

/// Which brakes act on a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeCombo {
    None,
    #[default]
    FootHand,
    FootHandSkidLeft,
    FootHandSkidRight,
    FootOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelDef {
    /// Axis end nodes; rim nodes are generated around them.
    pub axis: [usize; 2],
    pub radius: f32,
    pub width: f32,
    /// Number of rim node pairs.
    pub rays: usize,
    /// Chassis node carrying the reaction torque.
    pub arm: usize,
    pub mass: f32,
    pub spring: f32,
    pub damp: f32,
    pub propulsion: Propulsion,
    pub braking: BrakeCombo,
    pub detacher_group: i32,
}

impl Default for WheelDef {
    fn default() -> Self {
        Self {
            axis: [0, 0],
            radius: 0.5,
            width: 0.3,
            rays: 12,
            arm: 0,
            mass: 100.0,
            spring: 800_000.0,
            damp: 4_000.0,
            propulsion: Propulsion::None,
            braking: BrakeCombo::FootHand,
            detacher_group: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxleDef {
    pub wheels: [usize; 2],
    pub differentials: Vec<DiffKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CruiseDef {
    /// Lowest target speed, m/s.
    pub lower_limit: f32,
    /// Brake when faster than the target.
    pub can_brake: bool,
    pub speed_limit: Option<f32>,
}

impl Default for CruiseDef {
    fn default() -> Self {
        Self {
            lower_limit: 0.0,
            can_brake: false,
            speed_limit: None,
        }
    }
}

/// Roll reference of the active shock stabiliser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizerDef {
    pub reference: usize,
    pub roll_node: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookDef {
    pub node: usize,
    pub range: f32,
    /// Assistance beam shortening speed, m/s.
    pub speed: f32,
    pub max_force: f32,
    pub group: i32,
    pub lock_group: i32,
    pub auto_lock: bool,
    pub self_lock: bool,
    pub no_disable: bool,
    pub relock_time: f32,
    /// Locked once the assistance beam is shorter than this.
    pub min_length: f32,
    /// Only lock onto ropables instead of any node.
    pub lock_ropables: bool,
}

impl Default for HookDef {
    fn default() -> Self {
        Self {
            node: 0,
            range: HOOK_RANGE_DEFAULT,
            speed: HOOK_SPEED_DEFAULT,
            max_force: HOOK_FORCE_DEFAULT,
            group: -1,
            lock_group: NODE_LOCKGROUP_DEFAULT,
            auto_lock: false,
            self_lock: false,
            no_disable: false,
            relock_time: HOOK_LOCK_TIMER_DEFAULT,
            min_length: 0.0,
            lock_ropables: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieDef {
    pub node: usize,
    /// Search radius; also the initial tie length.
    pub max_length: f32,
    /// Shortening rate, m/s.
    pub rate: f32,
    /// Stop tying below this fraction of the initial length.
    pub min_length: f32,
    pub max_stress: f32,
    pub group: i32,
    pub no_self_lock: bool,
}

impl Default for TieDef {
    fn default() -> Self {
        Self {
            node: 0,
            max_length: 5.0,
            rate: 0.5,
            min_length: 0.1,
            max_stress: 100_000.0,
            group: -1,
            no_self_lock: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RopeDef {
    /// Fixed end on this vehicle.
    pub root: usize,
    /// Free end, moved onto the peer when locked.
    pub end: usize,
    pub group: i32,
}

impl Default for RopeDef {
    fn default() -> Self {
        Self {
            root: 0,
            end: 0,
            group: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RopableDef {
    pub node: usize,
    pub group: i32,
    pub multilock: bool,
}

impl Default for RopableDef {
    fn default() -> Self {
        Self {
            node: 0,
            group: -1,
            multilock: false,
        }
    }
}

/// Polyline of node indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailDef {
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideNodeDef {
    pub node: usize,
    /// Rail attached at spawn.
    pub rail: Option<usize>,
    pub spring: f32,
    pub damp: f32,
    pub break_force: Option<f32>,
    pub tolerance: f32,
    pub attach_rate: f32,
    pub attach_distance: f32,
    pub attach_foreign: bool,
    pub attach_self: bool,
}

impl Default for SlideNodeDef {
    fn default() -> Self {
        Self {
            node: 0,
            rail: None,
            spring: DEFAULT_SPRING,
            damp: 0.0,
            break_force: None,
            tolerance: 0.0,
            attach_rate: 1.0,
            attach_distance: 0.1,
            attach_foreign: false,
            attach_self: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_ron_uses_defaults() {
        let text = r#"(
            name: "pair",
            nodes: [(position: (0.0, 0.0, 0.0)), (position: (1.0, 0.0, 0.0), mass: 5.0)],
            beams: [(nodes: (0, 1), bounded: rope)],
        )"#;
        let def = VehicleDef::from_ron(text).unwrap();
        assert_eq!(def.name, "pair");
        assert_eq!(def.nodes[0].mass, 10.0);
        assert_eq!(def.nodes[1].mass, 5.0);
        assert_eq!(def.beams[0].bounded, BoundedKind::Rope);
        assert_eq!(def.beams[0].spring, DEFAULT_SPRING);
        assert_eq!(def.collision_range, DEFAULT_COLLISION_RANGE);
    }

    #[test]
    fn test_ron_roundtrip() {
        let mut def = VehicleDef::default();
        def.nodes.push(NodeDef::at(0.0, 1.0, 0.0));
        def.nodes.push(NodeDef::at(0.0, 2.0, 0.0));
        def.beams.push(BeamDef::between(0, 1));
        def.hooks.push(HookDef::default());
        def.engine = Some(EngineDef::default());
        let text = def.to_ron().unwrap();
        assert_eq!(VehicleDef::from_ron(&text).unwrap(), def);
    }

    #[test]
    fn test_bad_ron_is_description_error() {
        let err = VehicleDef::from_ron("(nodes: [").unwrap_err();
        assert!(matches!(err, SimError::Description(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.ron");
        std::fs::write(&path, "(name: \"file\")").unwrap();
        assert_eq!(VehicleDef::load(&path).unwrap().name, "file");
        assert!(VehicleDef::load(&dir.path().join("missing.ron")).is_err());
    }
}
