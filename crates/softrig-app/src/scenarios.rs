//! Built-in demonstration rigs selectable with `--scenario`.

use std::str::FromStr;

use glam::Vec3;
use softrig_sim::brakes::{AntiLockDef, BrakesDef};
use softrig_sim::def::{BeamDef, HookDef, NodeDef, VehicleDef, WheelDef};
use softrig_sim::{
    BoundedKind, BounceFilter, CouplerRequest, HookMode, InputEvent, ScriptedInput, SimError, Simulation,
    VehicleId,
};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// A braced cube dropped from 10 m.
    Cube,
    /// A rope pulled past its strength.
    Rope,
    /// A chain whose first link takes its detacher group with it.
    Detacher,
    /// One vehicle hooking a neighbour and pulling it in.
    Hook,
    /// A braked wheel rig with anti-lock brakes at 20 m/s.
    Abs,
}

impl FromStr for Scenario {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cube" => Ok(Self::Cube),
            "rope" => Ok(Self::Rope),
            "detacher" => Ok(Self::Detacher),
            "hook" => Ok(Self::Hook),
            "abs" => Ok(Self::Abs),
            _ => Err(AppError::UnknownScenario(s.to_string())),
        }
    }
}

fn braced(name: &str, nodes: Vec<NodeDef>) -> VehicleDef {
    let mut beams = Vec::new();
    for a in 0..nodes.len() {
        for b in (a + 1)..nodes.len() {
            beams.push(BeamDef::between(a, b));
        }
    }
    VehicleDef {
        name: name.to_string(),
        nodes,
        beams,
        ..VehicleDef::default()
    }
}

pub fn cube() -> VehicleDef {
    let nodes = (0..8)
        .map(|i| {
            let bit = |b: usize| if i & b != 0 { 1.0 } else { 0.0 };
            NodeDef::at(bit(1), bit(2), bit(4))
        })
        .collect();
    braced("cube", nodes)
}

fn anchored(x: f32) -> NodeDef {
    NodeDef {
        locked: true,
        ..NodeDef::at(x, 0.0, 0.0)
    }
}

pub fn rope() -> VehicleDef {
    VehicleDef {
        name: "rope".to_string(),
        nodes: vec![anchored(0.0), NodeDef::at(1.0, 0.0, 0.0)],
        beams: vec![BeamDef {
            bounded: BoundedKind::Rope,
            strength: 1_000.0,
            ..BeamDef::between(0, 1)
        }],
        ..VehicleDef::default()
    }
}

pub fn detacher_chain() -> VehicleDef {
    VehicleDef {
        name: "chain".to_string(),
        nodes: vec![
            anchored(0.0),
            NodeDef::at(1.0, 0.0, 0.0),
            NodeDef::at(2.0, 0.0, 0.0),
            NodeDef::at(3.0, 0.0, 0.0),
        ],
        beams: vec![
            BeamDef {
                strength: 1_000.0,
                detacher_group: 3,
                ..BeamDef::between(0, 1)
            },
            BeamDef {
                detacher_group: -3,
                ..BeamDef::between(1, 2)
            },
            BeamDef::between(2, 3),
        ],
        ..VehicleDef::default()
    }
}

pub fn tetrahedron(name: &str) -> VehicleDef {
    braced(
        name,
        vec![
            NodeDef::at(0.0, 0.0, 0.0),
            NodeDef::at(1.0, 0.0, 0.0),
            NodeDef::at(0.0, 1.0, 0.0),
            NodeDef::at(0.0, 0.0, 1.0),
        ],
    )
}

pub fn wheel_rig() -> VehicleDef {
    let heavy = |x, y, z| NodeDef {
        mass: 250.0,
        ..NodeDef::at(x, y, z)
    };
    VehicleDef {
        wheels: vec![WheelDef {
            axis: [0, 1],
            arm: 2,
            rays: 8,
            ..WheelDef::default()
        }],
        brakes: BrakesDef {
            antilock: Some(AntiLockDef {
                ratio: 2.0,
                pulse_per_sec: 8.0,
                ..AntiLockDef::default()
            }),
            ..BrakesDef::default()
        },
        ..braced(
            "wheel-rig",
            vec![
                heavy(0.0, 0.0, -0.15),
                heavy(0.0, 0.0, 0.15),
                heavy(1.0, 0.0, 0.0),
                heavy(0.5, 0.5, 0.0),
            ],
        )
    }
}

/// Spawned vehicles plus the per-frame inputs a scenario keeps applying.
#[derive(Debug)]
pub struct Driver {
    scenario: Option<Scenario>,
    vehicles: Vec<VehicleId>,
    input: ScriptedInput,
    bounce: BounceFilter,
}

impl Driver {
    /// Inputs for vehicles spawned from files only.
    pub fn passive(vehicles: Vec<VehicleId>) -> Self {
        Self {
            scenario: None,
            vehicles,
            input: ScriptedInput::new(),
            bounce: BounceFilter::new(0.2),
        }
    }

    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// Track a vehicle spawned outside the scenario; it receives no input.
    pub fn add_vehicle(&mut self, id: VehicleId) {
        self.vehicles.push(id);
    }

    /// Spawn the rigs of `scenario` and set their initial conditions.
    pub fn setup(scenario: Scenario, sim: &mut Simulation) -> Result<Self, SimError> {
        let bounce = BounceFilter::new(sim.context().settings.bounce_dead_time);
        let mut input = ScriptedInput::new();
        let vehicles = match scenario {
            Scenario::Cube => vec![sim.spawn(&cube(), Vec3::new(0.0, 10.0, 0.0))?],
            Scenario::Rope => vec![sim.spawn(&rope(), Vec3::new(0.0, 5.0, 0.0))?],
            Scenario::Detacher => vec![sim.spawn(&detacher_chain(), Vec3::new(0.0, 5.0, 0.0))?],
            Scenario::Hook => {
                let mut towing = tetrahedron("towing");
                towing.hooks.push(HookDef {
                    node: 1,
                    range: 0.5,
                    speed: 0.1,
                    min_length: 0.2,
                    ..HookDef::default()
                });
                let a = sim.spawn(&towing, Vec3::new(0.0, 0.05, 0.0))?;
                let b = sim.spawn(&tetrahedron("towed"), Vec3::new(1.3, 0.05, 0.0))?;
                sim.set_focus(Some(a))?;
                sim.queue_coupler(
                    a,
                    CouplerRequest::Hook {
                        group: -1,
                        mode: HookMode::Lock,
                    },
                )?;
                vec![a, b]
            }
            Scenario::Abs => {
                let id = sim.spawn(&wheel_rig(), Vec3::new(0.0, 0.55, 0.0))?;
                sim.set_focus(Some(id))?;
                sim.with_vehicle_mut(id, |v| {
                    let chassis = Vec3::new(20.0, 0.0, 0.0);
                    v.set_velocity(chassis);
                    let wheel = v.wheels()[0].clone();
                    let radius = wheel.radius;
                    let axis = (v.nodes()[wheel.axis[1]].abs_pos - v.nodes()[wheel.axis[0]].abs_pos).normalize();
                    // rolling without slip
                    for (k, &rim) in wheel.rim.iter().enumerate() {
                        let arm = v.nodes()[rim].abs_pos - v.nodes()[wheel.axis[k % 2]].abs_pos;
                        let spin = axis.cross(arm).normalize() * (chassis.length() * arm.length() / radius);
                        v.set_node_velocity(rim, chassis - spin);
                    }
                })?;
                input.set(InputEvent::Brake, 1.0);
                vec![id]
            }
        };
        Ok(Self {
            scenario: Some(scenario),
            vehicles,
            input,
            bounce,
        })
    }

    /// Apply this frame's scripted inputs. Pulls land on the first sub-step
    /// of the next frame only.
    pub fn drive(&mut self, sim: &mut Simulation) -> Result<(), SimError> {
        let now = sim.time();
        match (self.scenario, self.vehicles.first()) {
            (Some(Scenario::Rope), Some(&id)) => sim.add_external_force(id, 1, Vec3::new(20_000.0, 0.0, 0.0)),
            (Some(Scenario::Detacher), Some(&id)) => sim.add_external_force(id, 1, Vec3::new(50_000.0, 0.0, 0.0)),
            (Some(Scenario::Abs), Some(&id)) => sim.apply_input(id, &self.input, &mut self.bounce, now),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use softrig_sim::{SimContext, WorkerPool};

    use super::*;

    fn sim() -> Simulation {
        Simulation::with_pool(SimContext::default(), WorkerPool::inline())
    }

    #[test]
    fn test_scenario_names() {
        assert_eq!("Hook".parse::<Scenario>().unwrap(), Scenario::Hook);
        assert_eq!(" abs ".parse::<Scenario>().unwrap(), Scenario::Abs);
        assert!(matches!("lava".parse::<Scenario>(), Err(AppError::UnknownScenario(_))));
    }

    #[test]
    fn test_every_scenario_spawns() {
        for scenario in [
            Scenario::Cube,
            Scenario::Rope,
            Scenario::Detacher,
            Scenario::Hook,
            Scenario::Abs,
        ] {
            let mut sim = sim();
            let driver = Driver::setup(scenario, &mut sim).unwrap();
            assert!(!driver.vehicles().is_empty());
            assert_eq!(sim.vehicle_count(), driver.vehicles().len());
        }
    }

    #[test]
    fn test_rope_scenario_breaks_the_rope() {
        let mut sim = sim();
        let mut driver = Driver::setup(Scenario::Rope, &mut sim).unwrap();
        for _ in 0..10 {
            driver.drive(&mut sim).unwrap();
            sim.step(0.0005);
        }
        let id = driver.vehicles()[0];
        assert!(sim.with_vehicle(id, |v| v.beams()[0].broken).unwrap());
    }

    #[test]
    fn test_abs_scenario_holds_the_brake() {
        let mut sim = sim();
        let mut driver = Driver::setup(Scenario::Abs, &mut sim).unwrap();
        driver.drive(&mut sim).unwrap();
        let id = driver.vehicles()[0];
        let brake = sim.with_vehicle(id, |v| v.brakes().brake).unwrap();
        assert_eq!(brake, BrakesDef::default().brake_force);
    }
}
