//! End-to-end scenarios driven through the public `Simulation` API on a
//! flat terrain.

use std::collections::HashMap;

use glam::Vec3;
use softrig_sim::brakes::{AntiLockDef, BrakesDef};
use softrig_sim::constants::PHYSICS_DT;
use softrig_sim::def::{BeamDef, HookDef, NodeDef, VehicleDef, WheelDef};
use softrig_sim::{
    BoundedKind, CouplerRequest, HookMode, HookState, PhysicsSettings, SimContext, SimEvent, Simulation,
    Vehicle, VehicleId, WorkerPool,
};

/// Unit cube with its 12 edges and 12 face diagonals.
fn cube() -> VehicleDef {
    let nodes = (0..8)
        .map(|i| {
            let bit = |b: usize| if i & b != 0 { 1.0 } else { 0.0 };
            NodeDef::at(bit(1), bit(2), bit(4))
        })
        .collect();
    let mut beams = Vec::new();
    for a in 0..8usize {
        for b in (a + 1)..8 {
            if (a ^ b).count_ones() <= 2 {
                beams.push(BeamDef::between(a, b));
            }
        }
    }
    VehicleDef {
        name: "cube".to_string(),
        nodes,
        beams,
        ..VehicleDef::default()
    }
}

fn settings() -> PhysicsSettings {
    PhysicsSettings {
        disable_drag: true,
        ..PhysicsSettings::default()
    }
}

fn sim(gravity: f32, settings: PhysicsSettings) -> Simulation {
    let ctx = SimContext::default().with_gravity(gravity).with_settings(settings);
    Simulation::with_pool(ctx, WorkerPool::inline())
}

/// A frame length that runs exactly `n` sub-steps.
fn frame_of(n: u32) -> f32 {
    PHYSICS_DT * (n as f32 - 0.5)
}

fn extent(v: &Vehicle) -> Vec3 {
    let (min, max) = v.nodes().iter().fold((Vec3::MAX, Vec3::MIN), |(lo, hi), n| {
        (lo.min(n.abs_pos), hi.max(n.abs_pos))
    });
    max - min
}

fn positions(sim: &Simulation, id: VehicleId) -> Vec<Vec3> {
    sim.with_vehicle(id, |v| v.nodes().iter().map(|n| n.abs_pos).collect())
        .expect("vehicle exists")
}

#[test]
fn test_free_fall_cube() {
    let mut sim = sim(-9.81, settings());
    let id = sim.spawn(&cube(), Vec3::new(0.0, 10.0, 0.0)).unwrap();
    let (start, size) = sim.with_vehicle(id, |v| (v.center_of_mass(), extent(v))).unwrap();

    let frame = frame_of(100);
    for _ in 0..20 {
        assert_eq!(sim.step(frame), 100);
    }
    assert!((sim.time() - 1.0).abs() < 1e-4);

    sim.with_vehicle(id, |v| {
        let fallen = start.y - v.center_of_mass().y;
        assert!((fallen - 4.905).abs() < 0.05, "fell {fallen}");
        assert!(v.beams().iter().all(|b| !b.broken));
        let drift = (extent(v) - size).abs().max_element();
        assert!(drift < 0.01, "cube deformed by {drift}");
    })
    .unwrap();
}

#[test]
fn test_overloaded_rope_breaks() {
    let def = VehicleDef {
        name: "rope".to_string(),
        nodes: vec![
            NodeDef {
                locked: true,
                ..NodeDef::at(0.0, 0.0, 0.0)
            },
            NodeDef::at(1.0, 0.0, 0.0),
        ],
        beams: vec![BeamDef {
            bounded: BoundedKind::Rope,
            strength: 1_000.0,
            ..BeamDef::between(0, 1)
        }],
        ..VehicleDef::default()
    };
    let mut sim = sim(0.0, settings());
    let id = sim.spawn(&def, Vec3::new(0.0, 5.0, 0.0)).unwrap();

    let pull = Vec3::new(2_000.0, 0.0, 0.0);
    let mut broke_at = None;
    for substep in 1..=10 {
        sim.add_external_force(id, 1, pull).unwrap();
        sim.step(PHYSICS_DT);
        if sim.with_vehicle(id, |v| v.beams()[0].broken).unwrap() {
            broke_at = Some(substep);
            break;
        }
    }
    let broke_at = broke_at.expect("rope never broke");
    // The pull moves the node during the first sub-step; the beam only sees
    // the stretch on the next one.
    assert!(broke_at <= 2, "broke after {broke_at} sub-steps");

    let speed = sim.with_vehicle(id, |v| v.nodes()[1].velocity.x).unwrap();
    for _ in 0..10 {
        sim.add_external_force(id, 1, pull).unwrap();
        sim.step(PHYSICS_DT);
    }
    sim.with_vehicle(id, |v| {
        let beam = &v.beams()[0];
        assert!(beam.broken && beam.disabled);
        assert_eq!(beam.stress, 0.0);
        // free node now takes the full pull: 2000 N on 10 kg for 10 sub-steps
        let gained = v.nodes()[1].velocity.x - speed;
        assert!((gained - 200.0 * 10.0 * PHYSICS_DT).abs() < 1e-3, "gained {gained}");
        assert_eq!(v.nodes()[0].abs_pos, Vec3::new(0.0, 5.0, 0.0));
    })
    .unwrap();
    let broken: Vec<_> = sim
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::BeamBroken { .. }))
        .collect();
    assert_eq!(broken, vec![SimEvent::BeamBroken { vehicle: id, beam: 0 }]);
}

#[test]
fn test_detacher_group_breaks_together() {
    let def = VehicleDef {
        name: "chain".to_string(),
        nodes: vec![
            NodeDef {
                locked: true,
                ..NodeDef::at(0.0, 0.0, 0.0)
            },
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
    };
    let mut sim = sim(0.0, settings());
    let id = sim.spawn(&def, Vec3::new(0.0, 5.0, 0.0)).unwrap();

    let mut broke = false;
    for _ in 0..10 {
        sim.add_external_force(id, 1, Vec3::new(5_000.0, 0.0, 0.0)).unwrap();
        sim.step(PHYSICS_DT);
        let state: Vec<bool> = sim.with_vehicle(id, |v| v.beams().iter().map(|b| b.broken).collect()).unwrap();
        if state[0] {
            assert_eq!(state, vec![true, true, false]);
            broke = true;
            break;
        }
        assert_eq!(state, vec![false, false, false]);
    }
    assert!(broke, "first beam never broke");
}

fn tetrahedron(name: &str) -> VehicleDef {
    let nodes = vec![
        NodeDef::at(0.0, 0.0, 0.0),
        NodeDef::at(1.0, 0.0, 0.0),
        NodeDef::at(0.0, 1.0, 0.0),
        NodeDef::at(0.0, 0.0, 1.0),
    ];
    let mut beams = Vec::new();
    for a in 0..4 {
        for b in (a + 1)..4 {
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

#[test]
fn test_hook_pulls_in_and_locks() {
    let mut towing = tetrahedron("towing");
    towing.hooks.push(HookDef {
        node: 1,
        range: 0.5,
        speed: 0.1,
        min_length: 0.2,
        ..HookDef::default()
    });
    let mut sim = sim(0.0, settings());
    let a = sim.spawn(&towing, Vec3::new(0.0, 2.0, 0.0)).unwrap();
    // node 0 of the towed vehicle sits 0.3 m from the hook node
    let b = sim.spawn(&tetrahedron("towed"), Vec3::new(1.3, 2.0, 0.0)).unwrap();
    sim.set_focus(Some(a)).unwrap();
    sim.queue_coupler(
        a,
        CouplerRequest::Hook {
            group: -1,
            mode: HookMode::Lock,
        },
    )
    .unwrap();

    let hook_state = |sim: &Simulation| sim.with_vehicle(a, |v| v.hooks()[0].state).unwrap();
    // (0.3 - 0.2) / (0.1 * dt) = 2000 sub-steps of pulling
    let frame = frame_of(100);
    for _ in 0..19 {
        sim.step(frame);
    }
    assert_eq!(hook_state(&sim), HookState::PreLock);
    assert_eq!(sim.with_vehicle(a, |v| v.linked().to_vec()).unwrap(), vec![a, b]);

    sim.step(frame);
    sim.step(frame);
    assert_eq!(hook_state(&sim), HookState::Locked);
    assert_eq!(sim.with_vehicle(a, |v| v.linked().to_vec()).unwrap(), vec![a, b]);
    assert_eq!(sim.with_vehicle(b, |v| v.linked().to_vec()).unwrap(), vec![a, b]);
    let locked = sim
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::HookLocked { vehicle, .. } if *vehicle == a))
        .count();
    assert_eq!(locked, 1);

    let gap = sim
        .with_vehicle(a, |v| v.nodes()[1].abs_pos)
        .unwrap()
        .distance(sim.with_vehicle(b, |v| v.nodes()[0].abs_pos).unwrap());
    assert!(gap < 0.3, "hooked nodes still {gap} apart");
}

/// Rigid heavy chassis carrying one free-spinning braked wheel on the z axis.
fn braked_wheel(antilock: Option<AntiLockDef>) -> VehicleDef {
    let heavy = |x, y, z| NodeDef {
        mass: 1_000.0,
        ..NodeDef::at(x, y, z)
    };
    let nodes = vec![
        heavy(0.0, 0.0, -0.15),
        heavy(0.0, 0.0, 0.15),
        heavy(1.0, 0.0, 0.0),
        heavy(0.0, 1.0, 0.0),
    ];
    let mut beams = Vec::new();
    for a in 0..4 {
        for b in (a + 1)..4 {
            beams.push(BeamDef::between(a, b));
        }
    }
    VehicleDef {
        name: "wheel".to_string(),
        nodes,
        beams,
        wheels: vec![WheelDef {
            axis: [0, 1],
            arm: 2,
            rays: 8,
            ..WheelDef::default()
        }],
        brakes: BrakesDef {
            antilock,
            ..BrakesDef::default()
        },
        ..VehicleDef::default()
    }
}

/// Spin the wheel of a 20 m/s chassis at 10 m/s surface speed, hold full
/// brake for `substeps` sub-steps and return the final wheel speed and
/// whether the anti-lock system intervened.
fn brake_run(def: &VehicleDef, substeps: usize) -> (f32, bool) {
    let mut sim = sim(0.0, settings());
    let id = sim.spawn(def, Vec3::new(0.0, 10.0, 0.0)).unwrap();
    let chassis = Vec3::new(20.0, 0.0, 0.0);
    sim.with_vehicle_mut(id, |v| {
        v.set_velocity(chassis);
        let wheel = v.wheels()[0].clone();
        let axis = (v.nodes()[wheel.axis[1]].abs_pos - v.nodes()[wheel.axis[0]].abs_pos).normalize();
        for (k, &rim) in wheel.rim.iter().enumerate() {
            let radius = v.nodes()[rim].abs_pos - v.nodes()[wheel.axis[k % 2]].abs_pos;
            let tangent = axis.cross(radius).normalize();
            v.set_node_velocity(rim, chassis + tangent * 10.0);
        }
        v.brakes_mut().set_pedal(1.0);
    })
    .unwrap();

    let mut intervened = false;
    for _ in 0..substeps {
        sim.step(PHYSICS_DT);
        intervened |= sim.with_vehicle(id, |v| v.brakes().antilock_active()).unwrap();
    }
    (sim.with_vehicle(id, |v| v.wheels()[0].speed).unwrap(), intervened)
}

#[test]
fn test_antilock_pulse_softens_deceleration() {
    let antilock = AntiLockDef {
        ratio: 2.0,
        pulse_per_sec: 8.0,
        ..AntiLockDef::default()
    };
    // one full 8 Hz cycle: a low half followed by a high half
    let substeps = 500;
    let (plain, plain_abs) = brake_run(&braked_wheel(None), substeps);
    let (modulated, modulated_abs) = brake_run(&braked_wheel(Some(antilock)), substeps);

    assert!(!plain_abs);
    assert!(modulated_abs);
    let elapsed = substeps as f32 * PHYSICS_DT;
    let plain_decel = (10.0 - plain.abs()) / elapsed;
    let modulated_decel = (10.0 - modulated.abs()) / elapsed;
    assert!(
        modulated_decel < plain_decel,
        "anti-lock {modulated_decel} m/s2 vs plain {plain_decel} m/s2"
    );
}

#[test]
fn test_replay_playback_is_bit_exact() {
    let settings = PhysicsSettings {
        replay_enabled: true,
        replay_frames: 10_000,
        // record every sub-step
        replay_steps: 0,
        ..settings()
    };
    let mut sim = sim(-9.81, settings);
    let id = sim.spawn(&cube(), Vec3::new(0.0, 10.0, 0.0)).unwrap();

    let mut live: HashMap<u64, Vec<Vec3>> = HashMap::new();
    for _ in 0..10_000 {
        sim.step(PHYSICS_DT);
        let tick = sim.with_vehicle(id, Vehicle::substeps).unwrap();
        live.entry(tick).or_insert_with(|| positions(&sim, id));
    }

    let recorded: Vec<u64> = sim
        .with_vehicle(id, |v| v.replay_buffer().map(|r| r.iter().map(|f| f.tick).collect()))
        .unwrap()
        .expect("replay enabled");
    assert!(recorded.len() > 1000);

    for (offset, tick) in recorded.iter().rev().enumerate() {
        assert!(sim.seek_replay(id, -(offset as isize)).unwrap());
        let expected = live.get(tick).expect("tick observed live");
        assert_eq!(&positions(&sim, id), expected, "tick {tick}");
    }

    // playback suspends the kernels
    let frozen = positions(&sim, id);
    sim.step(frame_of(10));
    assert_eq!(positions(&sim, id), frozen);
    sim.stop_replay(id).unwrap();
    assert!(!sim.with_vehicle(id, Vehicle::is_replaying).unwrap());
}
