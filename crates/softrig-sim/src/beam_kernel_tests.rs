use glam::Vec3;

use super::*;
use crate::builder::build_vehicle;
use crate::constants::BEAM_DEFORM;
use crate::context::SimContext;
use crate::def::{BeamDef, NodeDef, VehicleDef, WheelDef};
use crate::ids::VehicleId;

const DT: f32 = 0.0005;

fn rod(beam: BeamDef) -> Vehicle {
    let def = VehicleDef {
        nodes: vec![NodeDef::at(0.0, 1.0, 0.0), NodeDef::at(1.0, 1.0, 0.0)],
        beams: vec![BeamDef { nodes: [0, 1], ..beam }],
        ..VehicleDef::default()
    };
    build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid rod")
}

fn stretch(v: &mut Vehicle, by: f32) {
    v.nodes[1].rel_pos.x += by;
    v.nodes[1].abs_pos.x += by;
}

fn clear_forces(v: &mut Vehicle) {
    for n in &mut v.nodes {
        n.forces = Vec3::ZERO;
    }
}

fn broken_beams(v: &Vehicle) -> Vec<usize> {
    v.events
        .iter()
        .filter_map(|e| match e {
            SimEvent::BeamBroken { beam, .. } => Some(*beam),
            _ => None,
        })
        .collect()
}

#[test]
fn test_spring_pulls_stretched_ends_together() {
    let mut v = rod(BeamDef::default());
    stretch(&mut v, 0.01);
    clear_forces(&mut v);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    let f0 = v.nodes[0].forces;
    let f1 = v.nodes[1].forces;
    assert!(f0.x > 0.0, "node 0 pulled towards +x, got {f0}");
    assert!((f0 + f1).length() < 1e-3, "forces are equal and opposite");
    assert!(v.beams[0].stress < 0.0);
}

#[test]
fn test_slack_rope_carries_no_force() {
    let mut v = rod(BeamDef {
        bounded: BoundedKind::Rope,
        ..BeamDef::default()
    });
    stretch(&mut v, -0.3);
    clear_forces(&mut v);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert_eq!(v.nodes[0].forces, Vec3::ZERO);
    assert_eq!(v.beams[0].stress, 0.0);
}

#[test]
fn test_support_beam_breaks_past_limit() {
    let mut v = rod(BeamDef {
        bounded: BoundedKind::Support,
        long_bound: 2.0,
        ..BeamDef::default()
    });
    stretch(&mut v, 1.5);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert!(!v.beams[0].broken);

    stretch(&mut v, 1.0);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert!(v.beams[0].broken);
    assert_eq!(broken_beams(&v), vec![0]);
}

#[test]
fn test_broken_beam_exerts_nothing() {
    let mut v = rod(BeamDef::default());
    v.beams[0].break_beam();
    stretch(&mut v, 0.2);
    clear_forces(&mut v);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert_eq!(v.nodes[0].forces, Vec3::ZERO);
    assert_eq!(v.nodes[1].forces, Vec3::ZERO);
}

#[test]
fn test_compression_deforms_rest_length() {
    let mut v = rod(BeamDef::default());
    stretch(&mut v, -0.1);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    let beam = &v.beams[0];
    assert!(!beam.broken);
    assert!(beam.length < 1.0 && beam.length > 0.9, "length {}", beam.length);
    assert!(beam.max_pos_stress > BEAM_DEFORM);
    assert_eq!(v.deformed, vec![0]);
    assert!(v.increased_accuracy);
}

#[test]
fn test_overstretch_breaks_with_zero_force() {
    let mut v = rod(BeamDef::default());
    stretch(&mut v, 0.5);
    clear_forces(&mut v);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert!(v.beams[0].broken);
    assert_eq!(v.nodes[0].forces, Vec3::ZERO);
    assert!(v.nodes[0].skin && v.nodes[1].skin);
}

#[test]
fn test_contacter_end_holds_overloaded_beam() {
    let mut v = rod(BeamDef::default());
    v.nodes[1].contacter = true;
    stretch(&mut v, 0.5);
    v.calc_beams(DT, true, &PhysicsSettings::default());
    assert!(!v.beams[0].broken);
    assert!(broken_beams(&v).is_empty());
}

#[test]
fn test_detacher_group_cascades_to_beams_and_wheels() {
    let def = VehicleDef {
        nodes: vec![
            NodeDef::at(0.0, 1.0, 0.0),
            NodeDef::at(1.0, 1.0, 0.0),
            NodeDef::at(0.0, 2.0, 0.0),
            NodeDef::at(0.0, 1.0, 1.0),
        ],
        beams: vec![
            BeamDef {
                detacher_group: 2,
                ..BeamDef::between(0, 1)
            },
            BeamDef::between(0, 2),
            BeamDef {
                detacher_group: -2,
                ..BeamDef::between(2, 1)
            },
            BeamDef {
                detacher_group: 3,
                ..BeamDef::between(1, 3)
            },
        ],
        wheels: vec![WheelDef {
            axis: [0, 3],
            arm: 2,
            detacher_group: 2,
            ..WheelDef::default()
        }],
        ..VehicleDef::default()
    };
    let mut v = build_vehicle(VehicleId(1), &def, Vec3::ZERO, &SimContext::default()).expect("valid");
    v.events.clear();

    v.break_with_cascade(0, &PhysicsSettings::default());
    assert!(v.beams[0].broken);
    assert!(!v.beams[1].broken);
    assert!(v.beams[2].broken, "negative member of the group goes with it");
    assert!(!v.beams[3].broken);
    assert!(v.wheels[0].detached);
    let broken = broken_beams(&v);
    assert_eq!(&broken[..2], &[0, 2]);
    assert!(!broken.contains(&1) && !broken.contains(&3));
    assert!(v.events.contains(&SimEvent::WheelDetached {
        vehicle: VehicleId(1),
        wheel: 0
    }));
}

#[test]
fn test_negative_group_does_not_trigger_cascade() {
    let def = VehicleDef {
        nodes: vec![NodeDef::at(0.0, 0.0, 0.0), NodeDef::at(1.0, 0.0, 0.0), NodeDef::at(0.0, 1.0, 0.0)],
        beams: vec![
            BeamDef {
                detacher_group: -4,
                ..BeamDef::between(0, 1)
            },
            BeamDef {
                detacher_group: 4,
                ..BeamDef::between(1, 2)
            },
        ],
        ..VehicleDef::default()
    };
    let mut v = build_vehicle(VehicleId(2), &def, Vec3::ZERO, &SimContext::default()).expect("valid");
    v.break_with_cascade(0, &PhysicsSettings::default());
    assert!(v.beams[0].broken);
    assert!(!v.beams[1].broken);
}
