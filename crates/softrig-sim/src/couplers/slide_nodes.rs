use glam::Vec3;

use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::ids::VehicleId;
use crate::vehicle::Vehicle;

/// Polyline of nodes a slide-node can ride on.
#[derive(Debug, Clone, PartialEq)]
pub struct Rail {
    pub nodes: Vec<usize>,
}

/// A rail addressed across vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RailRef {
    pub vehicle: VehicleId,
    pub rail: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideNode {
    pub node: usize,
    pub rail: Option<RailRef>,
    pub spring: f32,
    pub damp: f32,
    pub break_force: Option<f32>,
    /// Free play around the rail once settled, metres.
    pub tolerance: f32,
    /// Current free play; starts at the attach distance and decays to
    /// `tolerance`.
    pub threshold: f32,
    pub attach_rate: f32,
    pub attach_distance: f32,
    pub attach_foreign: bool,
    pub attach_self: bool,
    pub broken: bool,
    /// Segment of the rail the node sits on, and the position along it.
    pub segment: usize,
    pub ratio: f32,
}

impl SlideNode {
    pub fn detach(&mut self) {
        self.rail = None;
        self.segment = 0;
        self.ratio = 0.0;
    }

    pub fn is_attached(&self) -> bool {
        self.rail.is_some()
    }
}

/// Closest point of segment `a`-`b` to `p`, as `(point, t)`.
fn closest_on_segment(a: Vec3, b: Vec3, p: Vec3) -> (Vec3, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let t = if len_sq > 0.0 { ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
    (a + ab * t, t)
}

/// Closest segment of `rail` to `p`: `(segment, point, t, distance)`.
fn closest_on_rail(rail: &Rail, nodes: &[crate::node::Node], p: Vec3) -> Option<(usize, Vec3, f32, f32)> {
    rail.nodes
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let (point, t) = closest_on_segment(nodes[w[0]].abs_pos, nodes[w[1]].abs_pos, p);
            (i, point, t, point.distance(p))
        })
        .min_by(|a, b| a.3.total_cmp(&b.3))
}

struct SlideForce {
    owner: VehicleId,
    index: usize,
    rail: RailRef,
    segment: usize,
    ends: [usize; 2],
    t: f32,
    force: Vec3,
}

/// Pull every attached slide-node towards its rail; the rail ends take
/// the reaction.
pub(crate) fn apply_slide_nodes(fleet: &mut Fleet<'_>, dt: f32) {
    let mut forces = Vec::new();
    let mut broken = Vec::new();
    for vehicle in fleet.iter().filter(|v| v.state().is_simulated()) {
        for (index, slide) in vehicle.slide_nodes.iter().enumerate() {
            let Some(rail_ref) = slide.rail else {
                continue;
            };
            let Some(peer) = fleet.get(rail_ref.vehicle) else {
                continue;
            };
            let Some(rail) = peer.rails.get(rail_ref.rail) else {
                continue;
            };
            let node = &vehicle.nodes[slide.node];
            let Some((segment, ideal, t, _)) = closest_on_rail(rail, &peer.nodes, node.abs_pos) else {
                continue;
            };
            let ends = [rail.nodes[segment], rail.nodes[segment + 1]];
            let offset = ideal - node.abs_pos;
            let distance = offset.length();
            let Some(dir) = offset.try_normalize() else {
                forces.push(SlideForce {
                    owner: vehicle.id(),
                    index,
                    rail: rail_ref,
                    segment,
                    ends,
                    t,
                    force: Vec3::ZERO,
                });
                continue;
            };
            let rail_velocity = peer.nodes[ends[0]].velocity.lerp(peer.nodes[ends[1]].velocity, t);
            let closing = (node.velocity - rail_velocity).dot(dir);
            let stretch = (distance - slide.threshold).max(0.0);
            let force = dir * (slide.spring * stretch) - dir * (slide.damp * closing);
            if slide.break_force.is_some_and(|limit| force.length() > limit) {
                broken.push((vehicle.id(), index));
                continue;
            }
            forces.push(SlideForce {
                owner: vehicle.id(),
                index,
                rail: rail_ref,
                segment,
                ends,
                t,
                force,
            });
        }
    }

    for f in forces {
        if let Some(vehicle) = fleet.get_mut(f.owner) {
            let slide = &mut vehicle.slide_nodes[f.index];
            slide.segment = f.segment;
            slide.ratio = f.t;
            slide.threshold = (slide.threshold - slide.attach_rate * dt).max(slide.tolerance);
            let node = slide.node;
            vehicle.nodes[node].forces += f.force;
        }
        if let Some(peer) = fleet.get_mut(f.rail.vehicle) {
            peer.nodes[f.ends[0]].forces -= f.force * (1.0 - f.t);
            peer.nodes[f.ends[1]].forces -= f.force * f.t;
        }
    }

    for (owner, index) in broken {
        if let Some(vehicle) = fleet.get_mut(owner) {
            let slide = &mut vehicle.slide_nodes[index];
            slide.detach();
            slide.broken = true;
            vehicle.couplers_changed = true;
            tracing::debug!(vehicle = %owner, slide_node = index, "slide node broke off its rail");
            vehicle.emit(SimEvent::SlideNodeChanged {
                vehicle: owner,
                slide_node: index,
                attached: false,
            });
        }
    }
}

/// Detach attached slide-nodes of `owner`, or attach free ones to the
/// nearest rail within reach.
pub(crate) fn toggle_slide_nodes(fleet: &mut Fleet<'_>, owner: VehicleId) {
    let Some(vehicle) = fleet.get(owner) else {
        return;
    };
    let mut changes = Vec::new();
    for (index, slide) in vehicle.slide_nodes.iter().enumerate() {
        if slide.is_attached() {
            changes.push((index, None));
            continue;
        }
        let p = vehicle.nodes[slide.node].abs_pos;
        let mut best: Option<(RailRef, f32)> = None;
        for peer in fleet.iter().filter(|v| v.state().is_awake()) {
            let own = peer.id() == owner;
            if (own && !slide.attach_self) || (!own && !slide.attach_foreign) {
                continue;
            }
            for (r, rail) in peer.rails.iter().enumerate() {
                if own && rail.nodes.contains(&slide.node) {
                    continue;
                }
                let Some((_, _, _, distance)) = closest_on_rail(rail, &peer.nodes, p) else {
                    continue;
                };
                if distance <= best.map_or(slide.attach_distance, |b| b.1) {
                    best = Some((RailRef { vehicle: peer.id(), rail: r }, distance));
                }
            }
        }
        if let Some(found) = best {
            changes.push((index, Some(found)));
        }
    }
    let Some(vehicle) = fleet.get_mut(owner) else {
        return;
    };
    for (index, change) in changes {
        let slide = &mut vehicle.slide_nodes[index];
        match change {
            Some((rail, distance)) => {
                slide.rail = Some(rail);
                slide.broken = false;
                slide.threshold = distance.max(slide.tolerance);
            }
            None => slide.detach(),
        }
        vehicle.couplers_changed = true;
        vehicle.emit(SimEvent::SlideNodeChanged {
            vehicle: owner,
            slide_node: index,
            attached: change.is_some(),
        });
    }
}

impl Vehicle {
    pub fn rails(&self) -> &[Rail] {
        &self.rails
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{NodeDef, RailDef, SlideNodeDef, VehicleDef};
    use crate::fleet::VehicleSlot;

    /// A 2 m rail along x with node 2 riding 0.3 m above its first quarter.
    fn riding(break_force: Option<f32>) -> Vec<VehicleSlot> {
        let def = VehicleDef {
            nodes: vec![
                NodeDef::at(0.0, 0.0, 0.0),
                NodeDef::at(2.0, 0.0, 0.0),
                NodeDef::at(0.5, 0.3, 0.0),
            ],
            rails: vec![RailDef { nodes: vec![0, 1] }],
            slide_nodes: vec![SlideNodeDef {
                node: 2,
                rail: Some(0),
                spring: 1_000.0,
                break_force,
                ..SlideNodeDef::default()
            }],
            ..VehicleDef::default()
        };
        let v = build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid");
        vec![Some(Arc::new(Mutex::new(v)))]
    }

    #[test]
    fn test_loaded_node_is_pulled_back_to_rail() {
        let slots = riding(None);
        let mut fleet = Fleet::lock(&slots);
        apply_slide_nodes(&mut fleet, 0.0005);

        let v = fleet.get(VehicleId(0)).expect("vehicle");
        // 0.3 m off the rail minus the initial 0.1 m free play
        let pull = v.nodes[2].forces;
        assert!(pull.x.abs() < 1e-3 && pull.z.abs() < 1e-3);
        assert!((pull.y + 200.0).abs() < 1e-2, "pull {pull}");
        // reaction split by position along the segment
        assert!((v.nodes[0].forces.y - 150.0).abs() < 1e-2);
        assert!((v.nodes[1].forces.y - 50.0).abs() < 1e-2);
        let total: Vec3 = v.nodes.iter().map(|n| n.forces).sum();
        assert!(total.length() < 1e-3);

        let slide = &v.slide_nodes[0];
        assert_eq!(slide.segment, 0);
        assert!((slide.ratio - 0.25).abs() < 1e-6);
        assert!((slide.threshold - (0.1 - 0.0005)).abs() < 1e-6);
    }

    #[test]
    fn test_overloaded_slide_node_breaks_off() {
        let slots = riding(Some(100.0));
        let mut fleet = Fleet::lock(&slots);
        apply_slide_nodes(&mut fleet, 0.0005);

        let v = fleet.get(VehicleId(0)).expect("vehicle");
        assert!(v.slide_nodes[0].broken);
        assert!(!v.slide_nodes[0].is_attached());
        assert_eq!(v.nodes[2].forces, Vec3::ZERO);
        assert!(v.events.iter().any(|e| matches!(
            e,
            SimEvent::SlideNodeChanged {
                attached: false,
                ..
            }
        )));
    }

    #[test]
    fn test_closest_point_clamps_to_segment() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 0.0, 0.0);
        let (p, t) = closest_on_segment(a, b, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(p, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(t, 0.5);
        let (p, t) = closest_on_segment(a, b, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(p, b);
        assert_eq!(t, 1.0);
    }

    #[test]
    fn test_closest_segment_of_polyline() {
        let nodes: Vec<_> = [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 0.0, 1.0)]
            .into_iter()
            .map(|p| crate::node::Node::new(p, 1.0))
            .collect();
        let rail = Rail { nodes: vec![0, 1, 2] };
        let (segment, _, t, d) = closest_on_rail(&rail, &nodes, Vec3::new(1.2, 0.0, 0.8)).expect("segments");
        assert_eq!(segment, 1);
        assert!((t - 0.8).abs() < 1e-6);
        assert!((d - 0.2).abs() < 1e-6);
    }
}
