use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::ids::VehicleId;

use super::coupled_vehicles;

/// Recompute every vehicle's transitive set of coupled vehicles.
/// Coupler edges count in both directions.
pub(crate) fn update_linked_sets(fleet: &mut Fleet<'_>) {
    let mut edges: FxHashMap<VehicleId, Vec<VehicleId>> = FxHashMap::default();
    for vehicle in fleet.iter() {
        edges.entry(vehicle.id()).or_default();
        for peer in coupled_vehicles(vehicle) {
            edges.entry(vehicle.id()).or_default().push(peer);
            edges.entry(peer).or_default().push(vehicle.id());
        }
    }

    let mut sets: FxHashMap<VehicleId, Vec<VehicleId>> = FxHashMap::default();
    let mut seen = FxHashSet::default();
    let mut starts: Vec<VehicleId> = edges.keys().copied().collect();
    starts.sort_unstable();
    for start in starts {
        if !seen.insert(start) {
            continue;
        }
        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &next in edges.get(&current).into_iter().flatten() {
                if seen.insert(next) {
                    component.push(next);
                    queue.push_back(next);
                }
            }
        }
        component.sort_unstable();
        for &member in &component {
            sets.insert(member, component.clone());
        }
    }

    for vehicle in fleet.iter_mut() {
        let id = vehicle.id();
        let linked = sets.remove(&id).unwrap_or_else(|| vec![id]);
        if vehicle.linked != linked {
            tracing::debug!(vehicle = %id, linked = ?linked, "linked set changed");
            vehicle.linked = linked.clone();
            vehicle.emit(SimEvent::LinkedSetChanged { vehicle: id, linked });
        }
    }
}
