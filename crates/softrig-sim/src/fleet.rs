//! Exclusive access to every vehicle at once, for the sequential phase.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ids::VehicleId;
use crate::vehicle::Vehicle;

pub(crate) type VehicleSlot = Option<Arc<Mutex<Vehicle>>>;

/// Lock a vehicle, recovering the data if a worker panicked while holding it.
pub(crate) fn lock(vehicle: &Mutex<Vehicle>) -> MutexGuard<'_, Vehicle> {
    vehicle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// All vehicle locks held together, indexed by slot.
pub struct Fleet<'a> {
    slots: Vec<Option<MutexGuard<'a, Vehicle>>>,
}

impl<'a> Fleet<'a> {
    pub(crate) fn lock(slots: &'a [VehicleSlot]) -> Self {
        Self {
            slots: slots.iter().map(|s| s.as_deref().map(lock)).collect(),
        }
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.slots.get(id.index())?.as_deref()
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.slots.get_mut(id.index())?.as_deref_mut()
    }

    /// Two distinct vehicles mutably.
    pub fn pair_mut(&mut self, a: VehicleId, b: VehicleId) -> Option<(&mut Vehicle, &mut Vehicle)> {
        let (i, j) = (a.index(), b.index());
        if i == j || i.max(j) >= self.slots.len() {
            return None;
        }
        let (lo, hi) = (i.min(j), i.max(j));
        let (left, right) = self.slots.split_at_mut(hi);
        let first = left[lo].as_deref_mut()?;
        let second = right[0].as_deref_mut()?;
        Some(if i < j { (first, second) } else { (second, first) })
    }

    pub fn ids(&self) -> Vec<VehicleId> {
        self.iter().map(Vehicle::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.slots.iter().filter_map(|s| s.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vehicle> {
        self.slots.iter_mut().filter_map(|s| s.as_deref_mut())
    }
}
