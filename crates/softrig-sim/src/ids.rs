use std::fmt;

/// Stable handle of a vehicle slot. Slots are recycled only after the
/// vehicle that held them has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub u32);

impl VehicleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node addressed across vehicles, as held by couplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub vehicle: VehicleId,
    pub node: usize,
}

impl NodeRef {
    pub fn new(vehicle: VehicleId, node: usize) -> Self {
        Self { vehicle, node }
    }
}
