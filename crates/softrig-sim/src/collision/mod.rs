//! Ground contact and cab collisions.

pub mod dynamic;
pub mod point_detector;
pub mod primitive;

pub use dynamic::{CabRate, CollisionCab, ContactBody, ContactWorld, RemoteImpulse};
pub use point_detector::{CollisionPoint, PointDetector};
pub use primitive::{ContactPoint, ContactResponse, primitive_collision};

use crate::context::SimContext;
use crate::vehicle::Vehicle;

impl Vehicle {
    /// Contacters of this vehicle against its own cabs.
    pub(crate) fn calc_intra_collisions(&mut self, ctx: &SimContext, dt: f32) {
        if self.cabs.is_empty() || self.contacters.is_empty() {
            return;
        }
        let slot = self.id.index();
        let nodes = &self.nodes;
        self.intra_detector.rebuild(self.contacters.iter().map(|&i| CollisionPoint {
            position: nodes[i].abs_pos,
            owner: slot,
            node: i,
        }));
        let mut hits = Vec::new();
        dynamic::resolve_intra_collisions(
            &mut self.nodes,
            &self.cabs,
            &mut self.intra_rates,
            &self.intra_detector,
            self.collision_range,
            dt,
            ctx.ground_models.default_model(),
            &mut hits,
        );
    }

    /// Contacter points to publish into the shared contact tree.
    pub(crate) fn contact_points(&self) -> impl Iterator<Item = CollisionPoint> + '_ {
        let slot = self.id.index();
        self.contacters.iter().map(move |&i| CollisionPoint {
            position: self.nodes[i].abs_pos,
            owner: slot,
            node: i,
        })
    }

    pub(crate) fn contact_body(&self) -> ContactBody {
        ContactBody::capture(&self.nodes, std::sync::Arc::clone(&self.topology), self.state.is_networked())
    }

    /// This vehicle's cabs against the partners' contacters. Forces owed to
    /// partner nodes are returned.
    pub(crate) fn calc_inter_collisions(
        &mut self,
        world: &ContactWorld,
        partners: &[bool],
        ctx: &SimContext,
        dt: f32,
    ) -> Vec<RemoteImpulse> {
        let mut outbox = Vec::new();
        if self.cabs.is_empty() {
            return outbox;
        }
        dynamic::resolve_inter_collisions(
            self.id.index(),
            &mut self.nodes,
            &self.cabs,
            &mut self.inter_rates,
            world,
            partners,
            self.collision_range,
            dt,
            ctx.ground_models.default_model(),
            &mut outbox,
        );
        outbox
    }
}
