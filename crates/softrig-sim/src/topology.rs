//! Node adjacency, built once after a vehicle is assembled.

use crate::beam::{Beam, BeamKind};

#[derive(Debug, Clone, Default)]
pub struct Topology {
    neighbours: Vec<Vec<usize>>,
    incident: Vec<Vec<usize>>,
}

impl Topology {
    /// Build adjacency from the local beams. Coupler beams are skipped since
    /// their far end may live on another vehicle.
    pub fn build(node_count: usize, beams: &[Beam]) -> Self {
        let mut neighbours = vec![Vec::new(); node_count];
        let mut incident = vec![Vec::new(); node_count];
        for (i, beam) in beams.iter().enumerate() {
            let parked = beam.kind == BeamKind::Virtual && beam.disabled;
            if parked || beam.remote.is_some() || beam.p1 >= node_count || beam.p2 >= node_count {
                continue;
            }
            incident[beam.p1].push(i);
            incident[beam.p2].push(i);
            if !neighbours[beam.p1].contains(&beam.p2) {
                neighbours[beam.p1].push(beam.p2);
            }
            if !neighbours[beam.p2].contains(&beam.p1) {
                neighbours[beam.p2].push(beam.p1);
            }
        }
        Self {
            neighbours,
            incident,
        }
    }

    pub fn neighbours(&self, node: usize) -> &[usize] {
        self.neighbours.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn incident(&self, node: usize) -> &[usize] {
        self.incident.get(node).map_or(&[], Vec::as_slice)
    }

    /// Number of incident beams that are enabled and unbounded.
    pub fn node_beam_connections(&self, beams: &[Beam], node: usize) -> usize {
        self.incident(node)
            .iter()
            .filter(|&&b| beams[b].is_live_link())
            .count()
    }
}
