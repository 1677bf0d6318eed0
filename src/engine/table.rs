// src/engine/table.rs
//
// Dense value layers for one backward-induction solve.
//
// Layer 0 is the last session of the course; layer k is the session k
// steps before it. The table is allocated once at full size and filled in
// increasing layer order, each layer reading only the one below it.

use crate::belief::DiscreteDistribution;

/// `layers` dense arrays, each row-major over `(tumor, oar, sf)`. The
/// single-state strategy uses an OAR dimension of 1.
#[derive(Debug, Clone)]
pub struct ValueTable {
    data: Vec<f64>,
    layers: usize,
    dims: [usize; 3],
}

impl ValueTable {
    pub fn new(layers: usize, dims: [usize; 3]) -> Self {
        let cells = dims.iter().product::<usize>();
        Self {
            data: vec![0.0; layers * cells],
            layers,
            dims,
        }
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn cells(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn layer(&self, k: usize) -> &[f64] {
        let n = self.cells();
        &self.data[k * n..(k + 1) * n]
    }

    pub fn layer_mut(&mut self, k: usize) -> &mut [f64] {
        let n = self.cells();
        &mut self.data[k * n..(k + 1) * n]
    }

    /// Layer `k` with the sparing factor integrated out: one value per
    /// `(tumor, oar)` cell, row-major, weighted by the retained bin
    /// probabilities as they are (no renormalisation).
    pub fn expected(&self, k: usize, dist: &DiscreteDistribution) -> Vec<f64> {
        let n_sf = self.dims[2];
        debug_assert_eq!(n_sf, dist.len());
        self.layer(k)
            .chunks_exact(n_sf)
            .map(|row| dist.expectation(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_are_disjoint_slices() {
        let mut t = ValueTable::new(3, [2, 2, 2]);
        t.layer_mut(1).fill(1.0);
        assert!(t.layer(0).iter().all(|&v| v == 0.0));
        assert!(t.layer(1).iter().all(|&v| v == 1.0));
        assert!(t.layer(2).iter().all(|&v| v == 0.0));
        assert_eq!(t.layer(2).len(), 8);
    }

    #[test]
    fn expected_uses_raw_weights() {
        let dist = DiscreteDistribution {
            values: vec![0.9, 1.0],
            probs: vec![0.25, 0.5],
        };
        let mut t = ValueTable::new(1, [2, 1, 2]);
        t.layer_mut(0).copy_from_slice(&[4.0, 8.0, -2.0, 2.0]);
        let e = t.expected(0, &dist);
        assert_eq!(e, vec![0.25 * 4.0 + 0.5 * 8.0, 0.25 * -2.0 + 0.5 * 2.0]);
    }
}
