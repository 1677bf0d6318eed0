// src/metrics.rs
//
// Online summary statistics over sparing-factor observations.
// - OnlineStats: Welford running mean / population variance.
//
// Used for the belief mean, the sample variance fed to the posterior, and
// the per-patient variances of a calibration cohort.

#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl OnlineStats {
    pub fn from_slice(xs: &[f64]) -> Self {
        let mut s = Self::default();
        for &x in xs {
            s.add(x);
        }
        s
    }

    /// Adds a sample if finite. Non-finite samples are ignored.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        self.n += 1;

        // Welford online variance.
        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance (divide by n). This is the variance the posterior
    /// and the prior fit work with.
    pub fn variance_population(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / (self.n as f64)
        }
    }
}
