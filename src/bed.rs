// src/bed.rs
//
// Linear-quadratic dose-response model.
//
//   BED(d) = sf * d * (1 + sf * d / ab)
//
// `sf = 1` is the tumor (no sparing); the OAR sees the dose scaled by the
// session's sparing factor. `ab` must be positive; Config::validate rejects
// anything else before these are reached.

/// Biologically effective dose of a physical `dose`.
#[inline]
pub fn bed(dose: f64, ab: f64, sparing: f64) -> f64 {
    sparing * dose * (1.0 + sparing * dose / ab)
}

/// Tumor BED (sparing factor 1).
#[inline]
pub fn tumor_bed(dose: f64, ab: f64) -> f64 {
    bed(dose, ab, 1.0)
}

/// BED over the cross product of sparing factors (rows) and doses (columns):
/// `out[i][j] = bed(doses[j], ab, sparing[i])`.
pub fn bed_matrix(doses: &[f64], ab: f64, sparing: &[f64]) -> Vec<Vec<f64>> {
    sparing
        .iter()
        .map(|&sf| doses.iter().map(|&d| bed(d, ab, sf)).collect())
        .collect()
}

/// Physical dose whose BED equals `budget`, i.e. the positive root of
/// `bed(d, ab, sf) = budget`.
///
/// Returns `None` when the discriminant is negative, which only happens for
/// budgets below `-ab / 4`: the state is already past its limit. Budgets in
/// `[-ab/4, 0)` yield a negative dose that callers clamp to zero.
pub fn dose_for_bed(budget: f64, ab: f64, sparing: f64) -> Option<f64> {
    let sf2 = sparing * sparing;
    let disc = sf2 + 4.0 * sf2 * budget / ab;
    if disc < 0.0 || !disc.is_finite() {
        return None;
    }
    Some((-sparing + disc.sqrt()) / (2.0 * sf2 / ab))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dose_has_zero_bed() {
        assert_eq!(bed(0.0, 10.0, 1.0), 0.0);
        assert_eq!(bed(0.0, 3.0, 0.7), 0.0);
    }

    #[test]
    fn known_values() {
        // 8 Gy to the tumor at ab=10: 8 * 1.8 = 14.4
        assert!((tumor_bed(8.0, 10.0) - 14.4).abs() < 1e-12);
        // 8 Gy spared to 0.5 at ab=3: 4 * (1 + 4/3)
        assert!((bed(8.0, 3.0, 0.5) - 4.0 * (1.0 + 4.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn strictly_increasing_in_dose_and_sparing() {
        let doses: Vec<f64> = (0..=60).map(|k| k as f64 * 0.25).collect();
        let sfs: Vec<f64> = (1..=26).map(|k| k as f64 * 0.05).collect();
        for ab in [1.5, 3.0, 10.0, 25.0] {
            for &sf in &sfs {
                for w in doses.windows(2) {
                    assert!(bed(w[1], ab, sf) > bed(w[0], ab, sf), "ab={ab} sf={sf} d={w:?}");
                }
            }
            for &d in doses.iter().filter(|&&d| d > 0.0) {
                for w in sfs.windows(2) {
                    assert!(bed(d, ab, w[1]) > bed(d, ab, w[0]), "ab={ab} d={d} sf={w:?}");
                }
            }
        }
    }

    #[test]
    fn matrix_layout_is_sparing_by_dose() {
        let doses = [0.0, 1.0, 2.0];
        let sfs = [0.5, 1.0];
        let m = bed_matrix(&doses, 3.0, &sfs);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].len(), 3);
        for (i, sf) in sfs.iter().enumerate() {
            for (j, d) in doses.iter().enumerate() {
                assert_eq!(m[i][j], bed(*d, 3.0, *sf));
            }
        }
    }

    #[test]
    fn inverse_recovers_dose() {
        for &(d, ab, sf) in &[(5.0, 10.0, 1.0), (2.3, 3.0, 0.8), (12.0, 3.0, 1.2)] {
            let b = bed(d, ab, sf);
            let back = dose_for_bed(b, ab, sf).unwrap();
            assert!((back - d).abs() < 1e-9, "{d} -> {b} -> {back}");
        }
        // 72 BED at ab=10 is the classic 22.3 Gy single-session budget.
        let d = dose_for_bed(72.0, 10.0, 1.0).unwrap();
        assert!((d - 22.29).abs() < 0.01);
    }

    #[test]
    fn deep_negative_budget_has_no_root() {
        // -ab/4 = -2.5 is the edge of the real roots.
        assert_eq!(dose_for_bed(-2.0, 10.0, 1.0).map(|d| d < 0.0), Some(true));
        assert!(dose_for_bed(-3.0, 10.0, 1.0).is_none());
    }
}
