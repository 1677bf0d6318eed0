// tests/prior_fit_tests.rs
//
// Prior calibration on synthetic cohorts drawn with a seeded ChaCha8 RNG.

use adaptfx::{decide_dose, fit_prior, Config, PriorHyperparams, Strategy};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Gamma(shape = k, rate) for integer `k`, as a sum of exponentials.
fn gamma_int(rng: &mut ChaCha8Rng, k: u32, rate: f64) -> f64 {
    (0..k).map(|_| -(1.0 - rng.gen::<f64>()).ln()).sum::<f64>() / rate
}

/// One patient per variance draw; `[1 - s, 1 + s]` has population
/// variance exactly `s^2`.
fn synthetic_cohort(seed: u64, patients: usize, alpha: u32, beta: f64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..patients)
        .map(|_| {
            let var = 1.0 / gamma_int(&mut rng, alpha, beta);
            let s = var.sqrt();
            vec![1.0 - s, 1.0 + s]
        })
        .collect()
}

#[test]
fn recovers_generating_hyperparameters() {
    let cohort = synthetic_cohort(7, 4000, 20, 0.2);
    let fit = fit_prior(&cohort).unwrap();

    assert!((fit.alpha - 20.0).abs() / 20.0 < 0.15, "{fit:?}");
    assert!((fit.beta - 0.2).abs() / 0.2 < 0.15, "{fit:?}");
}

#[test]
fn fit_is_deterministic_for_a_seed() {
    let a = fit_prior(&synthetic_cohort(11, 200, 5, 0.02)).unwrap();
    let b = fit_prior(&synthetic_cohort(11, 200, 5, 0.02)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn fitted_prior_drives_a_session() {
    let fit: PriorHyperparams = fit_prior(&synthetic_cohort(3, 300, 4, 0.01)).unwrap();
    assert!(fit.alpha > 0.0 && fit.beta > 0.0);

    let mut cfg = Config::for_strategy(Strategy::MinOar);
    cfg.prior = fit.into();
    cfg.grid.dose_stepsize = 0.5;
    let d = decide_dose(2, &cfg, 14.0, 18.0, &[0.95, 0.9, 1.0]).unwrap();
    assert!(d.dose >= 0.0);
}
