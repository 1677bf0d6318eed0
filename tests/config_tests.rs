// tests/config_tests.rs
//
// Config loading: env overrides, JSON documents and files.

use std::io::Write;
use std::sync::Mutex;

use adaptfx::{AdaptError, Config, Strategy};

// Global mutex to serialize tests that touch environment variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ENV_VARS: [&str; 8] = [
    "ADAPTFX_STRATEGY",
    "ADAPTFX_SESSIONS",
    "ADAPTFX_TUMOR_GOAL",
    "ADAPTFX_OAR_BOUND",
    "ADAPTFX_MIN_DOSE",
    "ADAPTFX_MAX_DOSE",
    "ADAPTFX_DOSE_STEPSIZE",
    "ADAPTFX_STATE_STEPSIZE",
];

fn clear_env() {
    for v in ENV_VARS {
        std::env::remove_var(v);
    }
}

#[test]
fn env_overrides_apply() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("ADAPTFX_STRATEGY", "min-oar");
    std::env::set_var("ADAPTFX_SESSIONS", "3");
    std::env::set_var("ADAPTFX_TUMOR_GOAL", "60");
    std::env::set_var("ADAPTFX_MAX_DOSE", "8.5");
    std::env::set_var("ADAPTFX_STATE_STEPSIZE", "0.5");

    let cfg = Config::from_env_or_default();
    clear_env();

    assert_eq!(cfg.strategy, Strategy::MinOar);
    assert_eq!(cfg.treatment.sessions_total, 3);
    assert_eq!(cfg.treatment.tumor_goal, 60.0);
    assert_eq!(cfg.dose.max_dose, Some(8.5));
    assert_eq!(cfg.grid.state_stepsize, 0.5);
    // Untouched values keep their defaults.
    assert_eq!(cfg.treatment.oar_bound, 90.0);
}

#[test]
fn bad_env_values_fall_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("ADAPTFX_STRATEGY", "nonsense");
    std::env::set_var("ADAPTFX_SESSIONS", "five");
    std::env::set_var("ADAPTFX_MAX_DOSE", "-1");

    let cfg = Config::from_env_or_default();
    clear_env();

    assert_eq!(cfg.strategy, Strategy::OarBound);
    assert_eq!(cfg.treatment.sessions_total, 5);
    assert_eq!(cfg.dose.max_dose, None);
}

#[test]
fn json_round_trip() {
    let mut cfg = Config::for_strategy(Strategy::MinOar);
    cfg.dose.max_dose = Some(10.0);
    let raw = serde_json::to_string(&cfg).unwrap();
    let back = Config::from_json_str(&raw).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn minimal_json_uses_section_defaults() {
    let raw = r#"{
        "treatment": {
            "sessions_total": 5,
            "tumor_alpha_beta": 10.0,
            "oar_alpha_beta": 3.0,
            "tumor_goal": 72.0,
            "oar_bound": 90.0
        },
        "prior": { "alpha": 2.7, "beta": 0.014 }
    }"#;
    let cfg = Config::from_json_str(raw).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn unknown_fields_and_invalid_values_are_rejected() {
    let raw = r#"{
        "treatment": {
            "sessions_total": 5,
            "tumor_alpha_beta": 10.0,
            "oar_alpha_beta": 3.0,
            "tumor_goal": 72.0,
            "oar_bound": 90.0,
            "color": "blue"
        },
        "prior": { "alpha": 2.7, "beta": 0.014 }
    }"#;
    assert!(matches!(Config::from_json_str(raw), Err(AdaptError::Parse(_))));

    let raw = r#"{
        "treatment": {
            "sessions_total": 0,
            "tumor_alpha_beta": 10.0,
            "oar_alpha_beta": 3.0,
            "tumor_goal": 72.0,
            "oar_bound": 90.0
        },
        "prior": { "alpha": 2.7, "beta": 0.014 }
    }"#;
    assert!(matches!(
        Config::from_json_str(raw),
        Err(AdaptError::InvalidConfig(_))
    ));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let cfg = Config::for_strategy(Strategy::MinOar);
    write!(file, "{}", serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
    file.flush().unwrap();

    let back = Config::from_json_file(file.path()).unwrap();
    assert_eq!(back, cfg);

    let missing = file.path().with_extension("missing");
    assert!(matches!(
        Config::from_json_file(&missing),
        Err(AdaptError::Io { .. })
    ));
}
