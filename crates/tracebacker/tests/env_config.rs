//! Environment-driven configuration
//!
//! Kept in its own test binary with a single test so that setting process
//! environment variables cannot race with other tests.

use tracebacker::config::env;
use tracebacker::{global, InstrumentationConfig, TracebackerError};

#[test]
fn test_from_env_and_global_domain() {
    std::env::set_var(env::TRACING, "1");
    std::env::set_var(env::MAX_SAMPLES, "8");
    std::env::set_var(env::SAMPLED, "render");

    let config = InstrumentationConfig::from_env().unwrap();
    assert!(config.tracing);
    assert_eq!(config.max_samples, 8);
    assert_eq!(config.sampled_functions, vec!["render"]);

    // The default domain picks up the same variables on first use
    let domain = global();
    assert!(domain.traces().is_tracing());
    let render = domain.stats().get_stats_for("render").unwrap();
    assert_eq!(render.max_samples, 8);

    std::env::set_var(env::WINDOW_SIZE, "zero");
    let err = InstrumentationConfig::from_env().unwrap_err();
    assert!(matches!(err, TracebackerError::Configuration(_)));

    for key in [env::TRACING, env::MAX_SAMPLES, env::SAMPLED, env::WINDOW_SIZE] {
        std::env::remove_var(key);
    }
}
