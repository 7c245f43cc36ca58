//! Typed accessors over the environment flags the test harness and
//! regression tooling read. Centralized here instead of scattered
//! `std::env::var` calls throughout the harness.

use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
pub struct HarnessConfig {
    /// `regress.tests=true` rewrites each corpus's `out.yaml` to match the
    /// dialect's actual output instead of asserting against it.
    pub regress_tests: bool,
    /// `base.tests=true` widens the corpus search to also cover the base
    /// fixture set shipped alongside per-feature fixtures.
    pub base_tests: bool,
    /// `dumpCode=true` prints the dialect's rendering of each fixture to
    /// stderr as the harness runs, for debugging a failing corpus.
    pub dump_code: bool,
}

fn flag(name: &str) -> bool {
    matches!(env::var(name), Ok(v) if v == "true" || v == "1")
}

impl HarnessConfig {
    fn from_env() -> HarnessConfig {
        HarnessConfig {
            regress_tests: flag("regress.tests"),
            base_tests: flag("base.tests"),
            dump_code: flag("dumpCode"),
        }
    }

    /// The process-wide configuration, read from the environment once and
    /// cached for the lifetime of the process.
    pub fn current() -> &'static HarnessConfig {
        static CONFIG: OnceLock<HarnessConfig> = OnceLock::new();
        CONFIG.get_or_init(HarnessConfig::from_env)
    }
}
