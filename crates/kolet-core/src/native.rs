//! Native test function registry
//!
//! Tests that need code on the machine under test register named functions
//! here. The harness runs one with `kolet run <test> <func>` and reads the
//! exit status.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::KoletError;

/// A native test function.
pub type NativeFn = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Test name to function name to function.
#[derive(Default)]
pub struct NativeRegistry {
    tests: BTreeMap<String, BTreeMap<String, NativeFn>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` as `test`/`func`, replacing any previous registration.
    pub fn register(
        &mut self,
        test: &str,
        func: &str,
        f: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.tests
            .entry(test.to_string())
            .or_default()
            .insert(func.to_string(), Box::new(f));
        self
    }

    /// Registered test names, sorted.
    pub fn tests(&self) -> Vec<&str> {
        self.tests.keys().map(String::as_str).collect()
    }

    /// Function names registered for `test`, sorted.
    pub fn functions(&self, test: &str) -> Option<Vec<&str>> {
        self.tests
            .get(test)
            .map(|funcs| funcs.keys().map(String::as_str).collect())
    }

    /// Run `test`/`func`.
    pub fn run(&self, test: &str, func: &str) -> Result<(), KoletError> {
        let f = self
            .tests
            .get(test)
            .and_then(|funcs| funcs.get(func))
            .ok_or_else(|| KoletError::NativeNotFound {
                test: test.to_string(),
                func: func.to_string(),
            })?;

        debug!("running native function {test}.{func}");
        f().map_err(|e| KoletError::Native {
            test: test.to_string(),
            func: func.to_string(),
            source: e.into(),
        })
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.tests
                    .iter()
                    .map(|(test, funcs)| (test, funcs.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}
