//! Solving engines.
//!
//! An [`Engine`] owns the scratch state of one solver and is driven by exactly
//! one [`Session`](crate::session::Session) at a time. An [`EngineProvider`]
//! is the explicit initialization object that sessions are created from, so
//! there is no process-wide engine state.
pub mod hash;
pub mod params;
pub mod verify;
pub mod wagner;

use crate::codec;
use crate::error::{EngineFailure, Error};
use crate::types::{ExpandedSolution, HeaderAndNonce, MinimalSolution};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub use params::Params;
pub use verify::verify_solution;
pub use wagner::Wagner;

/// Search and verification backend behind a session.
///
/// Both calls are complete operations against the engine's internal scratch
/// state; the engine may reuse that state across calls. An `Err` is an
/// internal failure of the engine, never a verdict on the input.
pub trait Engine: Send {
    /// Search for solutions to `input`, returning at most `max_solutions`.
    fn find_solutions(
        &mut self,
        input: &HeaderAndNonce,
        max_solutions: usize,
    ) -> Result<Vec<MinimalSolution>, EngineFailure>;

    /// Whether `solution` satisfies the Equihash predicate for `input`.
    fn validate_solution(
        &mut self,
        input: &HeaderAndNonce,
        solution: &MinimalSolution,
    ) -> Result<bool, EngineFailure>;
}

/// Creates engines for new sessions.
pub trait EngineProvider {
    type Engine: Engine;

    /// Allocate a fresh engine. Failure is reported as [`Error::Allocation`].
    fn create_engine(&self) -> Result<Self::Engine, Error>;
}

fn default_max_rows() -> usize {
    Params::ZCASH.leaf_count() as usize * 2
}

/// Provider for the bundled pure-Rust `(200, 9)` engine.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct WagnerProvider {
    /// Cap on rows kept per collision round.
    #[builder(default = "default_max_rows()")]
    pub max_rows: usize,
    /// Reserve all scratch tables when the engine is created instead of on
    /// the first search.
    #[builder(default = "false")]
    pub preallocate: bool,
}

impl Default for WagnerProvider {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            preallocate: false,
        }
    }
}

impl WagnerProvider {
    fn validate(&self) -> Result<(), Error> {
        if self.max_rows < 2 {
            return Err(Error::InvalidConfig("max_rows must be >= 2".into()));
        }
        Ok(())
    }
}

impl WagnerProviderBuilder {
    pub fn build_validated(self) -> Result<WagnerProvider, Error> {
        let provider = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        provider.validate()?;
        Ok(provider)
    }
}

impl EngineProvider for WagnerProvider {
    type Engine = WagnerEngine;

    fn create_engine(&self) -> Result<WagnerEngine, Error> {
        self.validate()?;
        let mut wagner = Wagner::new(Params::ZCASH, self.max_rows);
        if self.preallocate {
            wagner
                .preallocate()
                .map_err(|err| Error::Allocation(err.to_string()))?;
        }
        Ok(WagnerEngine { wagner })
    }
}

/// Pure-Rust Equihash `(200, 9)` engine.
#[derive(Debug)]
pub struct WagnerEngine {
    wagner: Wagner,
}

impl Engine for WagnerEngine {
    fn find_solutions(
        &mut self,
        input: &HeaderAndNonce,
        max_solutions: usize,
    ) -> Result<Vec<MinimalSolution>, EngineFailure> {
        let found = self.wagner.solve(input.as_bytes())?;
        let total = found.len();
        let mut out = Vec::with_capacity(total.min(max_solutions));
        for indices in found.into_iter().take(max_solutions) {
            let expanded = ExpandedSolution::try_from(indices.as_slice())
                .map_err(|err| EngineFailure::new(format!("solver produced {err}")))?;
            out.push(codec::expanded_to_minimal(&expanded));
        }
        debug!(total, returned = out.len(), "wagner engine search");
        Ok(out)
    }

    fn validate_solution(
        &mut self,
        input: &HeaderAndNonce,
        solution: &MinimalSolution,
    ) -> Result<bool, EngineFailure> {
        let expanded = codec::minimal_to_expanded(solution);
        match verify_solution(&Params::ZCASH, input.as_bytes(), expanded.as_slice()) {
            Ok(()) => Ok(true),
            Err(reason) => {
                trace!(%reason, "solution rejected");
                Ok(false)
            }
        }
    }
}
