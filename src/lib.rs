//! Equihash `(200, 9)` solving and validation.
//!
//! - [`types`]: fixed-size header-and-nonce input, minimal (packed) and
//!   expanded (index list) solutions, validation outcomes.
//! - [`codec`]: lossless conversion between the two solution forms.
//! - [`engine`]: the engine seam and the bundled BLAKE2b/Wagner engine.
//! - [`session`]: exclusive solver sessions created from an engine provider.
//! - [`search`]: multi-threaded nonce search with one session per worker.
//!
//! ```no_run
//! use zceq::{DefaultSession, HeaderAndNonce, ValidationOutcome};
//!
//! # fn main() -> Result<(), zceq::Error> {
//! let mut session = DefaultSession::with_default_engine()?;
//! let input = HeaderAndNonce::filled(0).with_simple_nonce(7);
//! for solution in session.find_solutions(&input)? {
//!     assert_eq!(session.validate_solution(&input, &solution), ValidationOutcome::Valid);
//! }
//! session.destroy();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod search;
pub mod session;
pub mod stream;
pub mod types;

pub use codec::{expanded_to_minimal, minimal_to_expanded};
pub use engine::{
    Engine, EngineProvider, Params, WagnerEngine, WagnerProvider, WagnerProviderBuilder,
};
pub use error::{EngineFailure, Error, InvalidSolution};
pub use search::{Hit, ParallelSearch, ParallelSearchBuilder, SearchReport, SearchSettings};
pub use session::{DefaultSession, Session, SessionId, SharedSession};
pub use stream::{NonceSource, StopFlag};
pub use types::{
    ExpandedSolution, HeaderAndNonce, MinimalSolution, ValidationOutcome, DEFAULT_MAX_SOLUTIONS,
    HEADER_AND_NONCE_LEN, HEADER_LEN, MINIMAL_SOLUTION_LEN, NONCE_LEN, SOLUTION_INDICES,
};
