//! Solver sessions.
//!
//! A [`Session`] exclusively owns one engine. Every operation takes
//! `&mut self`, so two calls can never be in flight on the same session, and
//! [`Session::destroy`] consumes it, so it cannot be used afterwards. Separate
//! sessions share nothing and can run on separate threads. When one session has
//! to be reachable from several places, wrap it in a [`SharedSession`], which
//! serializes access behind a mutex.
//!
//! A `find_solutions` call always runs to completion. There is no timeout or
//! cancellation inside a call; callers that need one run the session on a
//! worker of their own and stop waiting for it.
use crate::codec;
use crate::engine::{Engine, EngineProvider, WagnerEngine, WagnerProvider};
use crate::error::Error;
use crate::types::{
    ExpandedSolution, HeaderAndNonce, MinimalSolution, ValidationOutcome, DEFAULT_MAX_SOLUTIONS,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session number, used in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Exclusive handle to one engine.
pub struct Session<E: Engine> {
    id: SessionId,
    engine: E,
    max_solutions: usize,
}

/// Session over the bundled `(200, 9)` engine.
pub type DefaultSession = Session<WagnerEngine>;

impl<E: Engine> Session<E> {
    /// Create a session with a new engine from `provider`.
    pub fn create<P>(provider: &P) -> Result<Self, Error>
    where
        P: EngineProvider<Engine = E>,
    {
        let engine = provider.create_engine().inspect_err(|err| {
            warn!(%err, "engine creation failed");
        })?;
        Ok(Self::from_engine(engine))
    }

    /// Wrap an engine that was already created.
    pub fn from_engine(engine: E) -> Self {
        let id = SessionId::next();
        debug!(session = %id, "session created");
        Self {
            id,
            engine,
            max_solutions: DEFAULT_MAX_SOLUTIONS,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn max_solutions(&self) -> usize {
        self.max_solutions
    }

    /// Bound the number of solutions returned by one `find_solutions` call.
    pub fn set_max_solutions(&mut self, max_solutions: usize) -> Result<(), Error> {
        if max_solutions == 0 {
            return Err(Error::InvalidConfig("max_solutions must be >= 1".into()));
        }
        self.max_solutions = max_solutions;
        Ok(())
    }

    /// Search for solutions to `input`.
    ///
    /// `Ok` with an empty vector means the search ran and found nothing; an
    /// engine failure is [`Error::Internal`]. This call blocks for as long as
    /// the search takes.
    pub fn find_solutions(
        &mut self,
        input: &HeaderAndNonce,
    ) -> Result<Vec<MinimalSolution>, Error> {
        let started = Instant::now();
        match self.engine.find_solutions(input, self.max_solutions) {
            Ok(mut solutions) => {
                let total = solutions.len();
                solutions.truncate(self.max_solutions);
                debug!(
                    session = %self.id,
                    total,
                    solutions = solutions.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "find_solutions done"
                );
                Ok(solutions)
            }
            Err(failure) => {
                warn!(session = %self.id, %failure, "engine failed in find_solutions");
                Err(Error::Internal(failure))
            }
        }
    }

    /// [`Self::find_solutions`] for an unchecked byte slice.
    pub fn find_solutions_raw(&mut self, input: &[u8]) -> Result<Vec<MinimalSolution>, Error> {
        let input = HeaderAndNonce::from_bytes(input)?;
        self.find_solutions(&input)
    }

    /// Check `solution` against `input`.
    ///
    /// The solution may come from anywhere. Anything that is not a valid
    /// solution for `input` is [`ValidationOutcome::Invalid`];
    /// [`ValidationOutcome::InternalError`] only reports an engine failure.
    pub fn validate_solution(
        &mut self,
        input: &HeaderAndNonce,
        solution: &MinimalSolution,
    ) -> ValidationOutcome {
        match self.engine.validate_solution(input, solution) {
            Ok(true) => ValidationOutcome::Valid,
            Ok(false) => ValidationOutcome::Invalid,
            Err(failure) => {
                warn!(session = %self.id, %failure, "engine failed in validate_solution");
                ValidationOutcome::InternalError
            }
        }
    }

    /// [`Self::validate_solution`] for unchecked byte slices.
    pub fn validate_solution_raw(
        &mut self,
        input: &[u8],
        solution: &[u8],
    ) -> Result<ValidationOutcome, Error> {
        let input = HeaderAndNonce::from_bytes(input)?;
        let solution = MinimalSolution::from_bytes(solution)?;
        Ok(self.validate_solution(&input, &solution))
    }

    /// Pack `expanded` and validate it.
    pub fn validate_expanded(
        &mut self,
        input: &HeaderAndNonce,
        expanded: &ExpandedSolution,
    ) -> ValidationOutcome {
        let minimal = codec::expanded_to_minimal(expanded);
        self.validate_solution(input, &minimal)
    }

    /// Release the session and its engine.
    ///
    /// Dropping the session does the same; this spells it out at call sites.
    pub fn destroy(self) {
        drop(self);
    }
}

impl DefaultSession {
    /// Session over a default-configured [`WagnerProvider`].
    pub fn with_default_engine() -> Result<Self, Error> {
        Self::create(&WagnerProvider::default())
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        debug!(session = %self.id, "session destroyed");
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("max_solutions", &self.max_solutions)
            .finish_non_exhaustive()
    }
}

/// A session that may be reached from several threads.
///
/// Calls are serialized by a mutex; a caller waits while another call runs.
pub struct SharedSession<E: Engine> {
    inner: Arc<Mutex<Session<E>>>,
}

impl<E: Engine> Clone for SharedSession<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for SharedSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

impl<E: Engine> SharedSession<E> {
    pub fn new(session: Session<E>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn find_solutions(&self, input: &HeaderAndNonce) -> Result<Vec<MinimalSolution>, Error> {
        let mut session = self.inner.lock().map_err(|_| Error::Poisoned)?;
        session.find_solutions(input)
    }

    pub fn validate_solution(
        &self,
        input: &HeaderAndNonce,
        solution: &MinimalSolution,
    ) -> Result<ValidationOutcome, Error> {
        let mut session = self.inner.lock().map_err(|_| Error::Poisoned)?;
        Ok(session.validate_solution(input, solution))
    }

    /// Take the session back once this is the last handle.
    pub fn try_into_inner(self) -> Result<Session<E>, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex
                .into_inner()
                .map_err(|poisoned| Self::new(poisoned.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }
}
