//! Generic procedure runner
//!
//! A procedure is an explicit state machine exposing `init`, `step`, `react`
//! and `then`. The runner multiplexes many such procedures on the single
//! stack thread: `launch` starts an invocation (and is the contention
//! primitive: launching an already-running procedure fails), `run` advances
//! it one cooperative step, `trigger` delivers a typed event, and one-shot
//! [`ProcFuture`] handles let procedures compose by polling each other's
//! eventual outcome.
//!
//! Every handler runs to completion; the only suspension point is returning
//! [`Outcome::Yield`]. While a handler executes, the procedure's state is
//! detached from its [`Proc`] shell, so a re-entrant `launch` or `trigger`
//! on the same procedure observes it as busy instead of recursing.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};

/// Result of one `init`/`step`/`react` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Suspend until the next tick or a matching event.
    Yield,
    /// Terminate the invocation successfully.
    Success,
    /// Terminate the invocation with an error.
    Error,
}

/// Captured completion of a procedure invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcResult<T> {
    Success(T),
    Error,
}

impl<T> ProcResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcResult::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProcResult::Error)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ProcResult::Success(v) => Some(v),
            ProcResult::Error => None,
        }
    }
}

/// One-shot handle onto a procedure's eventual outcome.
///
/// Polling never blocks. Dropping a future does not cancel the underlying
/// procedure; a future detached from any invocation never completes.
#[derive(Debug)]
pub struct ProcFuture<T> {
    cell: Rc<RefCell<Option<ProcResult<T>>>>,
}

impl<T> Default for ProcFuture<T> {
    fn default() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }
}

impl<T> Clone for ProcFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> ProcFuture<T> {
    pub fn is_complete(&self) -> bool {
        self.cell.borrow().is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(&*self.cell.borrow(), Some(r) if r.is_success())
    }

    pub fn is_error(&self) -> bool {
        matches!(&*self.cell.borrow(), Some(r) if r.is_error())
    }
}

impl<T: Clone> ProcFuture<T> {
    /// The completion value, if the procedure finished successfully.
    pub fn value(&self) -> Option<T> {
        match &*self.cell.borrow() {
            Some(ProcResult::Success(v)) => Some(v.clone()),
            _ => None,
        }
    }
}

/// A long-running protocol procedure.
///
/// `Ctx` is the shared context handed to every handler (for the RRC
/// procedures this is the `Rrc` itself). `Args` parameterizes a launch,
/// `Event` is the typed event set delivered through `trigger`, and `Output`
/// is the completion value observed through futures.
pub trait Procedure: Default + 'static {
    type Ctx;
    type Args;
    type Event;
    type Output: Clone;

    /// Procedure name used in log lines.
    const NAME: &'static str;

    /// Called exactly once per invocation by `launch`. Returning
    /// `Success`/`Error` terminates the invocation synchronously.
    fn init(&mut self, ctx: &mut Self::Ctx, args: Self::Args) -> Outcome;

    /// Polled once per task-loop tick while running.
    fn step(&mut self, _ctx: &mut Self::Ctx) -> Outcome {
        Outcome::Yield
    }

    /// Invoked when an event is triggered against this procedure. Unknown
    /// or unexpected events are ignored with a warning, never an error.
    fn react(&mut self, _ctx: &mut Self::Ctx, _event: Self::Event) -> Outcome {
        warn!(proc = Self::NAME, "unexpected event; ignoring");
        Outcome::Yield
    }

    /// Side-effect hook run on completion, before observers are notified.
    fn then(&mut self, _ctx: &mut Self::Ctx, _result: &ProcResult<Self::Output>) {}

    /// Completion value captured on `Success`.
    fn output(&mut self) -> Self::Output;
}

/// Shell holding a procedure's reusable state, lifecycle flag and the
/// result cell of the current invocation.
pub struct Proc<P: Procedure> {
    inner: Option<P>,
    running: bool,
    result: Rc<RefCell<Option<ProcResult<P::Output>>>>,
}

impl<P: Procedure> Default for Proc<P> {
    fn default() -> Self {
        Self {
            inner: Some(P::default()),
            running: false,
            result: Rc::new(RefCell::new(None)),
        }
    }
}

impl<P: Procedure> Proc<P> {
    /// Whether no invocation is in flight.
    pub fn is_idle(&self) -> bool {
        !self.running
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// A future onto the current (or most recent) invocation.
    pub fn get_future(&self) -> ProcFuture<P::Output> {
        ProcFuture {
            cell: Rc::clone(&self.result),
        }
    }
}

/// Field accessor used by the drivers to locate a procedure inside its
/// context without borrowing the whole context across a handler call.
pub type ProcLens<P> = fn(&mut <P as Procedure>::Ctx) -> &mut Proc<P>;

/// Launch a new invocation. Returns false if one is already running.
pub fn launch<P: Procedure>(ctx: &mut P::Ctx, lens: ProcLens<P>, args: P::Args) -> bool {
    let mut inner = {
        let proc = lens(ctx);
        if proc.running || proc.inner.is_none() {
            debug!(proc = P::NAME, "launch rejected: already running");
            return false;
        }
        proc.running = true;
        proc.result = Rc::new(RefCell::new(None));
        match proc.inner.take() {
            Some(inner) => inner,
            None => return false,
        }
    };
    let outcome = inner.init(ctx, args);
    conclude(ctx, lens, inner, outcome);
    true
}

/// Launch a new invocation and bind `fut` to its outcome.
pub fn launch_fut<P: Procedure>(
    ctx: &mut P::Ctx,
    lens: ProcLens<P>,
    fut: &mut ProcFuture<P::Output>,
    args: P::Args,
) -> bool {
    let mut inner = {
        let proc = lens(ctx);
        if proc.running || proc.inner.is_none() {
            debug!(proc = P::NAME, "launch rejected: already running");
            return false;
        }
        proc.running = true;
        proc.result = Rc::new(RefCell::new(None));
        *fut = ProcFuture {
            cell: Rc::clone(&proc.result),
        };
        match proc.inner.take() {
            Some(inner) => inner,
            None => return false,
        }
    };
    let outcome = inner.init(ctx, args);
    conclude(ctx, lens, inner, outcome);
    true
}

/// Advance the procedure one step. Returns true while it is still running.
pub fn run<P: Procedure>(ctx: &mut P::Ctx, lens: ProcLens<P>) -> bool {
    let mut inner = {
        let proc = lens(ctx);
        if !proc.running {
            return false;
        }
        match proc.inner.take() {
            Some(inner) => inner,
            // A handler higher up the stack is active; still running.
            None => return true,
        }
    };
    let outcome = inner.step(ctx);
    conclude(ctx, lens, inner, outcome);
    lens(ctx).running
}

/// Deliver a typed event to the procedure's `react` handler.
pub fn trigger<P: Procedure>(ctx: &mut P::Ctx, lens: ProcLens<P>, event: P::Event) {
    let mut inner = {
        let proc = lens(ctx);
        if !proc.running {
            warn!(proc = P::NAME, "event dropped: procedure is idle");
            return;
        }
        match proc.inner.take() {
            Some(inner) => inner,
            None => {
                warn!(proc = P::NAME, "event dropped: handler already active");
                return;
            }
        }
    };
    let outcome = inner.react(ctx, event);
    conclude(ctx, lens, inner, outcome);
}

fn conclude<P: Procedure>(ctx: &mut P::Ctx, lens: ProcLens<P>, mut inner: P, outcome: Outcome) {
    let result = match outcome {
        Outcome::Yield => {
            lens(ctx).inner = Some(inner);
            return;
        }
        Outcome::Success => ProcResult::Success(inner.output()),
        Outcome::Error => ProcResult::Error,
    };
    inner.then(ctx, &result);
    let proc = lens(ctx);
    proc.inner = Some(inner);
    proc.running = false;
    *proc.result.borrow_mut() = Some(result);
}
