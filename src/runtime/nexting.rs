// File: src/runtime/nexting.rs
//
// The nexting stack: an explicit, abandonable call stack.
//
// Every NEXT pushes an `ExecutionFrame` holding the one-shot sender its
// caller is waiting on, then starts the callee as a separate tokio task.
// The caller stays parked on the receiver until the frame is resolved:
//
//   Resumed(baton)  RESUME reached the frame; the caller carries on
//   Aborted         RESUME skipped it, or FORGET / GIVE UP / a failure
//                   dropped it; the caller stops where it stands
//
// The baton (the execution context in practice) travels with control,
// so only the unit holding it is ever live.

use futures::future::{BoxFuture, FutureExt};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::ast::Label;
use crate::errors::{ErrorCode, IckError};
use crate::runtime::async_runtime::AsyncRuntime;

/// The traditional limit on nested NEXTs.
pub const DEFAULT_MAX_DEPTH: usize = 80;

/// How a pending frame was resolved, as seen by the unit waiting on it.
#[derive(Debug)]
pub enum Outcome<T> {
    Resumed(T),
    Aborted,
}

impl<T> Outcome<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted)
    }
}

/// A failure raised inside a unit, with the baton when it survived.
#[derive(Debug)]
pub struct Fault<T> {
    pub error: IckError,
    pub baton: Option<T>,
}

impl<T> Fault<T> {
    pub fn new(error: IckError) -> Self {
        Fault { error, baton: None }
    }

    pub fn with_baton(error: IckError, baton: T) -> Self {
        Fault { error, baton: Some(baton) }
    }

    pub fn map_error(self, f: impl FnOnce(IckError) -> IckError) -> Self {
        Fault { error: f(self.error), baton: self.baton }
    }
}

impl<T> From<IckError> for Fault<T> {
    fn from(error: IckError) -> Self {
        Fault::new(error)
    }
}

/// The body of a unit: takes the baton, runs until it suspends for good.
pub type UnitFuture<T> = BoxFuture<'static, Result<(), Fault<T>>>;

/// One suspended NEXT.
struct ExecutionFrame<T> {
    label: Label,
    signal: oneshot::Sender<Outcome<T>>,
}

impl<T> ExecutionFrame<T> {
    fn abort(self) {
        trace!(label = %self.label, "frame aborted");
        // A waiter that has already gone away needs no wake-up
        let _ = self.signal.send(Outcome::Aborted);
    }
}

struct StackState<T> {
    frames: Vec<ExecutionFrame<T>>,
    completion: Option<oneshot::Sender<Result<T, Fault<T>>>>,
}

/// One per program run, shared by every unit of that run.
pub struct NextingStack<T> {
    state: Mutex<StackState<T>>,
    max_depth: usize,
}

impl<T: Send + 'static> Default for NextingStack<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl<T: Send + 'static> NextingStack<T> {
    pub fn new(max_depth: usize) -> Self {
        NextingStack {
            state: Mutex::new(StackState { frames: Vec::new(), completion: None }),
            max_depth,
        }
    }

    // Nothing panics while holding the lock, but a poisoned stack is still usable.
    fn lock(&self) -> MutexGuard<'_, StackState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn depth(&self) -> usize {
        self.lock().frames.len()
    }

    /// Labels of the pending frames, most recently nexted first.
    ///
    /// This is the order of the NEXTs still pending, which need not be the
    /// order in which labels last ran: FORGET and COME FROM both move
    /// control without touching the stack.
    pub fn labels(&self) -> Vec<Label> {
        self.lock().frames.iter().rev().map(|f| f.label).collect()
    }

    /// Run a whole program. `root` starts with the baton and no frame;
    /// the result arrives when some unit gives up or fails.
    pub async fn run<F>(self: Arc<Self>, baton: T, root: F) -> Result<T, Fault<T>>
    where
        F: FnOnce(T) -> UnitFuture<T> + Send + 'static,
    {
        let (done, finished) = oneshot::channel();
        {
            let mut state = self.lock();
            state.frames.clear();
            state.completion = Some(done);
        }
        self.spawn_unit(baton, root);
        finished.await.unwrap_or_else(|_| {
            Err(Fault::new(IckError::runtime(ErrorCode::E778, "(the run ended without giving up)")))
        })
    }

    /// Push a frame for `label`, start `body` on it with the baton, and
    /// wait for the frame to be resolved.
    pub async fn next<F>(self: &Arc<Self>, label: Label, baton: T, body: F) -> Result<Outcome<T>, Fault<T>>
    where
        F: FnOnce(T) -> UnitFuture<T> + Send + 'static,
    {
        let (signal, pending) = oneshot::channel();
        {
            let mut state = self.lock();
            if state.frames.len() >= self.max_depth {
                return Err(Fault::with_baton(
                    IckError::runtime(ErrorCode::E123, format!("(depth {})", self.max_depth)),
                    baton,
                ));
            }
            state.frames.push(ExecutionFrame { label, signal });
            debug!(%label, depth = state.frames.len(), "NEXT");
        }
        self.spawn_unit(baton, body);
        // A dropped sender means the frame was discarded with the stack.
        Ok(pending.await.unwrap_or(Outcome::Aborted))
    }

    /// Abort the top `depth - 1` frames and resume the one under them.
    /// Asking for more frames than exist ruptures the stack (E632) and
    /// leaves it untouched.
    pub fn resume(&self, depth: NonZeroUsize, baton: T) -> Result<(), Fault<T>> {
        let mut discarded = {
            let mut state = self.lock();
            let height = state.frames.len();
            if depth.get() > height {
                return Err(Fault::with_baton(
                    IckError::runtime(ErrorCode::E632, format!("(#{} with {} pending)", depth, height)),
                    baton,
                ));
            }
            state.frames.split_off(height - depth.get())
        };

        let target = discarded.remove(0);
        discarded.into_iter().rev().for_each(ExecutionFrame::abort);
        debug!(label = %target.label, depth = depth.get(), "RESUME");

        match target.signal.send(Outcome::Resumed(baton)) {
            Ok(()) => Ok(()),
            Err(Outcome::Resumed(baton)) => Err(Fault::with_baton(
                IckError::runtime(ErrorCode::E778, format!("(nobody waiting at {})", target.label)),
                baton,
            )),
            Err(Outcome::Aborted) => Err(Fault::new(IckError::runtime(ErrorCode::E778, ""))),
        }
    }

    /// Abort up to `depth` frames. Returns how many there were.
    pub fn forget(&self, depth: usize) -> usize {
        let dropped = {
            let mut state = self.lock();
            let keep = state.frames.len().saturating_sub(depth);
            state.frames.split_off(keep)
        };
        let count = dropped.len();
        dropped.into_iter().rev().for_each(ExecutionFrame::abort);
        debug!(requested = depth, forgotten = count, "FORGET");
        count
    }

    /// Abort everything and finish the run cleanly.
    pub fn give_up(&self, baton: T) {
        let (frames, completion) = {
            let mut state = self.lock();
            (std::mem::take(&mut state.frames), state.completion.take())
        };
        debug!(pending = frames.len(), "GIVE UP");
        frames.into_iter().rev().for_each(ExecutionFrame::abort);
        if let Some(completion) = completion {
            let _ = completion.send(Ok(baton));
        }
    }

    /// Finish the run with `fault`, recording the pending labels first.
    pub fn fail(&self, fault: Fault<T>) {
        let (frames, completion) = {
            let mut state = self.lock();
            (std::mem::take(&mut state.frames), state.completion.take())
        };
        let trace: Vec<u16> = frames.iter().rev().map(|f| f.label.value()).collect();
        debug!(code = %fault.error.code, pending = frames.len(), "unit failed");
        frames.into_iter().rev().for_each(ExecutionFrame::abort);

        let fault = if fault.error.trace.is_empty() {
            fault.map_error(|error| error.with_trace(trace))
        } else {
            fault
        };
        match completion {
            Some(completion) => {
                let _ = completion.send(Err(fault));
            }
            None => trace!(code = %fault.error.code, "failure after the run had ended"),
        }
    }

    fn spawn_unit<F>(self: &Arc<Self>, baton: T, body: F)
    where
        F: FnOnce(T) -> UnitFuture<T> + Send + 'static,
    {
        let stack = Arc::clone(self);
        let unit = async move {
            let result = AssertUnwindSafe(async move { body(baton).await }).catch_unwind().await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(fault)) => stack.fail(fault),
                Err(_) => stack.fail(Fault::new(IckError::runtime(ErrorCode::E778, "(a unit panicked)"))),
            }
        };
        if let Err(error) = AsyncRuntime::spawn(unit) {
            self.fail(Fault::new(error));
        }
    }
}
