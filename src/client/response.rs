//! Completion handles returned by awaited calls.

use crate::correlator::{Completion, Registration, RequestCorrelator};
use crate::error::{ClientError, Result};
use crate::protocol::Reply;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Conversion from a decoded reply to a call's result type.
pub trait FromReply: Sized {
    fn from_reply(reply: Reply) -> Result<Self>;
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected("value", &other)),
        }
    }
}

impl FromReply for () {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Done => Ok(()),
            other => Err(unexpected("acknowledgement", &other)),
        }
    }
}

impl FromReply for u64 {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Counter(value) => Ok(value),
            other => Err(unexpected("counter", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> ClientError {
    ClientError::MalformedResponse(format!("expected {} reply, got {:?}", expected, got))
}

/// Drops the pending entry if the caller abandons the call.
struct PendingGuard {
    correlator: Arc<RequestCorrelator>,
    registration: Registration,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        // No-op once the call has completed.
        self.correlator.cancel(self.registration);
    }
}

enum State {
    Pending {
        completion: Completion,
        guard: PendingGuard,
    },
    Failed(ClientError),
    Done,
}

/// Eventual result of an awaited call.
///
/// Resolves exactly once: with the server's reply, the server's error, a
/// timeout, or a local failure. Dropping it before it resolves cancels the
/// call; its timers stop and a late reply is discarded.
#[must_use = "dropping a Response cancels the call"]
pub struct Response<T> {
    state: State,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Response<T> {
    pub(crate) fn pending(
        completion: Completion,
        correlator: Arc<RequestCorrelator>,
        registration: Registration,
    ) -> Self {
        Self {
            state: State::Pending {
                completion,
                guard: PendingGuard {
                    correlator,
                    registration,
                },
            },
            _marker: PhantomData,
        }
    }

    /// A call that failed before anything was sent.
    pub(crate) fn failed(error: ClientError) -> Self {
        Self {
            state: State::Failed(error),
            _marker: PhantomData,
        }
    }

    /// Correlation id of the call, if it was sent.
    pub fn correlation_id(&self) -> Option<u16> {
        match &self.state {
            State::Pending { guard, .. } => Some(guard.registration.id),
            _ => None,
        }
    }
}

impl<T: FromReply> Future for Response<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let State::Pending { completion, .. } = &mut this.state {
            let outcome = match Pin::new(completion).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(outcome)) => outcome.and_then(T::from_reply),
                // Sender dropped without a result: the call was torn down.
                Poll::Ready(Err(_)) => Err(ClientError::Shutdown),
            };
            this.state = State::Done;
            return Poll::Ready(outcome);
        }
        match std::mem::replace(&mut this.state, State::Done) {
            State::Failed(error) => Poll::Ready(Err(error)),
            _ => panic!("Response polled after completion"),
        }
    }
}

impl<T> std::fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Pending { .. } => "pending",
            State::Failed(_) => "failed",
            State::Done => "done",
        };
        f.debug_struct("Response").field("state", &state).finish()
    }
}
