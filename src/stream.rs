//! Generic stream decorators enforcing a fault policy.
//!
//! One reader decorator and one writer decorator cover all three
//! policies; the policy type parameter decides whether an operation is
//! denied, dropped, or passed through. The decorators add no suspension
//! points of their own and never retry: a denial is raised exactly once
//! at the operation it applies to.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::{Sink, Stream};

use crate::call::{MessageSink, MessageStream};
use crate::policy::{FaultPolicy, Verdict};
use crate::status::Status;

/// A message reader wrapping a real response stream.
///
/// Each logical read consults the policy once before advancing; a flag
/// flip while a read is in flight does not affect that read. Messages
/// the policy skips are consumed internally and never surface, so the
/// caller observes the original sequence minus the skipped items, in
/// order.
pub struct FaultStream<T, P> {
    inner: MessageStream<T>,
    policy: P,
    gate_passed: bool,
}

impl<T, P> FaultStream<T, P> {
    pub fn new(inner: MessageStream<T>, policy: P) -> Self {
        Self {
            inner,
            policy,
            gate_passed: false,
        }
    }
}

impl<T, P> Stream for FaultStream<T, P>
where
    P: FaultPolicy<T> + Unpin,
{
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.gate_passed {
            if let Verdict::Deny = this.policy.check_call() {
                tracing::trace!("read denied before advancing");
                return Poll::Ready(Some(Err(Status::unavailable(""))));
            }
            this.gate_passed = true;
        }

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(message)) => match this.policy.check_message(&message) {
                    Verdict::Allow => {
                        this.gate_passed = false;
                        return Poll::Ready(Some(Ok(message)));
                    }
                    Verdict::Deny => {
                        this.gate_passed = false;
                        tracing::trace!("read denied by message policy");
                        return Poll::Ready(Some(Err(Status::unavailable(""))));
                    }
                    Verdict::Skip => {
                        tracing::trace!("message dropped from response stream");
                        continue;
                    }
                },
                other => {
                    this.gate_passed = false;
                    return Poll::Ready(other);
                }
            }
        }
    }
}

/// A message writer wrapping a real request sink.
///
/// Writes are checked at `start_send`: a denied write fails with
/// `Unavailable` without reaching the peer, a skipped write reports
/// success without reaching the peer. Readiness and flushing delegate
/// untouched; completion is gated only by policies that deny closes
/// (the kill switch).
pub struct FaultSink<T, P> {
    inner: MessageSink<T>,
    policy: P,
    close_gate_passed: bool,
}

impl<T, P> FaultSink<T, P> {
    pub fn new(inner: MessageSink<T>, policy: P) -> Self {
        Self {
            inner,
            policy,
            close_gate_passed: false,
        }
    }
}

impl<T, P> Sink<T> for FaultSink<T, P>
where
    P: FaultPolicy<T> + Unpin,
{
    type Error = Status;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Status>> {
        self.get_mut().inner.as_mut().poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Status> {
        let this = self.get_mut();
        match this.policy.check_message(&item) {
            Verdict::Allow => this.inner.as_mut().start_send(item),
            Verdict::Deny => {
                tracing::trace!("write denied by policy");
                Err(Status::unavailable(""))
            }
            Verdict::Skip => {
                tracing::trace!("message dropped from request stream");
                Ok(())
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Status>> {
        self.get_mut().inner.as_mut().poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Status>> {
        let this = self.get_mut();
        if !this.close_gate_passed {
            if let Verdict::Deny = this.policy.check_close() {
                tracing::trace!("completion denied by policy");
                return Poll::Ready(Err(Status::unavailable("")));
            }
            this.close_gate_passed = true;
        }
        this.inner.as_mut().poll_close(cx)
    }
}
