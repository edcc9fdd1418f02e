//! In-process transport stand-ins for exercising interceptors without
//! a network.
//!
//! [`EchoChannel`] plays the role of a trivial echo server: a unary
//! call answers with its own request, a duplex call echoes every
//! message written to it. The served-call counter increments when the
//! "server" actually processes a call, which makes it possible to
//! observe that a denied unary call still ran against the backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use crate::call::{
    ClientStreamingCall, DuplexStreamingCall, Metadata, ServerStreamingCall, UnaryCall,
};
use crate::status::Status;

/// An in-process echo backend producing genuine call objects.
#[derive(Clone, Default)]
pub struct EchoChannel {
    served: Arc<AtomicUsize>,
}

impl EchoChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls the backend has actually processed.
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// A unary call whose response is the request itself. The served
    /// counter increments when the response future runs, not when the
    /// call is created.
    pub fn unary<T: Send + 'static>(&self, request: T) -> UnaryCall<T> {
        let served = Arc::clone(&self.served);
        UnaryCall::new(
            Metadata::new(),
            Box::pin(async move {
                served.fetch_add(1, Ordering::SeqCst);
                Ok(request)
            }),
        )
    }

    /// A server-streaming call yielding the given responses in order.
    pub fn server_streaming<T: Send + 'static>(&self, responses: Vec<T>) -> ServerStreamingCall<T> {
        self.served.fetch_add(1, Ordering::SeqCst);
        ServerStreamingCall::new(
            Metadata::new(),
            Box::pin(futures::stream::iter(responses.into_iter().map(Ok))),
        )
    }

    /// A client-streaming call whose response, once the request stream
    /// is finished, is the list of messages the backend received.
    pub fn client_streaming<T: Send + 'static>(&self) -> ClientStreamingCall<T, Vec<T>> {
        self.served.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded();
        ClientStreamingCall::new(
            Metadata::new(),
            Box::pin(tx.sink_map_err(|_| Status::cancelled("request stream closed"))),
            Box::pin(async move { Ok(rx.collect::<Vec<T>>().await) }),
        )
    }

    /// A duplex call echoing every request back as a response.
    pub fn duplex<T: Send + 'static>(&self) -> DuplexStreamingCall<T, T> {
        self.served.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded();
        DuplexStreamingCall::new(
            Metadata::new(),
            Box::pin(tx.sink_map_err(|_| Status::cancelled("request stream closed"))),
            Box::pin(rx.map(Ok)),
        )
    }
}
