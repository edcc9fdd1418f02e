//! Client-side call objects, one per RPC shape.
//!
//! A call object owns the streams the caller interacts with: a request
//! sink, a response stream, or a deferred response, depending on shape.
//! Interceptors take a call apart with `into_parts`, wrap the stream
//! sides, and rebuild the same external type with `new` — response
//! headers are moved over untouched so callers cannot tell a decorated
//! call from a raw one.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt};

use crate::status::Status;

/// Response headers delivered alongside a call.
pub type Metadata = HashMap<String, String>;

/// A stream of inbound messages, each read yielding a message or a status.
pub type MessageStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// A sink of outbound messages; write and completion failures carry a status.
pub type MessageSink<T> = Pin<Box<dyn Sink<T, Error = Status> + Send>>;

/// The deferred single response of a unary or client-streaming call.
pub type ResponseFuture<T> = Pin<Box<dyn Future<Output = Result<T, Status>> + Send>>;

/// The four RPC call patterns. Used for trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client_streaming",
            CallShape::ServerStreaming => "server_streaming",
            CallShape::DuplexStreaming => "duplex_streaming",
        };
        f.write_str(name)
    }
}

/// A single-request, single-response call.
pub struct UnaryCall<Res> {
    headers: Metadata,
    response: ResponseFuture<Res>,
}

impl<Res> UnaryCall<Res> {
    pub fn new(headers: Metadata, response: ResponseFuture<Res>) -> Self {
        Self { headers, response }
    }

    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    /// Await the response. Faults injected on this call surface here.
    pub async fn response(self) -> Result<Res, Status> {
        self.response.await
    }

    pub fn into_parts(self) -> (Metadata, ResponseFuture<Res>) {
        (self.headers, self.response)
    }
}

/// A streaming-request, single-response call.
pub struct ClientStreamingCall<Req, Res> {
    headers: Metadata,
    requests: MessageSink<Req>,
    response: ResponseFuture<Res>,
}

impl<Req, Res> ClientStreamingCall<Req, Res> {
    pub fn new(headers: Metadata, requests: MessageSink<Req>, response: ResponseFuture<Res>) -> Self {
        Self {
            headers,
            requests,
            response,
        }
    }

    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    pub async fn send(&mut self, message: Req) -> Result<(), Status> {
        self.requests.send(message).await
    }

    /// Signal the end of the request stream.
    pub async fn finish(&mut self) -> Result<(), Status> {
        self.requests.close().await
    }

    pub async fn response(self) -> Result<Res, Status> {
        self.response.await
    }

    pub fn into_parts(self) -> (Metadata, MessageSink<Req>, ResponseFuture<Res>) {
        (self.headers, self.requests, self.response)
    }
}

/// A single-request, streaming-response call.
pub struct ServerStreamingCall<Res> {
    headers: Metadata,
    responses: MessageStream<Res>,
}

impl<Res> ServerStreamingCall<Res> {
    pub fn new(headers: Metadata, responses: MessageStream<Res>) -> Self {
        Self { headers, responses }
    }

    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    /// Advance the response stream. `None` means the server is done.
    pub async fn next(&mut self) -> Option<Result<Res, Status>> {
        self.responses.next().await
    }

    pub fn into_parts(self) -> (Metadata, MessageStream<Res>) {
        (self.headers, self.responses)
    }
}

/// A streaming-request, streaming-response call.
pub struct DuplexStreamingCall<Req, Res> {
    headers: Metadata,
    requests: MessageSink<Req>,
    responses: MessageStream<Res>,
}

impl<Req, Res> DuplexStreamingCall<Req, Res> {
    pub fn new(headers: Metadata, requests: MessageSink<Req>, responses: MessageStream<Res>) -> Self {
        Self {
            headers,
            requests,
            responses,
        }
    }

    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    pub async fn send(&mut self, message: Req) -> Result<(), Status> {
        self.requests.send(message).await
    }

    pub async fn finish(&mut self) -> Result<(), Status> {
        self.requests.close().await
    }

    pub async fn next(&mut self) -> Option<Result<Res, Status>> {
        self.responses.next().await
    }

    pub fn into_parts(self) -> (Metadata, MessageSink<Req>, MessageStream<Res>) {
        (self.headers, self.requests, self.responses)
    }
}
