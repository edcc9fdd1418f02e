//! Client interceptors, one per fault policy.
//!
//! Each interceptor exposes one adapter method per RPC shape it
//! affects. An adapter consumes a call object and returns one of the
//! same type with the relevant stream sides decorated; headers move
//! over untouched. Adapters compose, so interceptors can be chained in
//! any order, and every adapter builds fresh decorators so concurrent
//! calls never share stream-level state.
//!
//! Target message types are fixed by the interceptor's type parameters
//! at construction. A call whose request or response type differs
//! simply never passes through that interceptor's adapters, which is
//! how this harness answers the "only affect calls of interest"
//! requirement without runtime type comparisons.

use crate::call::{
    CallShape, ClientStreamingCall, DuplexStreamingCall, ResponseFuture, ServerStreamingCall,
    UnaryCall,
};
use crate::policy::{AvailabilitySwitch, Conditional, KillSwitch, SkipMatching};
use crate::status::Status;
use crate::stream::{FaultSink, FaultStream};

/// Whole-call kill switch: one shared flag gates every decorated
/// operation on every shape while it is off.
#[derive(Clone, Default)]
pub struct ControlledAvailability {
    policy: KillSwitch,
}

impl ControlledAvailability {
    pub fn new() -> Self {
        Self {
            policy: KillSwitch::new(),
        }
    }

    /// Handle for flipping availability from test code.
    pub fn switch(&self) -> AvailabilitySwitch {
        self.policy.switch()
    }

    /// Decorate a unary call.
    ///
    /// The real call has already been issued by the time this adapter
    /// runs; availability is checked only when the response is awaited.
    /// A denied response still lets the backend finish processing the
    /// call on a background task, so server-side effects of "failed"
    /// calls are preserved. Awaiting a denied response therefore
    /// requires a tokio runtime.
    pub fn unary<Res: Send + 'static>(&self, call: UnaryCall<Res>) -> UnaryCall<Res> {
        tracing::debug!(shape = %CallShape::Unary, "decorating call");
        let (headers, response) = call.into_parts();
        UnaryCall::new(headers, gate_response(self.switch(), response))
    }

    /// Decorate a client-streaming call: writes are gated by the flag,
    /// and the response behaves like a decorated unary response.
    pub fn client_streaming<Req, Res>(
        &self,
        call: ClientStreamingCall<Req, Res>,
    ) -> ClientStreamingCall<Req, Res>
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        tracing::debug!(shape = %CallShape::ClientStreaming, "decorating call");
        let (headers, requests, response) = call.into_parts();
        ClientStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.policy.clone())),
            gate_response(self.switch(), response),
        )
    }

    /// Decorate a server-streaming call: reads are gated by the flag.
    pub fn server_streaming<Res: Send + 'static>(
        &self,
        call: ServerStreamingCall<Res>,
    ) -> ServerStreamingCall<Res> {
        tracing::debug!(shape = %CallShape::ServerStreaming, "decorating call");
        let (headers, responses) = call.into_parts();
        ServerStreamingCall::new(
            headers,
            Box::pin(FaultStream::new(responses, self.policy.clone())),
        )
    }

    /// Decorate a duplex call: both sides check the same flag,
    /// independently per operation.
    pub fn duplex_streaming<Req, Res>(
        &self,
        call: DuplexStreamingCall<Req, Res>,
    ) -> DuplexStreamingCall<Req, Res>
    where
        Req: Send + 'static,
        Res: Send + 'static,
    {
        tracing::debug!(shape = %CallShape::DuplexStreaming, "decorating call");
        let (headers, requests, responses) = call.into_parts();
        DuplexStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.policy.clone())),
            Box::pin(FaultStream::new(responses, self.policy.clone())),
        )
    }
}

/// Defer the availability check to the moment the response is awaited.
/// When denied, the real response future is spawned off so the backend
/// still observes the call; only the caller's view of it fails.
fn gate_response<Res: Send + 'static>(
    switch: AvailabilitySwitch,
    response: ResponseFuture<Res>,
) -> ResponseFuture<Res> {
    Box::pin(async move {
        if !switch.is_available() {
            tracing::trace!("response denied; backend call continues in background");
            tokio::spawn(async move {
                let _ = response.await;
            });
            return Err(Status::unavailable(""));
        }
        response.await
    })
}

/// Content-conditional availability for streaming shapes: operations
/// touching a message that fails its predicate raise `Unavailable`.
/// Unary calls are not affected by this interceptor.
pub struct ConditionalAvailability<Req, Res> {
    request: Conditional<Req>,
    response: Conditional<Res>,
}

impl<Req, Res> ConditionalAvailability<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Predicates return true for messages that are allowed through.
    pub fn new(
        request: impl Fn(&Req) -> bool + Send + Sync + 'static,
        response: impl Fn(&Res) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            request: Conditional::new(request),
            response: Conditional::new(response),
        }
    }

    pub fn client_streaming(
        &self,
        call: ClientStreamingCall<Req, Res>,
    ) -> ClientStreamingCall<Req, Res> {
        tracing::debug!(shape = %CallShape::ClientStreaming, "decorating call");
        let (headers, requests, response) = call.into_parts();
        ClientStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.request.clone())),
            response,
        )
    }

    pub fn server_streaming(&self, call: ServerStreamingCall<Res>) -> ServerStreamingCall<Res> {
        tracing::debug!(shape = %CallShape::ServerStreaming, "decorating call");
        let (headers, responses) = call.into_parts();
        ServerStreamingCall::new(
            headers,
            Box::pin(FaultStream::new(responses, self.response.clone())),
        )
    }

    pub fn duplex_streaming(
        &self,
        call: DuplexStreamingCall<Req, Res>,
    ) -> DuplexStreamingCall<Req, Res> {
        tracing::debug!(shape = %CallShape::DuplexStreaming, "decorating call");
        let (headers, requests, responses) = call.into_parts();
        DuplexStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.request.clone())),
            Box::pin(FaultStream::new(responses, self.response.clone())),
        )
    }
}

/// Silent message loss for streaming shapes: matched messages are
/// consumed and never forwarded, with no error raised. Unary calls are
/// not affected by this interceptor.
pub struct SkipStreamMessages<Req, Res> {
    request: SkipMatching<Req>,
    response: SkipMatching<Res>,
}

impl<Req, Res> SkipStreamMessages<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Predicates return true for messages to drop.
    pub fn new(
        request: impl Fn(&Req) -> bool + Send + Sync + 'static,
        response: impl Fn(&Res) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            request: SkipMatching::new(request),
            response: SkipMatching::new(response),
        }
    }

    pub fn client_streaming(
        &self,
        call: ClientStreamingCall<Req, Res>,
    ) -> ClientStreamingCall<Req, Res> {
        tracing::debug!(shape = %CallShape::ClientStreaming, "decorating call");
        let (headers, requests, response) = call.into_parts();
        ClientStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.request.clone())),
            response,
        )
    }

    pub fn server_streaming(&self, call: ServerStreamingCall<Res>) -> ServerStreamingCall<Res> {
        tracing::debug!(shape = %CallShape::ServerStreaming, "decorating call");
        let (headers, responses) = call.into_parts();
        ServerStreamingCall::new(
            headers,
            Box::pin(FaultStream::new(responses, self.response.clone())),
        )
    }

    pub fn duplex_streaming(
        &self,
        call: DuplexStreamingCall<Req, Res>,
    ) -> DuplexStreamingCall<Req, Res> {
        tracing::debug!(shape = %CallShape::DuplexStreaming, "decorating call");
        let (headers, requests, responses) = call.into_parts();
        DuplexStreamingCall::new(
            headers,
            Box::pin(FaultSink::new(requests, self.request.clone())),
            Box::pin(FaultStream::new(responses, self.response.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;
    use crate::testing::EchoChannel;

    #[tokio::test]
    async fn test_unary_denied_while_switch_off() {
        let channel = EchoChannel::new();
        let interceptor = ControlledAvailability::new();
        let switch = interceptor.switch();

        switch.set(false);
        let call = interceptor.unary(channel.unary(7u32));
        assert_eq!(call.response().await.unwrap_err().code(), Code::Unavailable);

        switch.set(true);
        let call = interceptor.unary(channel.unary(7u32));
        assert_eq!(call.response().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_client_streaming_gates_writes_and_response() {
        let channel = EchoChannel::new();
        let interceptor = ControlledAvailability::new();
        let switch = interceptor.switch();

        let mut call = interceptor.client_streaming(channel.client_streaming::<u32>());
        call.send(1).await.unwrap();

        switch.set(false);
        assert_eq!(call.send(2).await.unwrap_err().code(), Code::Unavailable);

        switch.set(true);
        call.send(3).await.unwrap();
        call.finish().await.unwrap();
        assert_eq!(call.response().await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_server_streaming_reads_gated_by_switch() {
        let channel = EchoChannel::new();
        let interceptor = ControlledAvailability::new();
        let switch = interceptor.switch();

        let mut call = interceptor.server_streaming(channel.server_streaming(vec![1u32, 2]));
        assert_eq!(call.next().await.unwrap().unwrap(), 1);

        switch.set(false);
        assert_eq!(
            call.next().await.unwrap().unwrap_err().code(),
            Code::Unavailable
        );

        switch.set(true);
        assert_eq!(call.next().await.unwrap().unwrap(), 2);
        assert!(call.next().await.is_none());
    }

    #[tokio::test]
    async fn test_conditional_duplex_sides_are_independent() {
        let channel = EchoChannel::new();
        // requests capped at 10, every echoed response allowed
        let interceptor = ConditionalAvailability::new(|n: &u32| *n < 10, |_: &u32| true);

        let mut call = interceptor.duplex_streaming(channel.duplex::<u32>());
        call.send(1).await.unwrap();
        assert_eq!(call.next().await.unwrap().unwrap(), 1);

        assert_eq!(call.send(10).await.unwrap_err().code(), Code::Unavailable);

        call.send(2).await.unwrap();
        assert_eq!(call.next().await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_skip_drops_writes_silently() {
        let channel = EchoChannel::new();
        let interceptor = SkipStreamMessages::new(|n: &u32| *n % 2 == 0, |_: &u32| false);

        let mut call = interceptor.duplex_streaming(channel.duplex::<u32>());
        for n in 1..=5 {
            call.send(n).await.unwrap();
        }
        call.finish().await.unwrap();

        let mut echoed = Vec::new();
        while let Some(item) = call.next().await {
            echoed.push(item.unwrap());
        }
        assert_eq!(echoed, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_interceptors_chain() {
        let channel = EchoChannel::new();
        let kill = ControlledAvailability::new();
        let skip = SkipStreamMessages::new(|_: &u32| false, |n: &u32| *n == 2);

        let mut call =
            kill.duplex_streaming(skip.duplex_streaming(channel.duplex::<u32>()));
        for n in 1..=3 {
            call.send(n).await.unwrap();
        }
        call.finish().await.unwrap();

        assert_eq!(call.next().await.unwrap().unwrap(), 1);
        // 2 is skipped on the response side by the inner interceptor
        assert_eq!(call.next().await.unwrap().unwrap(), 3);

        let switch = kill.switch();
        switch.set(false);
        assert_eq!(
            call.next().await.unwrap().unwrap_err().code(),
            Code::Unavailable
        );
    }
}
