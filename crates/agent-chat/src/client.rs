use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ClientConfig;
use crate::dispatch::{AbortHandle, Notification, NotificationSink, StreamOptions, drive};
use crate::errors::ChatError;
use crate::model::{CallResult, ChatRequest, ChatTurn};
use crate::transport::{HttpTransport, Transport};

/// Entry point for chat calls against one transport.
///
/// Every call owns its own decoder and aggregate; a client can run any number
/// of calls concurrently.
pub struct AgentClient<T: ?Sized = HttpTransport> {
    transport: Arc<T>,
    options: StreamOptions,
}

impl<T: ?Sized> Clone for AgentClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            options: self.options.clone(),
        }
    }
}

impl AgentClient<HttpTransport> {
    /// Creates a client talking HTTP to the configured server.
    pub fn http(config: ClientConfig) -> Result<Self, ChatError> {
        Ok(Self::new(HttpTransport::new(config)?))
    }

    /// Sends a non-streaming chat request.
    pub async fn chat(
        &self,
        message: impl Into<String>,
        history: &[ChatTurn],
    ) -> Result<CallResult, ChatError> {
        self.transport
            .chat(&ChatRequest::new(message, history.to_vec()))
            .await
    }

    /// Checks the server health endpoint.
    pub async fn health(&self) -> Result<(), ChatError> {
        Ok(self.transport.health().await?)
    }
}

impl<T: Transport> AgentClient<T> {
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }
}

impl<T: Transport + ?Sized> AgentClient<T> {
    pub fn from_arc(transport: Arc<T>) -> Self {
        Self {
            transport,
            options: StreamOptions::default(),
        }
    }

    /// Replaces the streaming options used by subsequent calls.
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Streams one chat call, delivering notifications to `sink` as events
    /// arrive, and returns the aggregated result.
    pub async fn chat_stream<S>(
        &self,
        message: impl Into<String>,
        history: &[ChatTurn],
        sink: &mut S,
    ) -> Result<CallResult, ChatError>
    where
        S: NotificationSink + ?Sized,
    {
        let request = ChatRequest::new(message, history.to_vec());
        self.send(&request, sink, &AbortHandle::new()).await
    }

    /// Like `chat_stream`, taking a prepared request and a cancellation handle.
    pub async fn send<S>(
        &self,
        request: &ChatRequest,
        sink: &mut S,
        abort: &AbortHandle,
    ) -> Result<CallResult, ChatError>
    where
        S: NotificationSink + ?Sized,
    {
        request.validate()?;
        self.options.validate()?;
        let chunks = self.transport.open(request).await?;
        drive(chunks, sink, &self.options, abort).await
    }
}

impl<T: Transport + ?Sized + 'static> AgentClient<T> {
    /// Opens the stream and drives it on a background task.
    ///
    /// Transport failures (including a non-success status) are returned here,
    /// before any notification is produced.
    pub async fn start_stream(&self, request: ChatRequest) -> Result<ChatStream, ChatError> {
        request.validate()?;
        self.options.validate()?;
        let chunks = self.transport.open(&request).await?;

        let (tx, rx) = mpsc::channel(self.options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let abort_handle = AbortHandle::new();
        let options = self.options.clone();
        let task_abort = abort_handle.clone();
        tokio::spawn(async move {
            let mut tx = tx;
            let result = drive(chunks, &mut tx, &options, &task_abort).await;
            drop(tx);
            if final_tx.send(result).is_err() {
                debug!("chat stream handle dropped before result");
            }
        });

        Ok(ChatStream {
            rx,
            final_rx,
            abort_handle,
            saw_done: false,
        })
    }
}

/// Handle for a call started with `AgentClient::start_stream`.
///
/// Dropping the handle cancels the call.
pub struct ChatStream {
    rx: mpsc::Receiver<Notification>,
    final_rx: oneshot::Receiver<Result<CallResult, ChatError>>,
    abort_handle: AbortHandle,
    saw_done: bool,
}

impl ChatStream {
    /// Returns a handle that can cancel the call.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next notification. Returns `None` once the call ended.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        let notification = self.rx.recv().await;
        if let Some(Notification::Done { .. }) = &notification {
            self.saw_done = true;
        }
        notification
    }

    /// Drains remaining notifications and returns the call result.
    pub async fn finish(mut self) -> Result<CallResult, ChatError> {
        if !self.saw_done {
            while self.rx.recv().await.is_some() {}
        }
        match (&mut self.final_rx).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Internal(
                "chat task ended without a result".into(),
            )),
        }
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{EndOfStreamPolicy, NotificationKind};
    use crate::errors::TransportError;
    use crate::transport::ChunkStream;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Status(u16),
        Chunks(Vec<&'static str>),
        ChunksThenPending(Vec<&'static str>),
    }

    struct ScriptedTransport {
        script: Script,
        opened: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Script) -> Self {
            Self {
                script,
                opened: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn to_items(parts: &[&'static str]) -> Vec<Result<bytes::Bytes, TransportError>> {
        parts
            .iter()
            .map(|p| Ok(bytes::Bytes::from_static(p.as_bytes())))
            .collect()
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().expect("lock").push(request.clone());
            match &self.script {
                Script::Status(code) => Err(TransportError::status(*code, "nope")),
                Script::Chunks(parts) => Ok(Box::pin(stream::iter(to_items(parts)))),
                Script::ChunksThenPending(parts) => {
                    let head = stream::iter(to_items(parts));
                    Ok(Box::pin(futures::StreamExt::chain(head, stream::pending())))
                }
            }
        }
    }

    const CONVERSATION: &[&str] = &[
        "data: {\"type\":\"content\",\"content\":\"Two \"}\n\n",
        "data: {\"type\":\"tool_call\",\"tool_call\":{\"tool\":\"list_clusters\",\"result\":\"[\\\"a\\\",\\\"b\\\"]\"}}\n\n",
        "data: {\"type\":\"content\",\"content\":\"clusters\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    ];

    #[tokio::test]
    async fn chat_stream_returns_aggregate_and_forwards_history() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(CONVERSATION.to_vec())));
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let mut sink: Vec<Notification> = Vec::new();
        let result = client
            .chat_stream("how many clusters?", &history, &mut sink)
            .await
            .expect("result");

        assert_eq!(result.message, "Two clusters");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(sink.len(), 4);
        let requests = client.transport().requests.lock().expect("lock");
        assert_eq!(requests[0].message, "how many clusters?");
        assert_eq!(requests[0].history, history);
    }

    #[tokio::test]
    async fn non_success_status_fails_before_streaming() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Status(500)));
        let mut sink: Vec<Notification> = Vec::new();
        let err = client
            .chat_stream("hi", &[], &mut sink)
            .await
            .expect_err("status error");
        assert_eq!(err, ChatError::Transport(TransportError::status(500, "nope")));
        assert!(sink.is_empty());

        let started = client.start_stream(ChatRequest::new("hi", Vec::new())).await;
        assert!(matches!(started, Err(ChatError::Transport(TransportError::Status { status: 500, .. }))));
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_opening_transport() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(Vec::new())));
        let mut sink: Vec<Notification> = Vec::new();
        let err = client.chat_stream("   ", &[], &mut sink).await;
        assert!(matches!(err, Err(ChatError::Validation(_))));
        assert_eq!(client.transport().opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_calls_do_not_share_state() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(CONVERSATION.to_vec())));
        let mut first_sink: Vec<Notification> = Vec::new();
        let mut second_sink: Vec<Notification> = Vec::new();
        let first = client.chat_stream("q", &[], &mut first_sink).await.expect("first");
        let second = client.chat_stream("q", &[], &mut second_sink).await.expect("second");
        assert_eq!(first, second);
        assert_eq!(first.message, "Two clusters");
        assert_eq!(first_sink, second_sink);
        assert_eq!(client.transport().opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(CONVERSATION.to_vec())));
        let a = client.start_stream(ChatRequest::new("a", Vec::new())).await.expect("a");
        let b = client.start_stream(ChatRequest::new("b", Vec::new())).await.expect("b");
        let (ra, rb) = tokio::join!(a.finish(), b.finish());
        assert_eq!(ra.expect("a result").message, "Two clusters");
        assert_eq!(rb.expect("b result").message, "Two clusters");
    }

    #[tokio::test]
    async fn start_stream_yields_notifications_then_result() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(CONVERSATION.to_vec())));
        let mut stream = client
            .start_stream(ChatRequest::new("q", Vec::new()))
            .await
            .expect("start");
        let mut kinds = Vec::new();
        while let Some(notification) = stream.next_notification().await {
            kinds.push(notification.kind());
        }
        assert_eq!(
            kinds,
            vec![
                NotificationKind::Content,
                NotificationKind::ToolCall,
                NotificationKind::Content,
                NotificationKind::Done,
            ]
        );
        assert_eq!(stream.finish().await.expect("finish").message, "Two clusters");
    }

    #[tokio::test]
    async fn start_stream_error_event_surfaces_in_finish() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(vec![
            "data: {\"type\":\"content\",\"content\":\"a\"}\n",
            "data: {\"type\":\"error\",\"error\":\"boom\"}\n",
        ])));
        let stream = client
            .start_stream(ChatRequest::new("q", Vec::new()))
            .await
            .expect("start");
        assert_eq!(
            stream.finish().await,
            Err(ChatError::Protocol { message: "boom".into() })
        );
    }

    #[tokio::test]
    async fn abort_handle_cancels_running_stream() {
        let client = AgentClient::new(ScriptedTransport::new(Script::ChunksThenPending(vec![
            "data: {\"type\":\"content\",\"content\":\"partial\"}\n",
        ])));
        let mut stream = client
            .start_stream(ChatRequest::new("q", Vec::new()))
            .await
            .expect("start");
        let first = stream.next_notification().await.expect("first");
        assert_eq!(first.kind(), NotificationKind::Content);
        stream.abort_handle().abort();
        assert_eq!(stream.finish().await, Err(ChatError::Cancelled));
    }

    #[tokio::test]
    async fn strict_policy_applies_to_client_calls() {
        let client = AgentClient::new(ScriptedTransport::new(Script::Chunks(vec![
            "data: {\"type\":\"content\",\"content\":\"x\"}\n",
        ])))
        .with_options(StreamOptions::default().end_of_stream(EndOfStreamPolicy::Strict));
        let mut sink: Vec<Notification> = Vec::new();
        let err = client.chat_stream("q", &[], &mut sink).await;
        assert_eq!(err, Err(ChatError::PrematureEndOfStream));
    }
}
