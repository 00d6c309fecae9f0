use std::ops::ControlFlow;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::accumulator::Aggregate;
use crate::decoder::ChunkDecoder;
use crate::errors::ChatError;
use crate::event::{StreamEvent, parse_record};
use crate::model::{CallResult, ToolCallPayload};
use crate::transport::ChunkStream;

/// Incremental update delivered to the caller while a call streams.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// New assistant text plus everything received so far.
    Content { text: String, full_text: String },
    /// A tool invocation reported by the producer.
    ToolCall { payload: ToolCallPayload },
    /// Stream finished successfully.
    Done {
        full_text: String,
        tool_calls: Vec<ToolCallPayload>,
    },
}

/// Kind tag of a `Notification`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NotificationKind {
    Content,
    ToolCall,
    Done,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Content { .. } => NotificationKind::Content,
            Self::ToolCall { .. } => NotificationKind::ToolCall,
            Self::Done { .. } => NotificationKind::Done,
        }
    }
}

/// The receiving side of a sink is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("notification sink closed")]
pub struct SinkClosed;

/// Destination for notifications of one call.
///
/// A sink returning `SinkClosed` cancels the call.
#[async_trait::async_trait]
pub trait NotificationSink: Send {
    async fn notify(&mut self, notification: Notification) -> Result<(), SinkClosed>;
}

#[async_trait::async_trait]
impl NotificationSink for mpsc::Sender<Notification> {
    async fn notify(&mut self, notification: Notification) -> Result<(), SinkClosed> {
        self.send(notification).await.map_err(|_| SinkClosed)
    }
}

#[async_trait::async_trait]
impl NotificationSink for mpsc::UnboundedSender<Notification> {
    async fn notify(&mut self, notification: Notification) -> Result<(), SinkClosed> {
        self.send(notification).map_err(|_| SinkClosed)
    }
}

#[async_trait::async_trait]
impl NotificationSink for Vec<Notification> {
    async fn notify(&mut self, notification: Notification) -> Result<(), SinkClosed> {
        self.push(notification);
        Ok(())
    }
}

/// Adapts a closure into a `NotificationSink`. See [`sink_fn`].
pub struct FnSink<F>(F);

/// Wraps a closure so it can receive notifications.
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(Notification) + Send,
{
    FnSink(f)
}

#[async_trait::async_trait]
impl<F> NotificationSink for FnSink<F>
where
    F: FnMut(Notification) + Send,
{
    async fn notify(&mut self, notification: Notification) -> Result<(), SinkClosed> {
        (self.0)(notification);
        Ok(())
    }
}

/// What to do with a `data: ` record whose payload does not parse.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MalformedPolicy {
    /// Skip the record and keep streaming.
    #[default]
    Discard,
    /// Fail the call with `ChatError::Malformed`.
    Surface,
}

/// What to do when the body ends before a `done` or `error` event.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EndOfStreamPolicy {
    /// Return the accumulated output as a successful result.
    #[default]
    Lenient,
    /// Fail the call with `ChatError::PrematureEndOfStream`.
    Strict,
}

/// Per-call streaming behavior.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    pub malformed: MalformedPolicy,
    pub end_of_stream: EndOfStreamPolicy,
    /// Bounded notification buffer used by `AgentClient::start_stream`.
    pub stream_buffer_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            malformed: MalformedPolicy::default(),
            end_of_stream: EndOfStreamPolicy::default(),
            stream_buffer_capacity: 128,
        }
    }
}

impl StreamOptions {
    pub fn malformed(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    pub fn end_of_stream(mut self, policy: EndOfStreamPolicy) -> Self {
        self.end_of_stream = policy;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        if self.stream_buffer_capacity == 0 {
            return Err(ChatError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Handle used to cancel a running call.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Requests cancellation. The call stops reading chunks, releases the
    /// transport and fails with `ChatError::Cancelled`.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Lifecycle of one call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CallState {
    Streaming,
    Completed,
    Failed,
}

/// Consumes `chunks` until `done`, `error`, end of body or cancellation.
///
/// The chunk stream is owned here and dropped on every return path.
pub async fn drive<S>(
    chunks: ChunkStream,
    sink: &mut S,
    options: &StreamOptions,
    abort: &AbortHandle,
) -> Result<CallResult, ChatError>
where
    S: NotificationSink + ?Sized,
{
    let mut driver = CallDriver::new(sink, options, abort.subscribe());
    let result = driver.run(chunks).await;
    debug!(state = ?driver.state(), records = driver.records, "chat call finished");
    result
}

/// Resolves once the call is aborted. Never resolves if every handle is gone.
async fn aborted(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

enum Delivery {
    Delivered,
    SinkClosed,
    Aborted,
}

pub(crate) struct CallDriver<'a, S: ?Sized> {
    sink: &'a mut S,
    options: &'a StreamOptions,
    abort: watch::Receiver<bool>,
    decoder: ChunkDecoder,
    aggregate: Aggregate,
    state: CallState,
    records: u64,
}

type Step = ControlFlow<Result<CallResult, ChatError>>;

impl<'a, S> CallDriver<'a, S>
where
    S: NotificationSink + ?Sized,
{
    pub(crate) fn new(
        sink: &'a mut S,
        options: &'a StreamOptions,
        abort: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sink,
            options,
            abort,
            decoder: ChunkDecoder::new(),
            aggregate: Aggregate::new(),
            state: CallState::Streaming,
            records: 0,
        }
    }

    pub(crate) fn state(&self) -> CallState {
        self.state
    }

    fn abort_requested(&self) -> bool {
        *self.abort.borrow()
    }

    pub(crate) async fn run(&mut self, mut chunks: ChunkStream) -> Result<CallResult, ChatError> {
        loop {
            if self.abort_requested() {
                return self.cancel();
            }
            tokio::select! {
                biased;
                () = aborted(&mut self.abort) => return self.cancel(),
                next = chunks.next() => match next {
                    Some(Ok(chunk)) => {
                        for record in self.decoder.push_chunk(&chunk) {
                            if self.abort_requested() {
                                return self.cancel();
                            }
                            if let ControlFlow::Break(result) = self.handle_record(&record).await {
                                return result;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        self.state = CallState::Failed;
                        warn!(error = %err, "chat stream read failed");
                        return Err(err.into());
                    }
                    None => return self.end_of_stream(),
                }
            }
        }
    }

    /// Hands one notification to the sink. A sink that applies backpressure
    /// is raced against the abort signal.
    async fn deliver(&mut self, notification: Notification) -> Delivery {
        tokio::select! {
            biased;
            () = aborted(&mut self.abort) => Delivery::Aborted,
            delivered = self.sink.notify(notification) => match delivered {
                Ok(()) => Delivery::Delivered,
                Err(SinkClosed) => Delivery::SinkClosed,
            },
        }
    }

    async fn handle_record(&mut self, record: &str) -> Step {
        self.records = self.records.saturating_add(1);
        match parse_record(record) {
            Ok(Some(event)) => self.dispatch(event).await,
            Ok(None) => ControlFlow::Continue(()),
            Err(malformed) => match self.options.malformed {
                MalformedPolicy::Discard => {
                    debug!(record = %malformed.record, reason = %malformed.reason, "discarding malformed event record");
                    ControlFlow::Continue(())
                }
                MalformedPolicy::Surface => {
                    self.state = CallState::Failed;
                    ControlFlow::Break(Err(malformed.into()))
                }
            },
        }
    }

    async fn dispatch(&mut self, event: StreamEvent) -> Step {
        self.aggregate.apply(&event);
        let notification = match event {
            StreamEvent::Content { text } => {
                debug!(bytes = text.len(), total = self.aggregate.full_text().len(), "content event");
                Notification::Content {
                    text,
                    full_text: self.aggregate.full_text().to_string(),
                }
            }
            StreamEvent::ToolCall { payload } => {
                debug!(count = self.aggregate.tool_calls().len(), "tool call event");
                Notification::ToolCall { payload }
            }
            StreamEvent::Done => {
                let notification = Notification::Done {
                    full_text: self.aggregate.full_text().to_string(),
                    tool_calls: self.aggregate.tool_calls().to_vec(),
                };
                return match self.deliver(notification).await {
                    Delivery::Aborted => ControlFlow::Break(self.cancel()),
                    Delivery::SinkClosed => {
                        debug!("notification sink closed before completion");
                        ControlFlow::Break(Ok(self.complete()))
                    }
                    Delivery::Delivered => ControlFlow::Break(Ok(self.complete())),
                };
            }
            StreamEvent::Error { message } => {
                self.state = CallState::Failed;
                warn!(%message, "agent reported stream error");
                return ControlFlow::Break(Err(ChatError::protocol(message)));
            }
        };

        match self.deliver(notification).await {
            Delivery::Delivered => ControlFlow::Continue(()),
            Delivery::SinkClosed | Delivery::Aborted => ControlFlow::Break(self.cancel()),
        }
    }

    fn end_of_stream(&mut self) -> Result<CallResult, ChatError> {
        let decoder = std::mem::take(&mut self.decoder);
        if let Some(tail) = decoder.finish() {
            debug!(tail = %tail, "discarding unterminated trailing record");
        }
        match self.options.end_of_stream {
            EndOfStreamPolicy::Lenient => {
                warn!(records = self.records, "chat stream ended without done event; returning accumulated output");
                Ok(self.complete())
            }
            EndOfStreamPolicy::Strict => {
                self.state = CallState::Failed;
                Err(ChatError::PrematureEndOfStream)
            }
        }
    }

    fn complete(&mut self) -> CallResult {
        self.state = CallState::Completed;
        let result = std::mem::take(&mut self.aggregate).into_result();
        info!(chars = result.message.len(), tool_calls = result.tool_calls.len(), "chat stream completed");
        result
    }

    fn cancel(&mut self) -> Result<CallResult, ChatError> {
        self.state = CallState::Failed;
        debug!(records = self.records, "chat stream cancelled");
        Err(ChatError::Cancelled)
    }
}
