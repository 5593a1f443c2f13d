//! Message relay: owns the chat transport for the life of the process.
//!
//! Lifecycle `Idle -> Initializing -> Running -> Draining -> Stopped`,
//! published on a watch channel. While running, inbound messages are handled
//! one at a time in arrival order; each yields exactly one visible outcome
//! (answer chunks, a command reply, or one apology). Background tasks (the
//! tool server) are supervised: any of them exiting starts the drain, and all
//! of them are cancelled and joined before `run` returns. Messages still
//! buffered when the drain starts get a short notice asking to resend.

use crate::agent::{AgentInvoker, AgentResponse};
use crate::channels::{ChatTransport, InboundMessage, OutboundChunk, TransportError};
use crate::config::RelayConfig;
use crate::tools::panic_message;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Marker some agents put before their final answer.
pub const FINAL_ANSWER: &str = "FINAL_ANSWER:";

pub const START_GREETING: &str = "Hello! I'm your workspace assistant.\n\
I can send emails, create and fill Google Sheets, and share files.\n\
Just tell me what you need.";

const APOLOGY_PREFIX: &str = "Sorry, I encountered an error while processing your request: ";
const EMPTY_ANSWER: &str = "I have nothing to add to that.";
const RESTART_NOTICE: &str =
    "I'm restarting and couldn't get to this message. Please send it again in a moment.";
const INBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Initializing,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("fatal startup error: {0}")]
    FatalStartup(#[source] TransportError),
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Time an in-flight message may keep running once draining starts.
    pub grace_period: Duration,
    /// Per-task join timeout during shutdown; overrunning tasks are aborted.
    pub join_timeout: Duration,
    pub max_message_chars: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            grace_period: Duration::from_secs(config.grace_period_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
            max_message_chars: config.max_message_chars.max(1),
        }
    }
}

/// A supervised task: cancelled through its token, observed through `exited`.
pub struct BackgroundTask {
    name: String,
    cancel: CancellationToken,
    exited: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl BackgroundTask {
    /// Spawn `f(cancel)`. The task should return once `cancel` fires.
    pub fn spawn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let exited = CancellationToken::new();
        let exit_guard = exited.clone().drop_guard();
        let fut = f(cancel.clone());
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let _exit_guard = exit_guard;
            let result = fut.await;
            match &result {
                Ok(()) => log::info!("relay: background task {} finished", task_name),
                Err(e) => log::error!("relay: background task {} failed: {:#}", task_name, e),
            }
            result
        });
        Self {
            name,
            cancel,
            exited,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the task has finished (normally, with an error, or by panic).
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` before aborting.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        let mut handle = self.handle;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(_)) => log::debug!("relay: background task {} joined", self.name),
            Ok(Err(e)) => log::warn!("relay: background task {} ended abnormally: {}", self.name, e),
            Err(_) => {
                log::warn!(
                    "relay: background task {} did not stop within {:?}, aborting",
                    self.name,
                    timeout
                );
                handle.abort();
            }
        }
    }
}

/// Drives one transport and one agent invoker.
pub struct Relay<T: ChatTransport> {
    transport: Arc<T>,
    handler: Arc<MessageHandler<T>>,
    settings: RelaySettings,
    background: Vec<BackgroundTask>,
    state: watch::Sender<RelayState>,
}

impl<T: ChatTransport> Relay<T> {
    pub fn new(transport: Arc<T>, invoker: AgentInvoker, settings: RelaySettings) -> Self {
        let handler = Arc::new(MessageHandler {
            transport: transport.clone(),
            invoker,
            max_chars: settings.max_message_chars.max(1),
        });
        let (state, _) = watch::channel(RelayState::Idle);
        Self {
            transport,
            handler,
            settings,
            background: Vec::new(),
            state,
        }
    }

    /// Supervise `task` alongside the transport.
    pub fn with_background(mut self, task: BackgroundTask) -> Self {
        self.background.push(task);
        self
    }

    /// Subscribe to lifecycle changes.
    pub fn state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: RelayState) {
        log::debug!("relay: {:?} -> {:?}", *self.state.borrow(), next);
        self.state.send_replace(next);
    }

    /// Run until `shutdown` resolves, a background task exits, or the inbound stream closes.
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), RelayError>
    where
        S: Future<Output = ()>,
    {
        self.set_state(RelayState::Initializing);
        if let Err(e) = self.transport.connect().await {
            log::error!("relay: {} transport failed to connect: {}", self.transport.id(), e);
            self.stop_background().await;
            self.set_state(RelayState::Stopped);
            return Err(RelayError::FatalStartup(e));
        }

        let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let receive_cancel = CancellationToken::new();
        let mut receive_task = self
            .transport
            .clone()
            .start_inbound(inbound_tx, receive_cancel.clone());
        self.set_state(RelayState::Running);
        log::info!("relay: running on {}", self.transport.id());

        let mut background_exit: BoxFuture<'static, String> = if self.background.is_empty() {
            future::pending().boxed()
        } else {
            let watchers = self.background.iter().map(|task| {
                let exited = task.exited.clone();
                let name = task.name.clone();
                async move {
                    exited.cancelled().await;
                    name
                }
                .boxed()
            });
            future::select_all(watchers).map(|(name, _, _)| name).boxed()
        };

        tokio::pin!(shutdown);
        let mut in_flight: Option<InFlight> = None;
        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => break "shutdown requested".to_string(),
                name = &mut background_exit => break format!("background task {} exited", name),
                step = async {
                    match in_flight.as_mut() {
                        Some(InFlight::Responding(fut)) => Step::Ready(fut.await),
                        Some(InFlight::Delivering(fut)) => {
                            fut.await;
                            Step::Delivered
                        }
                        None => future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = match step {
                        Step::Ready(chunks) => Some(InFlight::Delivering(self.deliver(chunks))),
                        Step::Delivered => None,
                    };
                }
                received = inbound_rx.recv(), if in_flight.is_none() => match received {
                    Some(msg) => {
                        log::info!("relay: message from chat {}", msg.chat_id);
                        let handler = self.handler.clone();
                        in_flight = Some(InFlight::Responding(
                            async move { handler.respond(msg).await }.boxed(),
                        ));
                    }
                    None => break "inbound stream closed".to_string(),
                },
            }
        };

        log::info!("relay: draining ({})", reason);
        self.set_state(RelayState::Draining);
        receive_cancel.cancel();
        self.transport.stop();

        match in_flight.take() {
            Some(InFlight::Responding(fut)) => {
                match tokio::time::timeout(self.settings.grace_period, fut).await {
                    Ok(chunks) => {
                        log::info!("relay: in-flight message answered during drain");
                        self.deliver(chunks).await;
                    }
                    Err(_) => log::warn!(
                        "relay: in-flight message overran the {:?} grace period, dropped",
                        self.settings.grace_period
                    ),
                }
            }
            // Delivery that has started always completes.
            Some(InFlight::Delivering(fut)) => fut.await,
            None => {}
        }

        match tokio::time::timeout(self.settings.join_timeout, &mut receive_task).await {
            Ok(_) => log::debug!("relay: receive loop joined"),
            Err(_) => {
                log::warn!("relay: receive loop did not stop in time, aborting");
                receive_task.abort();
            }
        }

        // Buffered messages are already acknowledged upstream and will not come back.
        let mut unanswered = Vec::new();
        while let Ok(msg) = inbound_rx.try_recv() {
            unanswered.push(OutboundChunk {
                chat_id: msg.chat_id,
                text: RESTART_NOTICE.to_string(),
            });
        }
        drop(inbound_rx);
        if !unanswered.is_empty() {
            log::info!("relay: {} buffered message(s) left unanswered, notifying", unanswered.len());
            self.deliver(unanswered).await;
        }

        self.stop_background().await;
        self.set_state(RelayState::Stopped);
        log::info!("relay: stopped");
        Ok(())
    }

    fn deliver(&self, chunks: Vec<OutboundChunk>) -> BoxFuture<'static, ()> {
        let handler = self.handler.clone();
        async move { handler.deliver(chunks).await }.boxed()
    }

    async fn stop_background(&mut self) {
        let timeout = self.settings.join_timeout;
        future::join_all(self.background.drain(..).map(|task| task.shutdown(timeout))).await;
    }
}

/// The message being worked on: the agent phase may be dropped at drain, delivery may not.
enum InFlight {
    Responding(BoxFuture<'static, Vec<OutboundChunk>>),
    Delivering(BoxFuture<'static, ()>),
}

enum Step {
    Ready(Vec<OutboundChunk>),
    Delivered,
}

struct MessageHandler<T> {
    transport: Arc<T>,
    invoker: AgentInvoker,
    max_chars: usize,
}

impl<T: ChatTransport> MessageHandler<T> {
    /// Chunks to send for `msg`; a panic while preparing them becomes the apology.
    async fn respond(&self, msg: InboundMessage) -> Vec<OutboundChunk> {
        match AssertUnwindSafe(self.prepare(&msg)).catch_unwind().await {
            Ok(chunks) => chunks,
            Err(panic) => {
                let description = panic_message(&*panic);
                log::error!("relay: handling message from chat {} {}", msg.chat_id, description);
                let apology = AgentResponse::error(description);
                outbound_chunks(&msg.chat_id, &apology, self.max_chars)
            }
        }
    }

    async fn prepare(&self, msg: &InboundMessage) -> Vec<OutboundChunk> {
        if let Some(command) = msg.command() {
            let text = command_reply(command, &msg.chat_id);
            return vec![OutboundChunk {
                chat_id: msg.chat_id.clone(),
                text,
            }];
        }
        let typing = async {
            if let Err(e) = self.transport.send_typing(&msg.chat_id).await {
                log::debug!("relay: typing indicator failed: {}", e);
            }
        };
        let (_, response) = tokio::join!(typing, self.invoker.run(&msg.text));
        outbound_chunks(&msg.chat_id, &response, self.max_chars)
    }

    /// Send in order; a failed chunk is logged and the rest are still sent.
    async fn deliver(&self, chunks: Vec<OutboundChunk>) {
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = self.transport.send_message(&chunk.chat_id, &chunk.text).await {
                log::warn!(
                    "relay: chunk {}/{} to chat {} failed: {}",
                    i + 1,
                    total,
                    chunk.chat_id,
                    e
                );
            }
        }
    }
}

fn command_reply(command: &str, chat_id: &str) -> String {
    match command {
        "start" => START_GREETING.to_string(),
        "getchatid" => format!("Your Chat ID is: {}", chat_id),
        other => format!("Unknown command /{}. Send /start to see what I can do.", other),
    }
}

/// Remove a leading `FINAL_ANSWER:` marker and the whitespace around it.
pub fn strip_final_answer(text: &str) -> &str {
    let text = text.trim();
    match text.strip_prefix(FINAL_ANSWER) {
        Some(rest) => rest.trim(),
        None => text,
    }
}

/// Split into pieces of at most `max_chars` characters, never inside a character.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Texts to send for one agent response. Never empty.
pub fn reply_texts(response: &AgentResponse, max_chars: usize) -> Vec<String> {
    if response.is_error {
        let apology: String = format!("{}{}", APOLOGY_PREFIX, response.raw_text)
            .chars()
            .take(max_chars.max(1))
            .collect();
        return vec![apology];
    }
    let cleaned = strip_final_answer(&response.raw_text);
    if cleaned.is_empty() {
        return vec![EMPTY_ANSWER.to_string()];
    }
    split_chunks(cleaned, max_chars)
}

pub fn outbound_chunks(chat_id: &str, response: &AgentResponse, max_chars: usize) -> Vec<OutboundChunk> {
    reply_texts(response, max_chars)
        .into_iter()
        .map(|text| OutboundChunk {
            chat_id: chat_id.to_string(),
            text,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[test]
    fn five_thousand_chars_split_4096_904() {
        let answer = AgentResponse::answer(format!("FINAL_ANSWER: {}", "a".repeat(5000)));
        let texts = reply_texts(&answer, 4096);
        let lens: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
        assert_eq!(lens, [4096, 904]);
    }

    #[test]
    fn chunks_concatenate_to_cleaned_text() {
        let body = "héllo wörld 🚀 ".repeat(700);
        let raw = format!("  FINAL_ANSWER:\n{}  ", body);
        let texts = reply_texts(&AgentResponse::answer(raw.clone()), 4096);
        assert!(texts.iter().all(|t| t.chars().count() <= 4096));
        assert_eq!(texts.concat(), strip_final_answer(&raw));
        assert_eq!(texts.concat(), body.trim());
    }

    #[test]
    fn only_leading_marker_is_removed() {
        assert_eq!(strip_final_answer("FINAL_ANSWER: done"), "done");
        assert_eq!(
            strip_final_answer("see FINAL_ANSWER: below"),
            "see FINAL_ANSWER: below"
        );
        assert_eq!(strip_final_answer("plain"), "plain");
    }

    #[test]
    fn error_is_one_truncated_chunk() {
        let texts = reply_texts(&AgentResponse::error("x".repeat(10_000)), 4096);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].chars().count(), 4096);
        assert!(texts[0].starts_with(APOLOGY_PREFIX));
    }

    #[test]
    fn empty_answer_gets_placeholder() {
        assert_eq!(reply_texts(&AgentResponse::answer("FINAL_ANSWER:  "), 4096), [EMPTY_ANSWER]);
    }

    #[derive(Default)]
    struct FakeTransport {
        connect_fails: bool,
        inbound: Mutex<Vec<InboundMessage>>,
        started: AtomicBool,
        stopped: AtomicBool,
        fail_send_index: Option<usize>,
        send_delay: Option<Duration>,
        attempts: AtomicUsize,
        sent: Mutex<Vec<OutboundChunk>>,
    }

    impl FakeTransport {
        fn with_messages(texts: &[&str]) -> Self {
            Self {
                inbound: Mutex::new(texts.iter().map(|t| InboundMessage::new("7", "42", *t)).collect()),
                ..Default::default()
            }
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|c| c.text.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        fn id(&self) -> &str {
            "fake"
        }

        async fn connect(&self) -> Result<(), TransportError> {
            if self.connect_fails {
                Err(TransportError::Api("Unauthorized".to_string()))
            } else {
                Ok(())
            }
        }

        fn start_inbound(
            self: Arc<Self>,
            inbound_tx: mpsc::Sender<InboundMessage>,
            cancel: CancellationToken,
        ) -> JoinHandle<()> {
            self.started.store(true, Ordering::SeqCst);
            let messages = std::mem::take(&mut *self.inbound.lock().unwrap());
            tokio::spawn(async move {
                for msg in messages {
                    if inbound_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                cancel.cancelled().await;
            })
        }

        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
            if let Some(delay) = self.send_delay {
                tokio::time::sleep(delay).await;
            }
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_send_index == Some(attempt) {
                return Err(TransportError::Api("Bad Request".to_string()));
            }
            self.sent.lock().unwrap().push(OutboundChunk {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_typing(&self, _: &str) -> Result<(), TransportError> {
            Err(TransportError::Api("typing unsupported".to_string()))
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn respond(&self, text: &str) -> anyhow::Result<String> {
            match text {
                "fail" => anyhow::bail!("model unreachable"),
                "long" => Ok(format!("FINAL_ANSWER: {}", "a".repeat(5000))),
                other => Ok(format!("FINAL_ANSWER: {}", other)),
            }
        }
    }

    /// Signals when it starts, then sleeps before answering.
    struct SlowAgent {
        started: Arc<Notify>,
        delay: Duration,
        answer: String,
    }

    #[async_trait]
    impl Agent for SlowAgent {
        async fn respond(&self, _: &str) -> anyhow::Result<String> {
            self.started.notify_one();
            tokio::time::sleep(self.delay).await;
            Ok(format!("FINAL_ANSWER: {}", self.answer))
        }
    }

    fn settings(grace_ms: u64) -> RelaySettings {
        RelaySettings {
            grace_period: Duration::from_millis(grace_ms),
            join_timeout: Duration::from_millis(500),
            max_message_chars: 4096,
        }
    }

    async fn until_sent(transport: &FakeTransport, n: usize) {
        while transport.sent.lock().unwrap().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn run_until_sent(transport: Arc<FakeTransport>, n: usize) -> RelayState {
        let relay = Relay::new(
            transport.clone(),
            AgentInvoker::new(Arc::new(EchoAgent)),
            settings(1000),
        );
        let state = relay.state();
        let waiter = transport.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            relay.run(async move { until_sent(&waiter, n).await }),
        )
        .await
        .expect("relay did not stop")
        .unwrap();
        let last = *state.borrow();
        last
    }

    #[tokio::test]
    async fn every_message_gets_a_visible_outcome_in_order() {
        let transport = Arc::new(FakeTransport::with_messages(&[
            "/start",
            "long",
            "fail",
            "/getchatid",
            "/weather",
        ]));
        let state = run_until_sent(transport.clone(), 6).await;
        assert_eq!(state, RelayState::Stopped);
        let sent = transport.sent_texts();
        assert_eq!(sent[0], START_GREETING);
        assert_eq!(sent[1].chars().count(), 4096);
        assert_eq!(sent[2].chars().count(), 904);
        assert_eq!(
            sent[3],
            "Sorry, I encountered an error while processing your request: model unreachable"
        );
        assert_eq!(sent[4], "Your Chat ID is: 42");
        assert!(sent[5].starts_with("Unknown command /weather"));
        assert!(transport.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_the_rest() {
        let transport = Arc::new(FakeTransport {
            fail_send_index: Some(0),
            ..FakeTransport::with_messages(&["long", "hi"])
        });
        run_until_sent(transport.clone(), 2).await;
        let sent = transport.sent_texts();
        assert_eq!(sent[0].chars().count(), 904);
        assert_eq!(sent[1], "hi");
    }

    #[tokio::test]
    async fn fatal_connect_never_runs() {
        let transport = Arc::new(FakeTransport {
            connect_fails: true,
            ..Default::default()
        });
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let background = BackgroundTask::spawn("tool-server", move |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        let relay = Relay::new(
            transport.clone(),
            AgentInvoker::new(Arc::new(EchoAgent)),
            settings(100),
        )
        .with_background(background);
        let state = relay.state();
        let err = relay.run(future::pending()).await.unwrap_err();
        assert!(matches!(err, RelayError::FatalStartup(_)));
        assert!(!transport.started.load(Ordering::SeqCst));
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(*state.borrow(), RelayState::Stopped);
    }

    #[tokio::test]
    async fn background_failure_drains_the_relay() {
        let transport = Arc::new(FakeTransport::default());
        let background =
            BackgroundTask::spawn("tool-server", |_| async { Err(anyhow::anyhow!("address in use")) });
        let relay = Relay::new(
            transport.clone(),
            AgentInvoker::new(Arc::new(EchoAgent)),
            settings(100),
        )
        .with_background(background);
        tokio::time::timeout(Duration::from_secs(5), relay.run(future::pending()))
            .await
            .expect("relay did not stop")
            .unwrap();
        assert!(transport.stopped.load(Ordering::SeqCst));
    }

    /// Run until the agent starts on the first message, then shut down.
    async fn shutdown_with_slow_agent(
        transport: FakeTransport,
        delay: Duration,
        answer: &str,
        grace_ms: u64,
    ) -> Arc<FakeTransport> {
        let transport = Arc::new(transport);
        let started = Arc::new(Notify::new());
        let agent = SlowAgent {
            started: started.clone(),
            delay,
            answer: answer.to_string(),
        };
        let relay = Relay::new(
            transport.clone(),
            AgentInvoker::new(Arc::new(agent)),
            settings(grace_ms),
        );
        let state = relay.state();
        tokio::time::timeout(
            Duration::from_secs(5),
            relay.run(async move { started.notified().await }),
        )
        .await
        .expect("relay did not stop")
        .unwrap();
        assert_eq!(*state.borrow(), RelayState::Stopped);
        transport
    }

    #[tokio::test]
    async fn in_flight_message_finishing_within_grace_is_delivered() {
        let transport = FakeTransport::with_messages(&["work"]);
        let transport =
            shutdown_with_slow_agent(transport, Duration::from_millis(50), "finished", 2000).await;
        assert_eq!(transport.sent_texts(), ["finished"]);
    }

    #[tokio::test]
    async fn in_flight_message_overrunning_grace_is_dropped() {
        let transport = FakeTransport::with_messages(&["work"]);
        let transport =
            shutdown_with_slow_agent(transport, Duration::from_secs(30), "finished", 50).await;
        assert!(transport.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn answer_ready_within_grace_is_sent_whole_even_if_sending_is_slow() {
        let transport = FakeTransport {
            send_delay: Some(Duration::from_millis(50)),
            ..FakeTransport::with_messages(&["work"])
        };
        let long = "a".repeat(5000);
        let transport =
            shutdown_with_slow_agent(transport, Duration::from_millis(40), &long, 100).await;
        let lens: Vec<usize> = transport.sent_texts().iter().map(|t| t.chars().count()).collect();
        assert_eq!(lens, [4096, 904]);
    }

    #[tokio::test]
    async fn buffered_messages_get_a_resend_notice_on_shutdown() {
        let transport = FakeTransport::with_messages(&["first", "second", "third"]);
        let transport =
            shutdown_with_slow_agent(transport, Duration::from_millis(50), "answer first", 2000)
                .await;
        assert_eq!(
            transport.sent_texts(),
            ["answer first", RESTART_NOTICE, RESTART_NOTICE]
        );
    }
}
