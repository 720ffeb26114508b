//! Scripted in-memory transport for channel tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doclink_core::TransportError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Outbound, Transport, TransportEvent, TransportLink};

/// The server side of one mock link.
pub(crate) struct RemoteEnd {
    /// Push frames/lifecycle events to the channel.
    pub events: mpsc::Sender<TransportEvent>,
    /// Frames the channel wrote.
    pub written: mpsc::Receiver<Outbound>,
}

impl RemoteEnd {
    /// Send a text frame.
    pub async fn push(&self, text: impl Into<String>) {
        self.events
            .send(TransportEvent::Message(text.into()))
            .await
            .expect("channel reader gone");
    }

    /// Drop the link from the server side.
    pub async fn close(self) {
        let _ = self.events.send(TransportEvent::Closed).await;
    }
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Result<(), TransportError>>,
    opens: Vec<(String, Instant)>,
    open_delay: Option<Duration>,
}

/// Transport whose opens succeed unless failures were queued.
pub(crate) struct MockTransport {
    state: Mutex<MockState>,
    links: mpsc::UnboundedSender<RemoteEnd>,
}

/// Receives the remote end of every successful open.
pub(crate) struct MockServer {
    links: mpsc::UnboundedReceiver<RemoteEnd>,
}

impl MockServer {
    /// Wait for the next successful open.
    pub async fn accept(&mut self) -> RemoteEnd {
        self.links.recv().await.expect("mock transport dropped")
    }

    /// A link accepted but not yet taken, if any.
    pub fn try_accept(&mut self) -> Option<RemoteEnd> {
        self.links.try_recv().ok()
    }
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, MockServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            state: Mutex::new(MockState::default()),
            links: tx,
        });
        (transport, MockServer { links: rx })
    }

    /// Make the next `n` opens fail.
    pub fn fail_next(&self, n: usize) {
        let mut state = self.state.lock();
        for _ in 0..n {
            state.script.push_back(Err(TransportError::Open {
                url: "mock".into(),
                reason: "connection refused".into(),
            }));
        }
    }

    /// Make every open take `delay` before resolving.
    pub fn delay_opens(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Number of open attempts so far, successful or not.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    /// When each open was attempted.
    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().opens.iter().map(|(_, at)| *at).collect()
    }

    /// URL of every open attempt.
    pub fn open_urls(&self) -> Vec<String> {
        self.state.lock().opens.iter().map(|(url, _)| url.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let (outcome, delay) = {
            let mut state = self.state.lock();
            state.opens.push((url.to_string(), Instant::now()));
            (state.script.pop_front().unwrap_or(Ok(())), state.open_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome?;

        let (link, written, events) = TransportLink::pair();
        let _ = self.links.send(RemoteEnd { events, written });
        Ok(link)
    }
}
