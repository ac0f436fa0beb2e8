//! Mock realtime providers
//!
//! - `FakeTransport`: in-process transport; the test plays the remote side
//!   through a `FakeRemote`
//! - `gemini_mock`: a local WebSocket server speaking the Gemini Live protocol

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod gemini_mock;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use astric_voice::core::realtime::{
    OutboundMessage, OutboundSender, RealtimeError, RealtimeResult, RealtimeTransport,
    SessionSetup, TransportEvent, TransportLink,
};

/// The remote end of one `FakeTransport` connection.
pub struct FakeRemote {
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
}

impl FakeRemote {
    pub async fn send(&self, event: TransportEvent) {
        self.events
            .send(event)
            .await
            .expect("session dropped its event receiver");
    }

    /// Next message from the session, or `None` after `timeout`.
    pub async fn recv_within(&mut self, timeout: Duration) -> Option<OutboundMessage> {
        tokio::time::timeout(timeout, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Transport that hands its remote ends to the test.
#[derive(Default)]
pub struct FakeTransport {
    setups: Mutex<Vec<SessionSetup>>,
    remotes: Mutex<Vec<FakeRemote>>,
    connects: AtomicUsize,
    refuse_with: Mutex<Option<RealtimeError>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `connect` with `error`.
    pub fn refuse_next(&self, error: RealtimeError) {
        *self.refuse_with.lock() = Some(error);
    }

    /// Remote end of the most recent connection.
    pub fn take_remote(&self) -> FakeRemote {
        self.remotes
            .lock()
            .pop()
            .expect("no connection has been made")
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        self.setups.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn connect(&self, setup: SessionSetup) -> RealtimeResult<TransportLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.setups.lock().push(setup);

        if let Some(error) = self.refuse_with.lock().take() {
            return Err(error);
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        self.remotes.lock().push(FakeRemote {
            events: event_tx,
            outbound: out_rx,
        });

        Ok(TransportLink {
            outbound: OutboundSender::new(out_tx),
            events: event_rx,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
