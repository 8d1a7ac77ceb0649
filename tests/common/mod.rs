//! In-memory stand-ins for the channel source and the state store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tg_channel_worker::source::{
    ChannelHandle, ChannelSource, ExtendedInfo, RawMedia, RawMessage, RawReaction, SourceError,
};
use tg_channel_worker::store::{StateStore, StoreError};

/// What the fake source does when a cycle resolves the channel.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    RateLimited(Duration),
    Transport,
    NotFound,
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
}

/// Channel with ids 100..=102: plain text, text with reactions, bare photo.
pub fn sample_messages() -> Vec<RawMessage> {
    let mut reacted = RawMessage::text(101, "Hackathon results are out", at(1));
    reacted.views = Some(340);
    reacted.forwards = Some(4);
    reacted.replies = Some(2);
    reacted.reactions = vec![
        RawReaction::Emoji {
            emoticon: "👍".to_string(),
            count: 3,
        },
        RawReaction::Custom {
            document_id: 555,
            count: 1,
        },
    ];

    let photo = RawMessage {
        text: None,
        views: Some(120),
        media: Some(RawMedia::Photo),
        ..RawMessage::text(102, "", at(2))
    };

    // Newest first, as the source delivers them.
    vec![photo, reacted, RawMessage::text(100, "Welcome!", at(0))]
}

pub struct FakeSource {
    pub channel: ChannelHandle,
    pub subscribers: Option<i32>,
    pub messages: Vec<RawMessage>,
    script: Mutex<VecDeque<Outcome>>,
    resolve_times: Mutex<Vec<Instant>>,
    history_calls: AtomicUsize,
    fail_history_call: Option<usize>,
    stop_after: Option<(usize, CancellationToken)>,
    connect_failures: u32,
    pub connect_calls: u32,
    pub connected: bool,
}

impl FakeSource {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            channel: ChannelHandle {
                id: 1_001_234,
                title: "ITAM".to_string(),
                access_hash: Some(77),
            },
            subscribers: Some(1500),
            messages,
            script: Mutex::new(VecDeque::new()),
            resolve_times: Mutex::new(Vec::new()),
            history_calls: AtomicUsize::new(0),
            fail_history_call: None,
            stop_after: None,
            connect_failures: 0,
            connect_calls: 0,
            connected: false,
        }
    }

    /// Outcomes for successive cycles; once exhausted every cycle succeeds.
    pub fn script(self, outcomes: &[Outcome]) -> Self {
        *self.script.lock().unwrap() = outcomes.iter().copied().collect();
        self
    }

    /// Fail the `n`th history request (1-based) after it yields one message.
    pub fn fail_history_call(mut self, n: usize) -> Self {
        self.fail_history_call = Some(n);
        self
    }

    /// Request shutdown during the `n`th cycle.
    pub fn stop_after(mut self, cycles: usize, token: CancellationToken) -> Self {
        self.stop_after = Some((cycles, token));
        self
    }

    pub fn connect_failures(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    pub fn resolve_times(&self) -> Vec<Instant> {
        self.resolve_times.lock().unwrap().clone()
    }

    pub fn cycles_attempted(&self) -> usize {
        self.resolve_times.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelSource for FakeSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        self.connect_calls += 1;
        if self.connect_calls <= self.connect_failures {
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        self.connected = false;
        Ok(())
    }

    async fn resolve(&self, username: &str) -> Result<ChannelHandle, SourceError> {
        let cycle = {
            let mut times = self.resolve_times.lock().unwrap();
            times.push(Instant::now());
            times.len()
        };
        if let Some((stop_cycle, token)) = &self.stop_after {
            if cycle >= *stop_cycle {
                token.cancel();
            }
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Succeed);
        match outcome {
            Outcome::Succeed => Ok(self.channel.clone()),
            Outcome::RateLimited(wait) => Err(SourceError::RateLimited { wait }),
            Outcome::Transport => Err(SourceError::Transport("connection reset".to_string())),
            Outcome::NotFound => Err(SourceError::NotFound(username.to_string())),
        }
    }

    async fn extended_info(&self, _channel: &ChannelHandle) -> Result<ExtendedInfo, SourceError> {
        Ok(ExtendedInfo {
            subscriber_count: self.subscribers,
        })
    }

    fn recent_messages<'a>(
        &'a self,
        _channel: &'a ChannelHandle,
        limit: usize,
    ) -> BoxStream<'a, Result<RawMessage, SourceError>> {
        let call = self.history_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let mut items: Vec<Result<RawMessage, SourceError>> = self
            .messages
            .iter()
            .take(limit)
            .cloned()
            .map(Ok)
            .collect();
        if self.fail_history_call == Some(call) {
            items.truncate(1);
            items.push(Err(SourceError::Transport("stream interrupted".to_string())));
        }

        stream::iter(items).boxed()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    fail_transactions: AtomicBool,
    connect_failures: u32,
    pub connect_calls: u32,
    pub connected: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_failures(mut self, n: u32) -> Self {
        self.connect_failures = n;
        self
    }

    pub fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn contents(&self) -> HashMap<String, String> {
        self.data.lock().unwrap().clone()
    }

    /// Number of successful write operations.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn connect(&mut self) -> Result<(), StoreError> {
        self.connect_calls += 1;
        if self.connect_calls <= self.connect_failures {
            return Err(StoreError::Other("connection refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), StoreError> {
        self.connected = false;
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.connected
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_atomic(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(StoreError::Other("EXECABORT".to_string()));
        }

        let mut data = self.data.lock().unwrap();
        for (key, value) in entries {
            data.insert((*key).to_string(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
