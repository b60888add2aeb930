use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::filter;
use crate::forward::{Forwarder, Launch};
use crate::presence::PresenceProbe;
use crate::telemetry::{ChatFeed, ChatMessage};
use crate::text;
use crate::translate::Translate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    WaitingForSource,
    Polling,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Suppressed {
        id: i64,
    },
    Relayed {
        id: i64,
        /// Line printed to the console.
        display: String,
        /// Text chosen for forwarding, before rewrite rules.
        text: String,
        /// Rewritten text handed to the forward target, if it was launched.
        forwarded: Option<String>,
    },
}

impl Outcome {
    #[allow(dead_code)]
    pub fn id(&self) -> i64 {
        match self {
            Outcome::Suppressed { id } | Outcome::Relayed { id, .. } => *id,
        }
    }
}

/// The poll loop: waits for the game, fetches new chat since the cursor and
/// runs every message through filter → clean → translate → rewrite → forward.
///
/// The cursor only moves forward within a game session and is advanced to the
/// batch maximum before any message is processed, so a message is handled at
/// most once. Messages of one batch run concurrently (up to `workers`); their
/// console lines and launches may interleave in any order.
pub struct Relay {
    config: RuntimeConfig,
    presence: Arc<dyn PresenceProbe>,
    feed: Arc<dyn ChatFeed>,
    translator: Arc<dyn Translate>,
    forwarder: Forwarder,
    state: RelayState,
    waiting_announced: bool,
    cursor: AtomicI64,
    forwarding_enabled: AtomicBool,
}

impl Relay {
    pub fn new(
        config: RuntimeConfig,
        presence: Arc<dyn PresenceProbe>,
        feed: Arc<dyn ChatFeed>,
        translator: Arc<dyn Translate>,
        launcher: Arc<dyn Launch>,
    ) -> Self {
        let forwarder = Forwarder::new(&config.forward, launcher);
        let forwarding_enabled = AtomicBool::new(config.forward.enable);
        Self {
            config,
            presence,
            feed,
            translator,
            forwarder,
            state: RelayState::WaitingForSource,
            waiting_announced: false,
            cursor: AtomicI64::new(0),
            forwarding_enabled,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn forwarding_enabled(&self) -> bool {
        self.forwarding_enabled.load(Ordering::SeqCst)
    }

    /// Run forever. Only external termination stops the loop.
    pub async fn run(mut self) {
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// One iteration: presence check, state transition, fetch and process.
    pub async fn run_cycle(&mut self) -> Vec<Outcome> {
        let active = self.presence.is_source_active().await;

        match (self.state, active) {
            (RelayState::WaitingForSource, false) => {
                if !self.waiting_announced {
                    info!("Game is not running. Waiting for it to start...");
                    self.waiting_announced = true;
                }
                return Vec::new();
            }
            (RelayState::WaitingForSource, true) => {
                info!("Game detected");
                // A new session restarts the game's message ids.
                self.cursor.store(0, Ordering::SeqCst);
                self.state = RelayState::Polling;
            }
            (RelayState::Polling, false) => {
                info!("Game is not running. Waiting for it to start...");
                self.waiting_announced = true;
                self.state = RelayState::WaitingForSource;
                return Vec::new();
            }
            (RelayState::Polling, true) => {}
        }

        let batch = self.feed.fetch_since(self.cursor()).await;
        if batch.is_empty() {
            return Vec::new();
        }
        self.process_batch(batch).await
    }

    async fn process_batch(&self, batch: Vec<ChatMessage>) -> Vec<Outcome> {
        if let Some(max_id) = batch.iter().map(|m| m.id).max() {
            self.cursor.fetch_max(max_id, Ordering::SeqCst);
        }
        debug!("Fetched {} message(s), cursor at {}", batch.len(), self.cursor());

        stream::iter(batch)
            .map(|message| self.process_message(message))
            .buffer_unordered(self.config.workers)
            .collect::<Vec<_>>()
            .await
    }

    async fn process_message(&self, message: ChatMessage) -> Outcome {
        debug!(
            "#{} [{}] {} (enemy: {}, t={}s)",
            message.id, message.mode, message.sender, message.enemy, message.time
        );

        if filter::should_suppress(&message, &self.config) {
            debug!("Suppressed message #{} from {}", message.id, message.sender);
            return Outcome::Suppressed { id: message.id };
        }

        let original = text::clean(&message.msg);
        let translated = self.translate(message.id, &original).await;

        let display = match &translated {
            Some(translated) => format!("{} ({})", original, translated),
            None => original.clone(),
        };
        println!("{}", display);

        let text = translated.unwrap_or(original);
        let forwarded = self.forward(&text);

        Outcome::Relayed {
            id: message.id,
            display,
            text,
            forwarded,
        }
    }

    /// Translated text, or `None` when translation is off, failed, or the
    /// message already was in the target language.
    async fn translate(&self, id: i64, text: &str) -> Option<String> {
        if !self.config.translate.enable {
            return None;
        }
        let target = &self.config.translate.target_lang;
        match self.translator.translate(text, target).await {
            Ok(translation) if translation.was_translated => {
                debug!("#{} translated from {}", id, translation.source_lang);
                Some(translation.text)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Translation of message #{} failed: {}", id, e);
                None
            }
        }
    }

    fn forward(&self, text: &str) -> Option<String> {
        if !self.forwarding_enabled() {
            return None;
        }
        let rewritten = text::rewrite(text, &self.config.rules);
        match self.forwarder.forward(&rewritten) {
            Ok(()) => Some(rewritten),
            Err(e) => {
                // Only the worker that flips the flag reports it.
                if self.forwarding_enabled.swap(false, Ordering::SeqCst) {
                    error!("{}", e);
                    error!("Forwarding is disabled.");
                }
                None
            }
        }
    }
}
