//! Notification Sink
//!
//! Renders signals into chat messages and delivers them one by one.
//! Delivery is attempted once per signal; a failed send is logged and the
//! signal is dropped, since its level is already persisted as fired.

use std::time::Duration;

use crate::domain::{DuplicateReason, Signal, SignalCache};
use crate::ports::notifier::{Notifier, NotifyError, OutgoingMessage};

/// Sink configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub button_label: String,
    /// Buy link; `{coin}` becomes the lower-case base asset
    pub buy_link_template: String,
    pub key_window: Duration,
    pub text_window: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            button_label: "🚀 COMPRAR".to_string(),
            buy_link_template: "https://bit2me.com/es/precio/{coin}".to_string(),
            key_window: SignalCache::DEFAULT_KEY_TTL,
            text_window: SignalCache::DEFAULT_TEXT_TTL,
        }
    }
}

/// What happened to one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

pub struct NotificationSink<N: Notifier> {
    notifier: N,
    cache: SignalCache,
    config: SinkConfig,
}

impl<N: Notifier> NotificationSink<N> {
    pub fn new(notifier: N, config: SinkConfig) -> Self {
        let cache = SignalCache::with_config(
            config.key_window,
            config.text_window,
            SignalCache::DEFAULT_MAX_ENTRIES,
        );
        Self {
            notifier,
            cache,
            config,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Check the notifier credentials
    pub async fn verify(&self) -> Result<String, NotifyError> {
        self.notifier.verify().await
    }

    /// Build the chat message for a signal
    pub fn compose(&self, signal: &Signal) -> OutgoingMessage {
        OutgoingMessage::markdown(signal.render()).with_button(
            self.config.button_label.clone(),
            signal.buy_link(&self.config.buy_link_template),
        )
    }

    /// Deliver each signal as its own message; true if any got through
    pub async fn send_batch(&mut self, signals: &[Signal]) -> bool {
        self.deliver(signals).await.any_delivered()
    }

    /// Deliver each signal as its own message and report per-outcome counts
    pub async fn deliver(&mut self, signals: &[Signal]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if signals.is_empty() {
            return report;
        }
        self.cache.cleanup();

        for signal in signals {
            let message = self.compose(signal);
            let key = signal.key();

            if let Some(reason) = self.cache.check(&key, &message.text) {
                let why = match reason {
                    DuplicateReason::SameKey => "same pair and level",
                    DuplicateReason::SameText => "identical text",
                };
                tracing::warn!("[DEDUP] Suppressed {} ({})", signal, why);
                report.duplicates += 1;
                continue;
            }

            match self.notifier.send(&message).await {
                Ok(()) => {
                    tracing::info!("[SENT] {}", signal);
                    self.cache.record(key, message.text);
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!("[LOST] {} not delivered: {}", signal, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Operator notice (HTML); not deduplicated
    pub async fn send_status(&self, text: &str) -> Result<(), NotifyError> {
        self.notifier.send(&OutgoingMessage::html(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairSymbol;
    use crate::ports::mocks::MockNotifier;
    use crate::ports::notifier::ParseMode;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;

    mock! {
        pub Chat {}

        #[async_trait]
        impl Notifier for Chat {
            async fn verify(&self) -> Result<String, NotifyError>;
            async fn send(&self, message: &OutgoingMessage) -> Result<(), NotifyError>;
        }
    }

    fn signal(base: &str, level: u32, price: f64) -> Signal {
        Signal {
            pair: PairSymbol::new(base, "EUR"),
            level,
            drop_percent: -8.5,
            price,
            local_max: 100.0,
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_compose_message() {
        let sink = NotificationSink::new(MockNotifier::new(), SinkConfig::default());
        let message = sink.compose(&signal("BTC", 1, 91.5));

        assert_eq!(message.parse_mode, ParseMode::Markdown);
        assert_eq!(message.text, "💎 BTC/EUR | \u{2212}8.5% | 91.50€");
        let button = message.button.unwrap();
        assert_eq!(button.label, "🚀 COMPRAR");
        assert_eq!(button.url, "https://bit2me.com/es/precio/btc");
    }

    #[tokio::test]
    async fn test_each_signal_sent_once() {
        let mut chat = MockChat::new();
        chat.expect_send()
            .withf(|m: &OutgoingMessage| m.button.is_some())
            .times(2)
            .returning(|_| Ok(()));

        let mut sink = NotificationSink::new(chat, SinkConfig::default());
        let batch = vec![signal("BTC", 1, 91.5), signal("ETH", 1, 2000.0)];

        assert!(sink.send_batch(&batch).await);
        // Second pass is fully suppressed; mock would panic on a third send
        let report = sink.deliver(&batch).await;
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_failed_send_not_retried_or_cached() {
        let mut chat = MockChat::new();
        chat.expect_send()
            .times(1)
            .returning(|_| Err(NotifyError::Timeout));

        let mut sink = NotificationSink::new(chat, SinkConfig::default());
        let report = sink.deliver(&[signal("BTC", 2, 87.0)]).await;

        assert_eq!(report.failed, 1);
        assert!(!report.any_delivered());
    }

    #[tokio::test]
    async fn test_failed_send_can_go_out_later() {
        let notifier = MockNotifier::new();
        notifier.set_failing(true);
        let mut sink = NotificationSink::new(notifier.clone(), SinkConfig::default());

        assert!(!sink.send_batch(&[signal("BTC", 1, 91.5)]).await);

        notifier.set_failing(false);
        assert!(sink.send_batch(&[signal("BTC", 1, 91.5)]).await);
        assert_eq!(notifier.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn test_same_text_blocked_across_levels() {
        let notifier = MockNotifier::new();
        let mut sink = NotificationSink::new(notifier.clone(), SinkConfig::default());

        sink.send_batch(&[signal("BTC", 1, 91.5)]).await;
        let report = sink.deliver(&[signal("BTC", 2, 91.5)]).await;

        assert_eq!(report.duplicates, 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_status_bypasses_cache() {
        let notifier = MockNotifier::new();
        let sink = NotificationSink::new(notifier.clone(), SinkConfig::default());

        sink.send_status("<b>Bot stopped</b>").await.unwrap();
        sink.send_status("<b>Bot stopped</b>").await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].parse_mode, ParseMode::Html);
        assert!(sent[0].button.is_none());
    }
}
