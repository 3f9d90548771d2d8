//! Signal Engine
//!
//! Per-pair drawdown state machine. Each call to [`SignalEngine::evaluate`]
//! runs, in order: bootstrap, session-age expiry, reset check, local-max
//! update, local-min update, level check. A fired level is written to the
//! store (and persisted) before the signal is returned, so a caller that
//! crashes while delivering can never re-fire it after a restart. Bootstraps
//! and a lower local min are staged and reach disk with the next write.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::levels::{LevelModel, MaxUpdatePolicy, RecoveryPolicy};
use super::pair::PairSymbol;
use super::pair_state::PairState;
use super::signal::Signal;
use super::state_store::{PersistError, StateStore};

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Invalid price for {pair}: {price}")]
    InvalidPrice { pair: String, price: f64 },

    #[error("No observed price to reset {0} at")]
    NoPrice(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Engine parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub levels: LevelModel,
    pub recovery: RecoveryPolicy,
    pub max_update: MaxUpdatePolicy,
    /// Rise above the local max (percent) ignored as float noise
    pub max_tolerance_pct: f64,
    /// Time since the last signal after which the session resets
    pub reset_cooldown: Duration,
    /// Force a reset when the local max is older than this
    pub max_session_age: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            levels: LevelModel::default(),
            recovery: RecoveryPolicy::default(),
            max_update: MaxUpdatePolicy::NewSession,
            max_tolerance_pct: 0.01,
            reset_cooldown: Duration::hours(24),
            max_session_age: None,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum ResetReason {
    /// Local max stood longer than the configured maximum age
    SessionAge { age: Duration },
    /// Cool-down since the last signal elapsed
    Cooldown { since_signal: Duration },
    /// Price rebounded from the local min enough to confirm a reversal
    Recovery { growth_pct: f64, required_pct: f64 },
    /// Operator request
    Manual,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// First observation; session started, no signal
    Bootstrapped,
    /// Session ended and restarted at the current price
    Reset(ResetReason),
    /// Local max raised
    MaxRaised { previous: f64 },
    /// A level fired and is already persisted
    Signal(Signal),
    /// Nothing fired
    Monitoring { drop_percent: f64 },
}

impl Evaluation {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Evaluation::Signal(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn into_signal(self) -> Option<Signal> {
        match self {
            Evaluation::Signal(signal) => Some(signal),
            _ => None,
        }
    }
}

/// Drawdown state machine over a [`StateStore`]
#[derive(Debug)]
pub struct SignalEngine {
    config: EngineConfig,
    store: StateStore,
}

impl SignalEngine {
    pub fn new(config: EngineConfig, store: StateStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    /// Evaluate one pair for one poll cycle
    pub fn evaluate(
        &mut self,
        pair: &PairSymbol,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EngineError> {
        let key = pair.id();
        if !(price.is_finite() && price > 0.0) {
            return Err(EngineError::InvalidPrice { pair: key, price });
        }

        let state = self.store.get(&key).clone();

        // 1. Bootstrap
        let Some(local_max) = state.local_max.filter(|max| *max > 0.0) else {
            self.store.stage(&key, PairState::fresh_session(price, now));
            tracing::info!("[NEW] {}: tracking from {}", key, price);
            return Ok(Evaluation::Bootstrapped);
        };

        // 2. Session-age expiry
        if let (Some(max_age), Some(max_time)) = (self.config.max_session_age, state.local_max_time) {
            let age = now - max_time;
            if age >= max_age {
                self.reset(pair, price, now)?;
                tracing::info!(
                    "[RESET] {}: local max expired ({:.1}h old)",
                    key,
                    age.num_seconds() as f64 / 3600.0
                );
                return Ok(Evaluation::Reset(ResetReason::SessionAge { age }));
            }
        }

        // 3. Reset check
        if let Some(reason) = self.reset_reason(&state, price, now) {
            self.reset(pair, price, now)?;
            match &reason {
                ResetReason::Cooldown { since_signal } => tracing::info!(
                    "[RESET] {}: {}h since last signal",
                    key,
                    since_signal.num_hours()
                ),
                ResetReason::Recovery { growth_pct, required_pct } => tracing::info!(
                    "[RESET] {}: +{:.2}% from min (required {:.1}%)",
                    key,
                    growth_pct,
                    required_pct
                ),
                _ => {}
            }
            return Ok(Evaluation::Reset(reason));
        }

        // 4. Local max
        let rise_pct = (price - local_max) / local_max * 100.0;
        if rise_pct > self.config.max_tolerance_pct {
            match self.config.max_update {
                MaxUpdatePolicy::NewSession => {
                    self.store.overwrite(&key, PairState::fresh_session(price, now))?;
                }
                MaxUpdatePolicy::KeepSession => {
                    self.store.update(&key, |s| {
                        s.local_max = Some(price);
                        s.local_max_time = Some(now);
                        s.last_price = Some(price);
                        s.last_update = Some(now);
                    })?;
                }
            }
            tracing::debug!(
                "[MAX UPDATE] {}: {:.4} -> {:.4} (+{:.2}%)",
                key,
                local_max,
                price,
                rise_pct
            );
            return Ok(Evaluation::MaxRaised { previous: local_max });
        }

        // 5. Local min
        let mut next = state.clone();
        let min_lowered = next.local_min.map_or(true, |min| price < min);
        if min_lowered {
            next.local_min = Some(price);
        }

        // 6. Level check
        let drop_percent = rise_pct;
        let fired = self.config.levels.next_level(&next, price, drop_percent);

        // 8. Bookkeeping
        next.last_price = Some(price);
        next.last_update = Some(now);

        match fired {
            Some(level) => {
                // 7. Mark and persist before handing the signal out
                next.mark_signal(level, price, drop_percent, now);
                self.store.overwrite(&key, next)?;
                tracing::info!(
                    "[SIGNAL] {}: level {} | {:.2}% | price {}",
                    key,
                    level,
                    drop_percent,
                    price
                );
                Ok(Evaluation::Signal(Signal {
                    pair: pair.clone(),
                    level,
                    drop_percent,
                    price,
                    local_max,
                    time: now,
                }))
            }
            None => {
                if min_lowered {
                    self.store.stage(&key, next);
                } else {
                    self.store.record_price(&key, price, now);
                }
                Ok(Evaluation::Monitoring { drop_percent })
            }
        }
    }

    /// Start a new session for `pair` anchored at `price`.
    ///
    /// The only way fired levels are ever cleared.
    pub fn reset(
        &mut self,
        pair: &PairSymbol,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let key = pair.id();
        if !(price.is_finite() && price > 0.0) {
            return Err(EngineError::InvalidPrice { pair: key, price });
        }
        self.store.overwrite(&key, PairState::fresh_session(price, now))?;
        Ok(())
    }

    /// Operator reset at the last observed price
    pub fn manual_reset(&mut self, pair: &PairSymbol, now: DateTime<Utc>) -> Result<f64, EngineError> {
        let key = pair.id();
        let price = self
            .store
            .peek(&key)
            .and_then(|s| s.last_price.or(s.local_max))
            .ok_or_else(|| EngineError::NoPrice(key.clone()))?;
        self.reset(pair, price, now)?;
        tracing::info!("[RESET] {}: manual reset at {}", key, price);
        Ok(price)
    }

    fn reset_reason(&self, state: &PairState, price: f64, now: DateTime<Utc>) -> Option<ResetReason> {
        if let Some(last_signal) = state.last_signal_time {
            let since_signal = now - last_signal;
            if since_signal >= self.config.reset_cooldown {
                return Some(ResetReason::Cooldown { since_signal });
            }
        }

        let local_min = state.local_min.filter(|min| *min > 0.0)?;
        let growth_pct = (price - local_min) / local_min * 100.0;
        let required_pct = self.config.recovery.required_growth_pct(state.deepest_level());
        (growth_pct >= required_pct).then_some(ResetReason::Recovery { growth_pct, required_pct })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::levels::DropLevel;
    use crate::domain::state_store::MemoryBackend;
    use approx::assert_relative_eq;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn btc() -> PairSymbol {
        PairSymbol::new("BTC", "EUR")
    }

    fn two_level_config() -> EngineConfig {
        EngineConfig {
            levels: LevelModel::FixedLadder {
                levels: vec![
                    DropLevel { level: 1, drop_pct: -8.0 },
                    DropLevel { level: 2, drop_pct: -12.0 },
                ],
            },
            ..EngineConfig::default()
        }
    }

    fn engine_with(config: EngineConfig) -> (SignalEngine, MemoryBackend) {
        let backend = MemoryBackend::new();
        let store = StateStore::new(Box::new(backend.clone()));
        (SignalEngine::new(config, store), backend)
    }

    fn state(engine: &SignalEngine) -> PairState {
        engine.store().peek("BTCEUR").cloned().unwrap()
    }

    #[test]
    fn test_first_observation_never_signals() {
        let (mut engine, _) = engine_with(EngineConfig::default());

        let outcome = engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        assert_eq!(outcome, Evaluation::Bootstrapped);
        let s = state(&engine);
        assert_eq!(s.local_max, Some(100.0));
        assert_eq!(s.local_min, Some(100.0));
        assert!(s.initialized);
        assert_eq!(s.initialization_time, Some(t(0)));
    }

    #[test]
    fn test_invalid_price_rejected() {
        let (mut engine, _) = engine_with(EngineConfig::default());
        assert!(matches!(
            engine.evaluate(&btc(), 0.0, t(0)),
            Err(EngineError::InvalidPrice { .. })
        ));
        assert!(engine.evaluate(&btc(), f64::NAN, t(0)).is_err());
    }

    #[test]
    fn test_drawdown_scenario() {
        let (mut engine, _) = engine_with(two_level_config());

        assert_eq!(engine.evaluate(&btc(), 100.0, t(0)).unwrap(), Evaluation::Bootstrapped);

        let first = engine.evaluate(&btc(), 91.5, t(60)).unwrap();
        let signal = first.signal().expect("level 1 should fire");
        assert_eq!(signal.level, 1);
        assert_relative_eq!(signal.drop_percent, -8.5, epsilon = 1e-9);
        assert_eq!(state(&engine).triggered_levels.iter().copied().collect::<Vec<_>>(), vec![1]);

        // Same price again: blocked
        let repeat = engine.evaluate(&btc(), 91.5, t(120)).unwrap();
        assert!(repeat.signal().is_none());

        // -13%: only level 2
        let second = engine.evaluate(&btc(), 87.0, t(180)).unwrap();
        assert_eq!(second.signal().map(|s| s.level), Some(2));

        // +4% from the min of 87 is required after level 2
        let not_yet = engine.evaluate(&btc(), 90.0, t(240)).unwrap();
        assert!(matches!(not_yet, Evaluation::Monitoring { .. }));

        let reset = engine.evaluate(&btc(), 91.0, t(300)).unwrap();
        assert!(matches!(reset, Evaluation::Reset(ResetReason::Recovery { .. })));
        let s = state(&engine);
        assert_eq!(s.local_max, Some(91.0));
        assert_eq!(s.local_min, Some(91.0));
        assert!(s.triggered_levels.is_empty());

        // New session: level 1 fires again
        let again = engine.evaluate(&btc(), 91.0 * (1.0 - 0.081), t(360)).unwrap();
        assert_eq!(again.signal().map(|s| s.level), Some(1));
    }

    #[test]
    fn test_evaluation_idempotent_for_unchanged_price() {
        let (mut engine, _) = engine_with(EngineConfig::default());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let mut fired = Vec::new();
        for i in 1..=10 {
            if let Some(signal) = engine.evaluate(&btc(), 90.0, t(i * 60)).unwrap().into_signal() {
                fired.push(signal.level);
            }
        }
        assert_eq!(fired, vec![1]);
    }

    #[test]
    fn test_fixed_ladder_levels_strictly_increase() {
        let (mut engine, _) = engine_with(EngineConfig::default());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let prices = [95.0, 91.0, 90.0, 89.0, 85.0, 85.0, 80.0, 79.0, 75.0, 70.0, 60.0, 60.0];
        let mut fired = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            if let Some(signal) = engine.evaluate(&btc(), *price, t(60 * (i as i64 + 1))).unwrap().into_signal() {
                fired.push(signal.level);
            }
        }

        assert_eq!(fired, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_new_high_starts_new_session() {
        let (mut engine, _) = engine_with(EngineConfig {
            recovery: RecoveryPolicy { default_growth_pct: 50.0, steps: vec![] },
            ..two_level_config()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 91.0, t(60)).unwrap();
        assert!(state(&engine).is_triggered(1));

        let raised = engine.evaluate(&btc(), 101.0, t(120)).unwrap();
        assert_eq!(raised, Evaluation::MaxRaised { previous: 100.0 });
        let s = state(&engine);
        assert_eq!(s.local_max, Some(101.0));
        assert_eq!(s.local_min, Some(101.0));
        assert!(s.triggered_levels.is_empty());
    }

    #[test]
    fn test_new_high_within_tolerance_is_ignored() {
        let (mut engine, _) = engine_with(EngineConfig::default());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let outcome = engine.evaluate(&btc(), 100.005, t(60)).unwrap();
        assert!(matches!(outcome, Evaluation::Monitoring { .. }));
        assert_eq!(state(&engine).local_max, Some(100.0));
    }

    #[test]
    fn test_keep_session_policy_preserves_levels() {
        let (mut engine, _) = engine_with(EngineConfig {
            max_update: MaxUpdatePolicy::KeepSession,
            recovery: RecoveryPolicy { default_growth_pct: 50.0, steps: vec![] },
            ..two_level_config()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 91.0, t(60)).unwrap();

        engine.evaluate(&btc(), 105.0, t(120)).unwrap();
        let s = state(&engine);
        assert_eq!(s.local_max, Some(105.0));
        assert_eq!(s.local_min, Some(91.0));
        assert!(s.is_triggered(1));

        // -8.6% from the new max: level 1 is already spent this session
        let outcome = engine.evaluate(&btc(), 96.0, t(180)).unwrap();
        assert!(outcome.signal().is_none());
    }

    #[test]
    fn test_cooldown_reset() {
        let (mut engine, _) = engine_with(EngineConfig {
            reset_cooldown: Duration::hours(2),
            recovery: RecoveryPolicy { default_growth_pct: 50.0, steps: vec![] },
            ..two_level_config()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 91.0, t(60)).unwrap();

        let early = engine.evaluate(&btc(), 91.0, t(60 + 3600)).unwrap();
        assert!(matches!(early, Evaluation::Monitoring { .. }));

        let late = engine.evaluate(&btc(), 91.0, t(60 + 7200)).unwrap();
        assert!(matches!(late, Evaluation::Reset(ResetReason::Cooldown { .. })));
        assert_eq!(state(&engine).local_max, Some(91.0));
    }

    #[test]
    fn test_cooldown_needs_a_signal() {
        let (mut engine, _) = engine_with(EngineConfig {
            reset_cooldown: Duration::hours(1),
            ..EngineConfig::default()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let outcome = engine.evaluate(&btc(), 99.0, t(10 * 3600)).unwrap();
        assert!(matches!(outcome, Evaluation::Monitoring { .. }));
    }

    #[test]
    fn test_session_age_expiry() {
        let (mut engine, _) = engine_with(EngineConfig {
            max_session_age: Some(Duration::hours(4)),
            ..EngineConfig::default()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let outcome = engine.evaluate(&btc(), 80.0, t(4 * 3600)).unwrap();
        assert!(matches!(outcome, Evaluation::Reset(ResetReason::SessionAge { .. })));
        assert_eq!(state(&engine).local_max, Some(80.0));
    }

    #[test]
    fn test_deeper_drawdown_needs_bigger_recovery() {
        let (mut engine, _) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 91.0, t(60)).unwrap();
        engine.evaluate(&btc(), 87.0, t(120)).unwrap();
        assert_eq!(state(&engine).deepest_level(), Some(2));

        // +3.4% from 87 would reset after level 1, not after level 2
        let outcome = engine.evaluate(&btc(), 90.0, t(180)).unwrap();
        assert!(matches!(outcome, Evaluation::Monitoring { .. }));
    }

    #[test]
    fn test_relative_ladder() {
        let (mut engine, _) = engine_with(EngineConfig {
            levels: LevelModel::RelativeLadder { first_drop_pct: -8.0, step_pct: -2.0 },
            recovery: RecoveryPolicy { default_growth_pct: 50.0, steps: vec![] },
            ..EngineConfig::default()
        });
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let first = engine.evaluate(&btc(), 92.0, t(60)).unwrap();
        assert_eq!(first.signal().map(|s| s.level), Some(1));

        let repeat = engine.evaluate(&btc(), 91.5, t(120)).unwrap();
        assert!(repeat.signal().is_none());

        let jump = engine.evaluate(&btc(), 85.0, t(180)).unwrap();
        assert_eq!(jump.signal().map(|s| s.level), Some(4));

        let s = state(&engine);
        assert_eq!(s.last_signal_level, Some(4));
        assert_eq!(s.last_signal_price, Some(85.0));
    }

    #[test]
    fn test_reset_clears_session_only() {
        let (mut engine, _) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 91.0, t(60)).unwrap();

        engine.reset(&btc(), 95.0, t(120)).unwrap();

        let s = state(&engine);
        assert!(s.triggered_levels.is_empty());
        assert!(s.last_signal_level.is_none());
        assert_eq!(s.local_max, Some(95.0));
        assert_eq!(s.local_min, Some(95.0));
        assert_eq!(engine.config().max_tolerance_pct, 0.01);
    }

    #[test]
    fn test_manual_reset_uses_last_price() {
        let (mut engine, _) = engine_with(two_level_config());
        assert!(matches!(
            engine.manual_reset(&btc(), t(0)),
            Err(EngineError::NoPrice(_))
        ));

        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.evaluate(&btc(), 93.0, t(60)).unwrap();

        assert_eq!(engine.manual_reset(&btc(), t(120)).unwrap(), 93.0);
        assert_eq!(state(&engine).local_max, Some(93.0));
    }

    #[test]
    fn test_signal_persisted_before_return() {
        let (mut engine, backend) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        let outcome = engine.evaluate(&btc(), 91.0, t(60)).unwrap();
        assert!(outcome.signal().is_some());

        // Nothing flushed explicitly: the level must already be durable
        assert!(backend.stored().unwrap()["BTCEUR"].is_triggered(1));
    }

    #[test]
    fn test_bootstrap_is_staged_until_flush() {
        let (mut engine, backend) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        assert!(backend.stored().is_none());

        engine.store_mut().flush().unwrap();
        assert_eq!(backend.stored().unwrap()["BTCEUR"].local_max, Some(100.0));
    }

    #[test]
    fn test_external_reset_wins_over_pending_signal() {
        let (mut engine, backend) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        engine.store_mut().flush().unwrap();

        // Operator resets from another process at a lower anchor
        let mut operator = SignalEngine::new(
            two_level_config(),
            StateStore::open(Box::new(backend.clone())).unwrap(),
        );
        operator.reset(&btc(), 95.0, t(30)).unwrap();

        let result = engine.evaluate(&btc(), 91.0, t(60));
        assert!(matches!(
            result,
            Err(EngineError::Persist(PersistError::Superseded(_)))
        ));
        assert!(!backend.stored().unwrap()["BTCEUR"].is_triggered(1));

        // -4.2% from the adopted 95 max is no signal
        let outcome = engine.evaluate(&btc(), 91.0, t(90)).unwrap();
        assert!(outcome.signal().is_none());
        assert_eq!(state(&engine).local_max, Some(95.0));
    }

    #[test]
    fn test_persist_failure_withholds_signal() {
        let (mut engine, backend) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();

        backend.set_fail_writes(true);
        let result = engine.evaluate(&btc(), 91.0, t(60));
        assert!(matches!(result, Err(EngineError::Persist(_))));
        assert!(!state(&engine).is_triggered(1));

        // Storage back: the level fires once
        backend.set_fail_writes(false);
        let outcome = engine.evaluate(&btc(), 91.0, t(120)).unwrap();
        assert_eq!(outcome.signal().map(|s| s.level), Some(1));
    }

    #[test]
    fn test_restart_does_not_refire() {
        let (mut engine, backend) = engine_with(two_level_config());
        engine.evaluate(&btc(), 100.0, t(0)).unwrap();
        assert!(engine.evaluate(&btc(), 91.0, t(60)).unwrap().signal().is_some());
        drop(engine);

        let store = StateStore::open(Box::new(backend)).unwrap();
        let mut restarted = SignalEngine::new(two_level_config(), store);
        let outcome = restarted.evaluate(&btc(), 91.0, t(120)).unwrap();
        assert!(outcome.signal().is_none());
    }
}
