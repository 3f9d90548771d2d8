//! Domain Layer - Core signal logic for the dipwatch bot
//!
//! Pure types and state-machine logic with no network I/O.
//! All external interactions happen through the ports layer.
//!
//! - `pair`: pair symbol conversions (`BTC_EUR` / `BTCEUR` / `BTC/EUR`)
//! - `pair_state`: per-pair tracking state and its disk merge policy
//! - `levels`: drop-level models, recovery policy, max-update policy
//! - `signal`: emitted signals and their chat rendering
//! - `signal_engine`: the per-pair drawdown state machine
//! - `state_store`: pair-state repository over a durable backend
//! - `state_persistence`: JSON state file with atomic replace
//! - `signal_cache`: TTL duplicate-suppression cache for delivery

pub mod pair;
pub mod pair_state;
pub mod levels;
pub mod signal;
pub mod signal_engine;
pub mod state_store;
pub mod state_persistence;
pub mod signal_cache;

pub use pair::{PairSymbol, PairParseError};
pub use pair_state::{PairState, MergeOutcome};
pub use levels::{DropLevel, LevelModel, LevelConfigError, MaxUpdatePolicy, RecoveryPolicy, RecoveryStep};
pub use signal::{Signal, format_price};
pub use signal_engine::{EngineConfig, EngineError, Evaluation, ResetReason, SignalEngine};
pub use state_store::{LoadReport, MemoryBackend, PersistError, StateBackend, StateSnapshot, StateStore};
pub use state_persistence::{JsonFileBackend, DEFAULT_STATE_FILE};
pub use signal_cache::{DuplicateReason, SignalCache};
