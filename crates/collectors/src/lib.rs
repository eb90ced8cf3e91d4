#![doc = include_str!("../README.md")]

pub mod base;
pub mod error;
pub mod publishing;
pub mod simple;
pub mod state;
pub mod time_ordered;
pub mod two_phase;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CollectorError, ITERATIVE_PUBLISHING_ERROR_PREFIX, StateError};

// 수집기 계약
pub use base::{Collector, CollectorDescriptor, compute_message_id, validate_source};

// 반복 발행
pub use publishing::{
    InterruptFlag, IterativePublisher, PublishStep, PublishingState, RunSummary, StepSource,
};

// 변형
pub use simple::{SimpleCollector, SimpleSteps};
pub use time_ordered::{
    RowDelta, RowTimeKey, RowWatermark, TimeOrderedRowsCollector, TimeOrderedSettings,
    TimeOrderedSteps, time_ordered_config_spec,
};
pub use two_phase::{TwoPhaseCollector, TwoPhaseSteps};

// 상태 저장소
pub use state::{
    Decoded, LegacyTextEncoding, LoadOutcome, PickleProtocol, PickleStateCodec, StateCodec,
    StateStore, StatefulCollector, stateful_config_spec,
};
