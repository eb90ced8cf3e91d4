#![doc = include_str!("../README.md")]

pub mod error;
pub mod metrics;
pub mod transport;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{N6Error, TransportError};

// 전송
pub use transport::{MemoryTransport, OutputTransport, TransportCall};

// 도메인 타입
pub use types::{MessageHeaders, OutputMessage, OutputProperties, RawType};
