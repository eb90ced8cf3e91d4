//! 수집기 계층 에러 타입
//!
//! - [`CollectorError`]: 수집기 선언 검증, 항목별 출력 파이프라인, 반복 발행 루프의 에러
//! - [`StateError`]: 상태 파일 이름 결정, 읽기/쓰기, 디코딩 에러
//!
//! 두 타입 모두 `From<...> for N6Error`가 구현되어 있어 `?`로 전파됩니다.

use std::path::PathBuf;

use n6_config::ConfigError;
use n6_core::error::{N6Error, TransportError};

/// 반복 발행 중 발생한 에러를 감싼 종료 메시지의 접두어
pub const ITERATIVE_PUBLISHING_ERROR_PREFIX: &str = "ERROR during iterative publishing:";

/// 수집기 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 값의 종류가 계약과 맞지 않음 (레거시 속성 사용 포함)
    #[error("type error: {0}")]
    Type(String),

    /// 값의 형식이 잘못됨 (예: source 문법 위반)
    #[error("value error: {0}")]
    Value(String),

    /// 필수 선언이 빠짐 (예: 비 stream 유형의 `content_type`)
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// 운영자 인터럽트 (정상 종료 경로)
    #[error("interrupted")]
    Interrupted,

    /// 프로세스 종료 요청
    ///
    /// 발행 루프는 이 에러를 가공하지 않고 그대로 돌려줍니다.
    #[error("{0}")]
    Exit(String),

    /// 수집기 구현의 데이터 획득 실패 (다운로드, 파싱 등)
    #[error("collection failed: {0}")]
    Collection(String),

    /// 출력 전송 실패
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 상태 저장소 실패
    #[error(transparent)]
    State(#[from] StateError),

    /// 수집기 설정 실패
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CollectorError {
    /// 반복 발행 단계의 에러를 종료 에러로 정규화합니다.
    ///
    /// `Interrupted`와 `Exit`는 그대로 두고, 나머지는 원래 메시지를 보존한
    /// `Exit`로 바꿉니다.
    pub fn into_publishing_exit(self) -> Self {
        match self {
            Self::Interrupted => Self::Interrupted,
            Self::Exit(msg) => Self::Exit(msg),
            other => Self::Exit(format!("{ITERATIVE_PUBLISHING_ERROR_PREFIX} {other}")),
        }
    }

    /// 운영자 인터럽트 여부
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// 상태 저장소 에러
///
/// `MissingFile`을 제외한 모든 변형은 복구할 수 없는 에러입니다.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// 상태 파일 이름을 결정할 수 없음
    #[error("cannot derive state file name: {0}")]
    InvalidFileName(String),

    /// 상태 파일 읽기/쓰기 실패
    #[error("state file {path}: {source}")]
    Io {
        /// 상태 파일 경로
        path: PathBuf,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// 상태 파일 내용이 비어 있거나 중간에 끊김
    #[error("state file {path}: unexpected end of data")]
    UnexpectedEof {
        /// 상태 파일 경로
        path: PathBuf,
    },

    /// 상태 파일 디코딩 실패 (손상, 지원하지 않는 프로토콜)
    #[error("state file {path}: cannot decode: {reason}")]
    Decode {
        /// 상태 파일 경로
        path: PathBuf,
        /// 실패 사유
        reason: String,
    },

    /// 상태 값 인코딩 실패
    #[error("cannot encode state: {0}")]
    Encode(String),
}

impl From<StateError> for N6Error {
    fn from(err: StateError) -> Self {
        N6Error::State(err.to_string())
    }
}

impl From<CollectorError> for N6Error {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Transport(e) => N6Error::Transport(e),
            CollectorError::State(e) => e.into(),
            CollectorError::Config(e) => e.into(),
            other => N6Error::Collector(other.to_string()),
        }
    }
}
