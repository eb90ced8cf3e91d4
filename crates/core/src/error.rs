//! 에러 타입: 크레이트 경계를 넘는 최상위 에러
//!
//! 각 도메인 크레이트(`n6-config`, `n6-collectors`)는 자체 에러 enum 을 두고
//! `From<DomainError> for N6Error` 변환을 구현합니다.

/// n6 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum N6Error {
    /// 설정 값 에러 (누락/불법 옵션, 변환 실패)
    #[error("config error: {0}")]
    Config(String),

    /// 설정 스펙 파싱/결합 에러
    #[error("config spec error: {0}")]
    ConfigSpec(String),

    /// 수집기 실행 에러
    #[error("collector error: {0}")]
    Collector(String),

    /// 수집기 상태 저장소 에러
    #[error("state error: {0}")]
    State(String),

    /// 출력 전송 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 출력 전송 계층 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 메시지 발행 실패
    #[error("publish failed: {0}")]
    Publish(String),

    /// 버퍼 플러시 실패
    #[error("flush failed: {0}")]
    Flush(String),

    /// 이미 정지된 전송 계층 사용
    #[error("transport already stopped")]
    Stopped,
}
