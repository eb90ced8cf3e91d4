//! 전송 trait: 출력 메시지를 큐 계층에 넘기는 확장 포인트
//!
//! 실제 브로커 연결은 이 크레이트의 범위 밖입니다. 수집기 발행 루프는
//! [`OutputTransport`]만 알고 있으며, 호출 순서는 다음과 같습니다.
//!
//! ```text
//! publish_output()* → flush() → schedule() → ... → flush() → schedule() → stop()
//! ```
//!
//! 인터럽트로 중단될 때는 `stop()` 다음에 `inner_stop()`이 호출됩니다.

use std::future::Future;

use crate::error::TransportError;
use crate::types::OutputMessage;

/// 출력 전송 계층 trait
///
/// 구현체는 `publish_output`으로 받은 메시지를 내부 버퍼에 쌓고,
/// `flush`가 완료될 때 버퍼 내용이 브로커에 넘어갔음을 보장해야 합니다.
pub trait OutputTransport: Send {
    /// 메시지 하나를 발행 버퍼에 넣습니다.
    fn publish_output(
        &mut self,
        message: OutputMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// 발행 버퍼를 비우고 완료될 때까지 기다립니다.
    fn flush(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// 제어권을 스케줄러에 한 번 양보합니다.
    fn schedule(&mut self) -> impl Future<Output = ()> + Send;

    /// 정상 정지 신호를 보냅니다.
    fn stop(&mut self);

    /// 내부 I/O 루프를 즉시 정지합니다 (인터럽트 경로 전용).
    fn inner_stop(&mut self);
}

/// [`MemoryTransport`]에 기록되는 호출
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `publish_output` 호출
    Publish(OutputMessage),
    /// `flush` 호출
    Flush,
    /// `schedule` 호출
    Schedule,
    /// `stop` 호출
    Stop,
    /// `inner_stop` 호출
    InnerStop,
}

/// 인메모리 전송 계층
///
/// 모든 호출을 순서대로 기록합니다. 드라이런과 테스트에서 사용합니다.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    calls: Vec<TransportCall>,
    pending: usize,
    stopped: bool,
}

impl MemoryTransport {
    /// 빈 전송 계층을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 호출 목록을 반환합니다.
    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    /// 발행된 메시지만 골라 반환합니다.
    pub fn published(&self) -> Vec<&OutputMessage> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Publish(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// 아직 플러시되지 않은 메시지 수
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// `stop()`이 호출되었는지 여부
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl OutputTransport for MemoryTransport {
    async fn publish_output(&mut self, message: OutputMessage) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::Stopped);
        }
        self.pending += 1;
        self.calls.push(TransportCall::Publish(message));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        tracing::debug!(pending = self.pending, "flushing in-memory output buffer");
        self.pending = 0;
        self.calls.push(TransportCall::Flush);
        Ok(())
    }

    async fn schedule(&mut self) {
        self.calls.push(TransportCall::Schedule);
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.calls.push(TransportCall::Stop);
    }

    fn inner_stop(&mut self) {
        self.calls.push(TransportCall::InnerStop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageHeaders, OutputProperties, RawType};
    use bytes::Bytes;

    fn message(body: &'static [u8]) -> OutputMessage {
        OutputMessage {
            routing_key: "provider.channel".to_owned(),
            body: Bytes::from_static(body),
            properties: OutputProperties {
                message_id: "0".repeat(32),
                raw_type: RawType::Stream,
                timestamp: 0,
                headers: MessageHeaders::new(),
                content_type: None,
            },
        }
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let mut transport = MemoryTransport::new();
        transport.publish_output(message(b"a")).await.unwrap();
        assert_eq!(transport.pending(), 1);
        transport.flush().await.unwrap();
        transport.schedule().await;
        transport.stop();

        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.published().len(), 1);
        assert!(matches!(transport.calls()[1], TransportCall::Flush));
        assert!(matches!(transport.calls()[2], TransportCall::Schedule));
        assert!(matches!(transport.calls()[3], TransportCall::Stop));
    }

    #[tokio::test]
    async fn publish_after_stop_fails() {
        let mut transport = MemoryTransport::new();
        transport.stop();
        let err = transport.publish_output(message(b"late")).await.unwrap_err();
        assert!(matches!(err, TransportError::Stopped));
    }
}
