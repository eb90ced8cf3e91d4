//! 본문 하나를 발행하는 수집기

use std::future::Future;

use bytes::Bytes;

use crate::base::Collector;
use crate::error::CollectorError;
use crate::publishing::{PublishStep, StepSource};

/// 실행마다 데이터 본문 하나를 얻어 발행하는 수집기
///
/// 항목 입력은 본문 그 자체입니다.
pub trait SimpleCollector: Collector<Input = Bytes> {
    /// 발행할 본문을 얻습니다. `None`이면 이번 실행에는 발행할 것이 없습니다.
    fn obtain_data_body(
        &mut self,
    ) -> impl Future<Output = Result<Option<Bytes>, CollectorError>> + Send;
}

/// [`SimpleCollector`]용 스텝 소스
#[derive(Debug, Default)]
pub struct SimpleSteps {
    done: bool,
}

impl SimpleSteps {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: SimpleCollector> StepSource<C> for SimpleSteps {
    async fn next_step(
        &mut self,
        collector: &mut C,
    ) -> Result<Option<PublishStep<Bytes>>, CollectorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        match collector.obtain_data_body().await? {
            Some(body) => Ok(Some(PublishStep::Item(body))),
            None => {
                tracing::info!(
                    collector = %collector.descriptor().name,
                    "no data to publish"
                );
                Ok(None)
            }
        }
    }
}
