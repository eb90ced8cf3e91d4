//! 입력 더미를 얻은 뒤 항목 여러 개로 나눠 발행하는 수집기

use std::future::Future;

use crate::base::Collector;
use crate::error::CollectorError;
use crate::publishing::{PublishStep, StepSource};

/// 플러시 요청 간격 기본값 (항목 수)
pub const DEFAULT_FLUSH_EVERY: usize = 1000;

/// 두 단계 수집기
///
/// 1단계에서 입력 더미(예: 다운로드한 문서)를 얻고, 2단계에서 이를 항목
/// 입력들로 나눕니다. 항목은 하나씩 꺼내 발행하며, 앞 항목의 발행이 끝나기
/// 전에는 다음 항목을 만들지 않습니다. 항목 [`flush_every`](Self::flush_every)개마다
/// 발행 버퍼 플러시를 요청합니다.
pub trait TwoPhaseCollector: Collector {
    /// 입력 더미
    type Pile: Send;

    /// 항목 입력을 차례로 내놓는 반복자
    ///
    /// `Err`가 나오면 발행을 멈춥니다. 그 앞 항목들은 이미 발행된 상태입니다.
    type Items: Iterator<Item = Result<Self::Input, CollectorError>> + Send;

    /// 입력 더미를 얻습니다. `None`이면 발행할 것이 없습니다.
    fn obtain_input_pile(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Pile>, CollectorError>> + Send;

    /// 입력 더미를 항목 반복자로 바꿉니다.
    fn generate_input_data_dicts(&mut self, pile: Self::Pile) -> Result<Self::Items, CollectorError>;

    /// 플러시 요청 간격 (0이면 중간 플러시 없음)
    fn flush_every(&self) -> usize {
        DEFAULT_FLUSH_EVERY
    }
}

enum Phase<It> {
    NotStarted,
    Items(It),
    Done,
}

/// [`TwoPhaseCollector`]용 스텝 소스
pub struct TwoPhaseSteps<I, It> {
    phase: Phase<It>,
    // 플러시 요청 때문에 미뤄 둔 항목
    pending: Option<I>,
    since_flush: usize,
}

impl<I, It> Default for TwoPhaseSteps<I, It> {
    fn default() -> Self {
        Self {
            phase: Phase::NotStarted,
            pending: None,
            since_flush: 0,
        }
    }
}

impl<I, It> TwoPhaseSteps<I, It> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: TwoPhaseCollector> StepSource<C> for TwoPhaseSteps<C::Input, C::Items> {
    async fn next_step(
        &mut self,
        collector: &mut C,
    ) -> Result<Option<PublishStep<C::Input>>, CollectorError> {
        if let Phase::NotStarted = self.phase {
            self.phase = Phase::Done;
            let Some(pile) = collector.obtain_input_pile().await? else {
                tracing::info!(collector = %collector.descriptor().name, "no input pile");
                return Ok(None);
            };
            let items = collector.generate_input_data_dicts(pile)?;
            tracing::debug!(collector = %collector.descriptor().name, "input pile ready");
            self.phase = Phase::Items(items);
        }

        if let Some(item) = self.pending.take() {
            self.since_flush += 1;
            return Ok(Some(PublishStep::Item(item)));
        }

        let Phase::Items(items) = &mut self.phase else {
            return Ok(None);
        };
        let item = match items.next() {
            Some(Ok(item)) => item,
            Some(Err(e)) => {
                self.phase = Phase::Done;
                return Err(e);
            }
            None => {
                self.phase = Phase::Done;
                return Ok(None);
            }
        };

        let flush_every = collector.flush_every();
        if flush_every > 0 && self.since_flush >= flush_every {
            self.since_flush = 0;
            self.pending = Some(item);
            return Ok(Some(PublishStep::FlushRequest));
        }
        self.since_flush += 1;
        Ok(Some(PublishStep::Item(item)))
    }
}
