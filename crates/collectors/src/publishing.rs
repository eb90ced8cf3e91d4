//! 반복 발행 루프
//!
//! 수집기별 "항목 생성" 로직은 [`StepSource`]로 표현합니다. 스텝 소스는
//! 호출될 때마다 [`PublishStep`] 하나를 돌려주고, [`IterativePublisher`]가
//! 이를 소비하며 항목별 출력 파이프라인과 플러시/양보 동작을 수행합니다.
//!
//! # 상태 전이
//!
//! ```text
//! NotStarted → Publishing → Flushing → ScheduledNext → (Publishing | Stopping) → Stopped
//! ```
//!
//! # 에러 처리
//!
//! - `Interrupted`: 어느 단계에서 나오든 `stop()` → `inner_stop()` 후 그대로 전파
//!   (`stop()`은 한 번만 호출)
//! - `Exit`: 정지 절차 없이 그대로 전파
//! - 스텝 생성/항목 파이프라인/전송 중의 그 외 에러: `Exit("ERROR during iterative publishing: ...")`
//! - 발행 완료 후 훅의 에러: 그대로 전파

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use n6_core::metrics as m;
use n6_core::transport::OutputTransport;

use crate::base::Collector;
use crate::error::CollectorError;

/// 스텝 소스가 내놓는 한 단계
#[derive(Debug, Clone, PartialEq)]
pub enum PublishStep<I> {
    /// 출력 파이프라인에 넣을 항목
    Item(I),
    /// 제어권을 양보하고 발행 버퍼 플러시를 요청
    FlushRequest,
    /// 플러시 없이 제어권만 양보
    YieldControl,
}

/// 수집기의 항목 생성 로직
///
/// `next_step`이 `Ok(None)`을 돌려주면 생성이 끝난 것입니다.
pub trait StepSource<C: Collector + ?Sized>: Send {
    /// 다음 단계를 만듭니다.
    fn next_step(
        &mut self,
        collector: &mut C,
    ) -> impl Future<Output = Result<Option<PublishStep<C::Input>>, CollectorError>> + Send;

    /// 발행이 끝나고 전송 계층이 정지된 뒤, 수집기 훅보다 먼저 호출됩니다.
    fn after_completed(
        &mut self,
        _collector: &mut C,
    ) -> impl Future<Output = Result<(), CollectorError>> + Send {
        async { Ok(()) }
    }
}

// ─── 인터럽트 ───────────────────────────────────────────────────────

/// 운영자 인터럽트 신호
///
/// 바이너리는 Ctrl-C 처리기에서 [`trigger`](Self::trigger)를 호출하고,
/// 발행 루프는 스케줄링 지점마다 [`check`](Self::check)로 확인합니다.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 인터럽트를 올립니다.
    pub fn trigger(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// 인터럽트가 올라가 있으면 `Interrupted`를 돌려줍니다.
    pub fn check(&self) -> Result<(), CollectorError> {
        if self.is_raised() {
            Err(CollectorError::Interrupted)
        } else {
            Ok(())
        }
    }
}

// ─── 발행 상태 ──────────────────────────────────────────────────────

/// 발행 루프 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishingState {
    /// 아직 시작하지 않음
    NotStarted,
    /// 항목을 발행하는 중
    Publishing,
    /// 발행 버퍼를 비우는 중
    Flushing,
    /// 스케줄러에 제어권을 넘긴 뒤
    ScheduledNext,
    /// 정지 절차 진행 중
    Stopping,
    /// 정지됨
    Stopped,
}

impl fmt::Display for PublishingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Publishing => "publishing",
            Self::Flushing => "flushing",
            Self::ScheduledNext => "scheduled_next",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 한 번의 발행 실행 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 전송 계층에 넘긴 메시지 수
    pub published: u64,
    /// 수행한 플러시 수 (마지막 플러시 포함)
    pub flushes: u64,
}

// ─── 발행기 ─────────────────────────────────────────────────────────

/// 반복 발행 루프 구동기
#[derive(Debug)]
pub struct IterativePublisher {
    interrupt: InterruptFlag,
    state: PublishingState,
}

impl Default for IterativePublisher {
    fn default() -> Self {
        Self::new(InterruptFlag::new())
    }
}

impl IterativePublisher {
    /// 주어진 인터럽트 신호를 확인하는 발행기를 만듭니다.
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self {
            interrupt,
            state: PublishingState::NotStarted,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> PublishingState {
        self.state
    }

    /// 이 발행기가 확인하는 인터럽트 신호
    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.interrupt
    }

    /// 스텝 소스가 끝날 때까지 발행하고 전송 계층을 정지합니다.
    ///
    /// 시작 전에 수집기 선언을 [`validate`](crate::base::CollectorDescriptor::validate)로
    /// 검사하며, 실패하면 전송 계층을 건드리지 않고 그 에러를 그대로 돌려줍니다.
    ///
    /// 정상 종료 시 호출 순서는 `publish_output()* → flush() → schedule() → stop()`
    /// 이고, 그 뒤 스텝 소스와 수집기의 완료 훅이 차례로 호출됩니다.
    pub async fn run<C, S, T>(
        &mut self,
        collector: &mut C,
        steps: &mut S,
        transport: &mut T,
    ) -> Result<RunSummary, CollectorError>
    where
        C: Collector,
        S: StepSource<C>,
        T: OutputTransport,
    {
        collector.descriptor().validate()?;
        let name = collector.descriptor().name.clone();
        match self.run_until_stopped(&name, collector, steps, transport).await {
            Err(CollectorError::Interrupted) => {
                tracing::warn!(collector = %name, state = %self.state, "interrupted, stopping output transport");
                // 완료 훅에서 온 인터럽트라면 stop()은 이미 호출됨
                if self.state != PublishingState::Stopped {
                    self.state = PublishingState::Stopping;
                    transport.stop();
                }
                transport.inner_stop();
                self.state = PublishingState::Stopped;
                Err(CollectorError::Interrupted)
            }
            other => other,
        }
    }

    async fn run_until_stopped<C, S, T>(
        &mut self,
        name: &str,
        collector: &mut C,
        steps: &mut S,
        transport: &mut T,
    ) -> Result<RunSummary, CollectorError>
    where
        C: Collector,
        S: StepSource<C>,
        T: OutputTransport,
    {
        let raw_type = collector.descriptor().raw_type.as_str();
        let mut summary = RunSummary::default();

        self.interrupt.check()?;
        self.enter(name, PublishingState::Publishing);

        loop {
            self.interrupt.check()?;
            let step = steps
                .next_step(collector)
                .await
                .map_err(|e| streaming_failure(name, e))?;

            match step {
                None => break,
                Some(PublishStep::Item(input)) => {
                    let message = collector
                        .get_output_components(input)
                        .map_err(|e| streaming_failure(name, e))?;
                    transport
                        .publish_output(message)
                        .await
                        .map_err(|e| streaming_failure(name, e.into()))?;
                    summary.published += 1;
                    metrics::counter!(
                        m::COLLECTOR_MESSAGES_PUBLISHED_TOTAL,
                        m::LABEL_COLLECTOR => name.to_owned(),
                        m::LABEL_RAW_TYPE => raw_type
                    )
                    .increment(1);
                }
                Some(PublishStep::FlushRequest) => {
                    self.flush(name, transport).await?;
                    summary.flushes += 1;
                    self.yield_control(name, transport).await?;
                }
                Some(PublishStep::YieldControl) => {
                    self.yield_control(name, transport).await?;
                }
            }
        }

        self.flush(name, transport).await?;
        summary.flushes += 1;
        self.yield_control(name, transport).await?;

        self.enter(name, PublishingState::Stopping);
        transport.stop();
        self.enter(name, PublishingState::Stopped);

        steps.after_completed(collector).await?;
        collector.after_completed_publishing().await?;

        metrics::gauge!(m::COLLECTOR_LAST_RUN_TIMESTAMP, m::LABEL_COLLECTOR => name.to_owned())
            .set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            collector = %name,
            published = summary.published,
            flushes = summary.flushes,
            "iterative publishing completed"
        );
        Ok(summary)
    }

    async fn flush<T: OutputTransport>(
        &mut self,
        name: &str,
        transport: &mut T,
    ) -> Result<(), CollectorError> {
        self.enter(name, PublishingState::Flushing);
        transport
            .flush()
            .await
            .map_err(|e| streaming_failure(name, e.into()))?;
        metrics::counter!(m::COLLECTOR_FLUSHES_TOTAL, m::LABEL_COLLECTOR => name.to_owned())
            .increment(1);
        Ok(())
    }

    async fn yield_control<T: OutputTransport>(
        &mut self,
        name: &str,
        transport: &mut T,
    ) -> Result<(), CollectorError> {
        self.enter(name, PublishingState::ScheduledNext);
        transport.schedule().await;
        self.interrupt.check()?;
        self.enter(name, PublishingState::Publishing);
        Ok(())
    }

    fn enter(&mut self, name: &str, next: PublishingState) {
        if self.state != next {
            tracing::trace!(collector = %name, from = %self.state, to = %next, "publishing state transition");
            self.state = next;
        }
    }
}

fn streaming_failure(name: &str, err: CollectorError) -> CollectorError {
    let err = err.into_publishing_exit();
    if let CollectorError::Exit(msg) = &err {
        tracing::error!(collector = %name, error = %msg, "iterative publishing failed");
    }
    err
}
