//! 시간순 행 수집기
//!
//! 원본 데이터는 행마다 시각 키를 가진 피드(예: CSV)입니다. 지난 실행까지 본
//! 가장 최근 시각과 그 시각의 행들을 [`RowWatermark`]로 저장해 두고, 이번
//! 실행에서 새로 나타난 행만 시각 오름차순으로 묶어 한 번에 발행합니다.
//!
//! # 행 정렬
//!
//! 행 순서를 뒤집은 뒤 시각 키로 안정 정렬합니다. 같은 시각의 행은 원본의
//! 아래쪽 행이 먼저 나옵니다 (최신 행을 위에 붙이는 피드 관례).
//!
//! # 새 행 판정
//!
//! - 시각이 워터마크 시각보다 늦으면 새 행
//! - 시각이 같으면 워터마크 행 집합에 없는 경우에만 새 행
//! - 워터마크가 없으면(첫 실행) 모든 행이 새 행

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use n6_config::{ConfigSection, SpecSource, combine};
use n6_core::metrics as m;

use crate::base::Collector;
use crate::error::CollectorError;
use crate::publishing::{PublishStep, StepSource};
use crate::state::{StatefulCollector, state_dir_from_section, stateful_config_spec};

/// 시간순 행 수집기 출력의 MIME 유형
pub const TIME_ORDERED_CONTENT_TYPE: &str = "text/csv";

/// 주석 행 표시
pub const ROW_COMMENT_PREFIX: char = '#';

/// 시간순 행 수집기의 설정 스펙 (상태 디렉터리 포함)
pub fn time_ordered_config_spec() -> SpecSource {
    combine(
        Some(stateful_config_spec()),
        "
        [{section}]
        row_count_mismatch_is_fatal = no :: bool
        ",
        "n6_collectors.time_ordered.TimeOrderedRowsCollector.config_spec",
    )
}

/// 시간순 행 수집기 공통 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOrderedSettings {
    /// 상태 파일 디렉터리
    pub state_dir: std::path::PathBuf,
    /// 행 수 불일치를 치명적 에러로 볼지 여부
    pub row_count_mismatch_is_fatal: bool,
}

impl TimeOrderedSettings {
    /// [`time_ordered_config_spec`]으로 조립한 섹션에서 읽습니다.
    pub fn from_section(section: &ConfigSection) -> Result<Self, CollectorError> {
        Ok(Self {
            state_dir: state_dir_from_section(section)?,
            row_count_mismatch_is_fatal: section.get("row_count_mismatch_is_fatal")?,
        })
    }
}

// ─── 워터마크 ───────────────────────────────────────────────────────

/// 시각 키로 쓸 수 있는 타입
pub trait RowTimeKey:
    Ord + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> RowTimeKey for T where
    T: Ord + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// 지난 실행까지 본 가장 최근 행의 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWatermark<T> {
    /// 지금까지 본 가장 늦은 시각 키
    pub newest_row_time: T,
    /// 그 시각을 가진 행 원문 집합
    pub newest_rows: BTreeSet<String>,
    /// 지금까지 새 행으로 판정한 누적 행 수
    ///
    /// 이전 형식의 상태에는 없을 수 있습니다 (`None`). 새로 저장하는 값에는 항상 있습니다.
    #[serde(default)]
    pub rows_count: Option<u64>,
}

/// 한 번의 중복 제거 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDelta<T> {
    /// 새 행 (시각 오름차순)
    pub new_rows: Vec<String>,
    /// 저장할 새 워터마크
    pub watermark: RowWatermark<T>,
}

impl<T> RowDelta<T> {
    /// 발행 본문: 새 행을 줄바꿈으로 이은 값 (끝 줄바꿈 없음)
    pub fn body(&self) -> Bytes {
        Bytes::from(self.new_rows.join("\n"))
    }
}

/// 행 순서를 정합니다: 뒤집은 뒤 시각 키로 안정 정렬.
pub fn order_rows<T: Ord>(mut rows: Vec<(T, String)>) -> Vec<(T, String)> {
    rows.reverse();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

/// 새 행과 새 워터마크를 계산합니다.
///
/// 새 행이 없으면 `None`입니다 (워터마크를 바꾸지 않음).
pub fn compute_row_delta<T: Ord + Clone>(
    rows: Vec<(T, String)>,
    previous: Option<&RowWatermark<T>>,
) -> Option<RowDelta<T>> {
    let ordered = order_rows(rows);

    let is_new = |time: &T, row: &String| match previous {
        None => true,
        Some(prev) => {
            *time > prev.newest_row_time
                || (*time == prev.newest_row_time && !prev.newest_rows.contains(row))
        }
    };
    let new_rows: Vec<String> = ordered
        .iter()
        .filter(|(time, row)| is_new(time, row))
        .map(|(_, row)| row.clone())
        .collect();
    if new_rows.is_empty() {
        return None;
    }

    // ordered는 비어 있지 않고 오름차순이므로 마지막 원소가 최대
    let run_max = ordered.last().map(|(time, _)| time.clone())?;
    // 새 행이 있으므로 run_max는 이전 워터마크 시각 이상
    let mut newest_rows = match previous {
        Some(prev) if prev.newest_row_time == run_max => prev.newest_rows.clone(),
        _ => BTreeSet::new(),
    };
    let newest_row_time = run_max;
    newest_rows.extend(
        ordered
            .iter()
            .filter(|(time, _)| *time == newest_row_time)
            .map(|(_, row)| row.clone()),
    );

    let previous_count = previous.and_then(|p| p.rows_count).unwrap_or(0);
    Some(RowDelta {
        watermark: RowWatermark {
            newest_row_time,
            newest_rows,
            rows_count: Some(previous_count + new_rows.len() as u64),
        },
        new_rows,
    })
}

/// 행 수 일관성 검사
///
/// 이전 워터마크에 명시적인 `rows_count`가 있을 때만 검사합니다. 새 행 안에
/// 같은 원문이 두 번 이상 나오거나, 저장된 행 수가 워터마크 행 집합보다 작으면
/// 문제 설명을 돌려줍니다.
pub fn check_row_count<T>(previous: Option<&RowWatermark<T>>, new_rows: &[String]) -> Option<String> {
    let stored = previous?.rows_count?;
    let newest = previous.map_or(0, |p| p.newest_rows.len()) as u64;
    if stored < newest {
        return Some(format!(
            "stored rows_count ({stored}) is smaller than the number of newest rows ({newest})"
        ));
    }
    let distinct: BTreeSet<&String> = new_rows.iter().collect();
    let duplicates = new_rows.len() - distinct.len();
    if duplicates > 0 {
        return Some(format!(
            "{duplicates} duplicate row(s) among {} new rows; rows_count {} + {} may overcount",
            new_rows.len(),
            stored,
            new_rows.len()
        ));
    }
    None
}

/// 중복 제거와 일관성 검사를 함께 수행합니다.
///
/// 검사에 걸리면 `mismatch_is_fatal`에 따라 `Value` 에러를 돌려주거나
/// 경고만 남기고 진행합니다.
pub fn apply_row_dedup<T: Ord + Clone>(
    collector_name: &str,
    rows: Vec<(T, String)>,
    previous: Option<&RowWatermark<T>>,
    mismatch_is_fatal: bool,
) -> Result<Option<RowDelta<T>>, CollectorError> {
    let Some(delta) = compute_row_delta(rows, previous) else {
        return Ok(None);
    };
    if let Some(problem) = check_row_count(previous, &delta.new_rows) {
        if mismatch_is_fatal {
            tracing::error!(collector = %collector_name, problem = %problem, "row count mismatch");
            return Err(CollectorError::Value(format!(
                "{collector_name}: row count mismatch: {problem}"
            )));
        }
        tracing::warn!(collector = %collector_name, problem = %problem, "row count mismatch");
    }
    Ok(Some(delta))
}

// ─── 수집기 ─────────────────────────────────────────────────────────

/// 시간순 행 수집기
///
/// 본문 하나를 발행하는 수집기 위에 상태 저장소를 얹은 형태입니다. 항목 입력은
/// 새 행 묶음 본문이고, 새 워터마크는 발행이 모두 끝난 뒤에 저장됩니다.
/// 선언의 `raw_type`은 보통 `file`, `content_type`은 [`TIME_ORDERED_CONTENT_TYPE`]입니다.
pub trait TimeOrderedRowsCollector<T: RowTimeKey>:
    Collector<Input = Bytes> + StatefulCollector<State = Option<RowWatermark<T>>>
{
    /// 원본 데이터를 얻습니다. `None`이나 빈 값이면 새 행이 없는 것입니다.
    fn obtain_orig_data(
        &mut self,
    ) -> impl Future<Output = Result<Option<Bytes>, CollectorError>> + Send;

    /// 행에서 시각 원문을 꺼냅니다. `None`이면 그 행은 건너뜁니다.
    fn pick_raw_row_time(&self, row: &str) -> Result<Option<String>, CollectorError>;

    /// 시각 원문을 비교 가능한 키로 바꿉니다.
    fn clean_row_time(&self, raw_row_time: &str) -> Result<T, CollectorError>;

    /// 행 수 불일치를 치명적 에러로 볼지 여부
    fn row_count_mismatch_is_fatal(&self) -> bool {
        false
    }

    /// 원본 데이터를 행으로 나눕니다 (기본: UTF-8 줄 단위).
    fn split_orig_data_into_rows(&self, orig_data: &[u8]) -> Result<Vec<String>, CollectorError> {
        let text = std::str::from_utf8(orig_data).map_err(|e| {
            CollectorError::Value(format!("original data is not valid UTF-8: {e}"))
        })?;
        Ok(text.lines().map(str::to_owned).collect())
    }

    /// 행을 쓸지 여부 (기본: 빈 행과 `#` 주석 행 제외)
    fn should_row_be_used(&self, row: &str) -> bool {
        let trimmed = row.trim();
        !trimmed.is_empty() && !trimmed.starts_with(ROW_COMMENT_PREFIX)
    }

    /// 원본 데이터에서 (시각 키, 행) 목록을 만듭니다.
    fn extract_timed_rows(&self, orig_data: &[u8]) -> Result<Vec<(T, String)>, CollectorError> {
        let mut timed = Vec::new();
        for row in self.split_orig_data_into_rows(orig_data)? {
            if !self.should_row_be_used(&row) {
                continue;
            }
            let Some(raw_time) = self.pick_raw_row_time(&row)? else {
                tracing::debug!(row = %row, "row without time key skipped");
                continue;
            };
            timed.push((self.clean_row_time(&raw_time)?, row));
        }
        Ok(timed)
    }
}

/// [`TimeOrderedRowsCollector`]용 스텝 소스
///
/// 새 워터마크는 발행이 끝날 때까지 여기에 보관했다가 완료 훅에서 저장합니다.
#[derive(Debug)]
pub struct TimeOrderedSteps<T> {
    done: bool,
    pending: Option<RowWatermark<T>>,
}

impl<T> Default for TimeOrderedSteps<T> {
    fn default() -> Self {
        Self {
            done: false,
            pending: None,
        }
    }
}

impl<T> TimeOrderedSteps<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장을 기다리는 워터마크
    pub fn pending_watermark(&self) -> Option<&RowWatermark<T>> {
        self.pending.as_ref()
    }
}

impl<C, T> StepSource<C> for TimeOrderedSteps<T>
where
    C: TimeOrderedRowsCollector<T>,
    T: RowTimeKey,
{
    async fn next_step(
        &mut self,
        collector: &mut C,
    ) -> Result<Option<PublishStep<Bytes>>, CollectorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let name = collector.descriptor().name.clone();
        let previous = collector.load_state()?;
        let orig_data = match collector.obtain_orig_data().await? {
            Some(data) if !data.is_empty() => data,
            _ => {
                tracing::info!(collector = %name, "no original data");
                return Ok(None);
            }
        };

        let rows = collector.extract_timed_rows(&orig_data)?;
        let total_rows = rows.len();
        let mismatch_is_fatal = collector.row_count_mismatch_is_fatal();
        let Some(delta) = apply_row_dedup(&name, rows, previous.as_ref(), mismatch_is_fatal)?
        else {
            tracing::info!(collector = %name, rows = total_rows, "no new rows");
            return Ok(None);
        };

        tracing::info!(
            collector = %name,
            rows = total_rows,
            new_rows = delta.new_rows.len(),
            "new rows found"
        );
        metrics::counter!(m::COLLECTOR_ROWS_NEW_TOTAL, m::LABEL_COLLECTOR => name)
            .increment(delta.new_rows.len() as u64);

        let body = delta.body();
        self.pending = Some(delta.watermark);
        Ok(Some(PublishStep::Item(body)))
    }

    async fn after_completed(&mut self, collector: &mut C) -> Result<(), CollectorError> {
        if let Some(watermark) = self.pending.take() {
            collector.save_state(&Some(watermark))?;
        }
        Ok(())
    }
}
