//! 메트릭 상수 및 설명 등록
//!
//! 수집기 계층의 메트릭 이름과 설명을 한 곳에서 정의합니다.
//! 각 크레이트는 이 상수로 `metrics::counter!()`, `metrics::gauge!()`를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `n6_`
//! - 모듈명: `collector_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! metrics::counter!(n6_core::metrics::COLLECTOR_MESSAGES_PUBLISHED_TOTAL,
//!     n6_core::metrics::LABEL_COLLECTOR => "abuse_ch.feodo").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 수집기 이름 레이블 키
pub const LABEL_COLLECTOR: &str = "collector";

/// 메시지 분류 레이블 키 (stream, file, blacklist)
pub const LABEL_RAW_TYPE: &str = "raw_type";

// ─── Collector 메트릭 ───────────────────────────────────────────────

/// 발행된 출력 메시지 수 (counter)
pub const COLLECTOR_MESSAGES_PUBLISHED_TOTAL: &str = "n6_collector_messages_published_total";

/// 발행 버퍼 플러시 수 (counter)
pub const COLLECTOR_FLUSHES_TOTAL: &str = "n6_collector_flushes_total";

/// 시간순 행 수집기가 새로 발견한 행 수 (counter)
pub const COLLECTOR_ROWS_NEW_TOTAL: &str = "n6_collector_rows_new_total";

/// 레거시 경로로 복구된 상태 파일 로드 수 (counter)
pub const COLLECTOR_STATE_LEGACY_LOADS_TOTAL: &str = "n6_collector_state_legacy_loads_total";

/// 마지막으로 완료된 수집 실행 시각 (gauge, UNIX 초)
pub const COLLECTOR_LAST_RUN_TIMESTAMP: &str = "n6_collector_last_run_timestamp";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        COLLECTOR_MESSAGES_PUBLISHED_TOTAL,
        "Total number of output messages handed to the transport"
    );
    describe_counter!(
        COLLECTOR_FLUSHES_TOTAL,
        "Total number of output buffer flushes requested by collectors"
    );
    describe_counter!(
        COLLECTOR_ROWS_NEW_TOTAL,
        "Total number of rows classified as new by time-ordered collectors"
    );
    describe_counter!(
        COLLECTOR_STATE_LEGACY_LOADS_TOTAL,
        "Total number of state files recovered through the legacy decode path"
    );
    describe_gauge!(
        COLLECTOR_LAST_RUN_TIMESTAMP,
        "Unix timestamp of the last completed collector run"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        COLLECTOR_MESSAGES_PUBLISHED_TOTAL,
        COLLECTOR_FLUSHES_TOTAL,
        COLLECTOR_ROWS_NEW_TOTAL,
        COLLECTOR_STATE_LEGACY_LOADS_TOTAL,
        COLLECTOR_LAST_RUN_TIMESTAMP,
    ];

    #[test]
    fn all_metrics_start_with_n6_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("n6_collector_"),
                "Metric '{}' does not start with 'n6_collector_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in &ALL_METRIC_NAMES[..4] {
            assert!(name.ends_with("_total"), "counter '{}' lacks _total", name);
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }
}
