//! 수집기 계약과 항목별 출력 파이프라인
//!
//! 수집기 구현은 [`Collector`] trait을 구현하고, 선언 속성은
//! [`CollectorDescriptor`]로 제공합니다. 입력 항목 하나는 다음 순서로
//! [`OutputMessage`] 하나가 됩니다.
//!
//! ```text
//! process_input_data → get_source → get_output_rk → get_output_data_body
//!     → get_output_prop_kwargs (message_id 포함) → OutputMessage
//! ```
//!
//! 각 단계의 결과는 대응하는 `validate_*` 훅을 통과해야 합니다.

use std::collections::BTreeMap;
use std::future::Future;

use bytes::Bytes;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use n6_config::SpecSource;
use n6_core::types::{MessageHeaders, OutputMessage, OutputProperties, RawType};

use crate::error::CollectorError;

/// `source` 식별자의 최대 길이
pub const SOURCE_MAX_LENGTH: usize = 32;

/// 더 이상 지원하지 않는 선언 속성
///
/// 값이 `null`이 아니면 [`CollectorDescriptor::validate`]가 거부합니다.
pub const LEGACY_ATTRIBUTES: &[&str] = &[
    "type",
    "config_group",
    "config_required",
    "source_config_section",
    "output_queue",
];

// ─── 선언 속성 ──────────────────────────────────────────────────────

/// 수집기 선언 속성
///
/// 수집기 타입마다 하나씩 두며, 생성 시점에 [`validate`](Self::validate)로
/// 검사합니다. JSON 속성 맵에서 읽을 때는 알 수 없는 키가 `extra`에 모입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorDescriptor {
    /// 수집기 이름 (로그/메트릭 레이블)
    pub name: String,
    /// 출력 메시지 분류
    pub raw_type: RawType,
    /// 출력 본문의 MIME 유형 (`stream`이 아니면 필수)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// 라우팅 키 접미어
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_format_version_tag: Option<String>,
    /// 선언되지 않은 속성
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CollectorDescriptor {
    /// 필수 속성만으로 선언을 만듭니다.
    pub fn new(name: impl Into<String>, raw_type: RawType) -> Self {
        Self {
            name: name.into(),
            raw_type,
            content_type: None,
            raw_format_version_tag: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_raw_format_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.raw_format_version_tag = Some(tag.into());
        self
    }

    /// JSON 속성 맵에서 선언을 읽고 검증합니다.
    pub fn from_attributes(attributes: serde_json::Value) -> Result<Self, CollectorError> {
        let descriptor: Self = serde_json::from_value(attributes)
            .map_err(|e| CollectorError::Type(format!("invalid collector attributes: {e}")))?;
        descriptor.validated()
    }

    /// 검증을 통과한 선언만 돌려줍니다.
    pub fn validated(self) -> Result<Self, CollectorError> {
        self.validate()?;
        Ok(self)
    }

    /// 선언 속성을 검사합니다.
    ///
    /// # Errors
    ///
    /// - 레거시 속성이나 알 수 없는 속성이 있으면 `Type`
    /// - `raw_type`이 `stream`이 아닌데 `content_type`이 없으면 `NotImplemented`
    /// - 이름이나 `raw_format_version_tag`가 비어 있으면 `Value`
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.name.trim().is_empty() {
            return Err(CollectorError::Value(
                "collector name must not be empty".to_owned(),
            ));
        }

        for (key, value) in &self.extra {
            if LEGACY_ATTRIBUTES.contains(&key.as_str()) {
                if !value.is_null() {
                    return Err(CollectorError::Type(format!(
                        "{}: the legacy attribute `{key}` is no longer supported \
                         and must not be set (got {value})",
                        self.name
                    )));
                }
            } else {
                return Err(CollectorError::Type(format!(
                    "{}: unknown collector attribute `{key}`",
                    self.name
                )));
            }
        }

        check_content_type(&self.name, self.raw_type, self.content_type.as_deref())?;

        if let Some(tag) = &self.raw_format_version_tag {
            if tag.is_empty() || tag.contains(|c: char| c.is_whitespace() || c == '.') {
                return Err(CollectorError::Value(format!(
                    "{}: invalid raw_format_version_tag {tag:?}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn check_content_type(
    name: &str,
    raw_type: RawType,
    content_type: Option<&str>,
) -> Result<(), CollectorError> {
    if raw_type.requires_content_type() && content_type.is_none() {
        return Err(CollectorError::NotImplemented(format!(
            "{name}: attribute `content_type` must be non-None when `raw_type` is \"{raw_type}\""
        )));
    }
    Ok(())
}

// ─── 파이프라인 기본 동작 ───────────────────────────────────────────

/// `provider.channel` 형식의 source 식별자를 검사합니다.
///
/// 두 부분 모두 비어 있지 않은 소문자/숫자/하이픈이어야 하고,
/// 전체 길이는 [`SOURCE_MAX_LENGTH`] 이하여야 합니다.
pub fn validate_source(source: &str) -> Result<(), CollectorError> {
    if source.len() > SOURCE_MAX_LENGTH {
        return Err(CollectorError::Value(format!(
            "source {source:?} is longer than {SOURCE_MAX_LENGTH} characters"
        )));
    }
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    match source.split_once('.') {
        Some((provider, channel)) if valid_part(provider) && valid_part(channel) => Ok(()),
        _ => Err(CollectorError::Value(format!(
            "source {source:?} does not match the `provider.channel` syntax"
        ))),
    }
}

/// 기본 라우팅 키: `source` 또는 `source.{raw_format_version_tag}`
pub fn default_output_rk(source: &str, descriptor: &CollectorDescriptor) -> String {
    match &descriptor.raw_format_version_tag {
        Some(tag) => format!("{source}.{tag}"),
        None => source.to_owned(),
    }
}

/// 내용 주소 방식의 메시지 ID
///
/// `source\0timestamp\0` 뒤에 본문 바이트를 이어 붙인 값의 MD5 16진 표현입니다.
/// 같은 입력이면 항상 같은 ID가 나옵니다 (보안 용도가 아님).
pub fn compute_message_id(source: &str, created_timestamp: i64, body: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(created_timestamp.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// 기본 출력 속성을 만듭니다.
///
/// `get_output_prop_kwargs`를 재정의하는 구현은 이 함수의 결과를
/// 고쳐 쓰면 됩니다 (예: `headers.meta` 추가).
pub fn default_output_properties<C>(
    collector: &C,
    source: &str,
    body: &[u8],
    input: &C::Input,
) -> OutputProperties
where
    C: Collector + ?Sized,
{
    let timestamp = collector.get_output_timestamp();
    let message_id = collector.get_output_message_id(source, timestamp, body, input);
    let descriptor = collector.descriptor();
    let content_type = if descriptor.raw_type.requires_content_type() {
        descriptor.content_type.clone()
    } else {
        None
    };
    OutputProperties {
        message_id,
        raw_type: descriptor.raw_type,
        timestamp,
        headers: MessageHeaders::new(),
        content_type,
    }
}

/// 출력 속성의 기본 검증
///
/// 선언 시점 검증을 통과했더라도 호출 시점에 `content_type` 조건을 다시 확인합니다.
pub fn default_validate_output_props(
    descriptor: &CollectorDescriptor,
    props: &OutputProperties,
) -> Result<(), CollectorError> {
    if props.raw_type != descriptor.raw_type {
        return Err(CollectorError::Value(format!(
            "{}: output type \"{}\" differs from the declared raw_type \"{}\"",
            descriptor.name, props.raw_type, descriptor.raw_type
        )));
    }
    check_content_type(&descriptor.name, props.raw_type, props.content_type.as_deref())?;
    if !props.raw_type.requires_content_type() && props.content_type.is_some() {
        return Err(CollectorError::Value(format!(
            "{}: content_type must not be set for \"stream\" output",
            descriptor.name
        )));
    }
    if props.message_id.is_empty() {
        return Err(CollectorError::Value(format!(
            "{}: empty message_id",
            descriptor.name
        )));
    }
    Ok(())
}

// ─── Collector trait ────────────────────────────────────────────────

/// 수집기 계약
///
/// `get_source`와 `get_output_data_body`만 필수이고, 나머지 훅은 쓸 만한
/// 기본 동작을 가집니다. 발행 루프는 [`get_output_components`](Self::get_output_components)
/// 로 항목 하나를 출력 메시지로 바꿉니다.
pub trait Collector: Send + Sync {
    /// 항목 하나의 입력 데이터
    type Input: Send;

    /// 선언 속성
    fn descriptor(&self) -> &CollectorDescriptor;

    /// 이 수집기 타입의 설정 스펙
    ///
    /// 상위 타입의 스펙을 물려받으려면 `combine(Some(Parent::config_spec()), ...)`로
    /// 만듭니다.
    fn config_spec() -> Option<SpecSource>
    where
        Self: Sized,
    {
        None
    }

    /// 입력 데이터 전처리 (기본: 그대로 통과)
    fn process_input_data(&self, input: Self::Input) -> Result<Self::Input, CollectorError> {
        Ok(input)
    }

    /// `provider.channel` 형식의 source 식별자
    fn get_source(&self, input: &Self::Input) -> Result<String, CollectorError>;

    fn validate_source(&self, source: &str) -> Result<(), CollectorError> {
        validate_source(source)
    }

    fn get_output_rk(&self, source: &str, _input: &Self::Input) -> Result<String, CollectorError> {
        Ok(default_output_rk(source, self.descriptor()))
    }

    fn validate_output_rk(&self, rk: &str) -> Result<(), CollectorError> {
        if rk.is_empty() || rk.contains(char::is_whitespace) {
            return Err(CollectorError::Value(format!("invalid output routing key {rk:?}")));
        }
        Ok(())
    }

    /// 출력 본문
    fn get_output_data_body(
        &self,
        source: &str,
        input: &Self::Input,
    ) -> Result<Bytes, CollectorError>;

    fn validate_output_data_body(&self, _body: &Bytes) -> Result<(), CollectorError> {
        Ok(())
    }

    /// 출력 메시지 생성 시각 (UNIX 초)
    fn get_output_timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn get_output_message_id(
        &self,
        source: &str,
        created_timestamp: i64,
        body: &[u8],
        _input: &Self::Input,
    ) -> String {
        compute_message_id(source, created_timestamp, body)
    }

    fn get_output_prop_kwargs(
        &self,
        source: &str,
        body: &Bytes,
        input: &Self::Input,
    ) -> Result<OutputProperties, CollectorError> {
        Ok(default_output_properties(self, source, body, input))
    }

    fn validate_output_props(&self, props: &OutputProperties) -> Result<(), CollectorError> {
        default_validate_output_props(self.descriptor(), props)
    }

    /// 입력 항목 하나를 검증된 출력 메시지로 바꿉니다.
    fn get_output_components(&self, input: Self::Input) -> Result<OutputMessage, CollectorError> {
        let input = self.process_input_data(input)?;

        let source = self.get_source(&input)?;
        self.validate_source(&source)?;

        let routing_key = self.get_output_rk(&source, &input)?;
        self.validate_output_rk(&routing_key)?;

        let body = self.get_output_data_body(&source, &input)?;
        self.validate_output_data_body(&body)?;

        let properties = self.get_output_prop_kwargs(&source, &body, &input)?;
        self.validate_output_props(&properties)?;

        Ok(OutputMessage {
            routing_key,
            body,
            properties,
        })
    }

    /// 모든 발행이 끝나고 전송 계층이 정지된 뒤 호출됩니다.
    fn after_completed_publishing(
        &mut self,
    ) -> impl Future<Output = Result<(), CollectorError>> + Send {
        async { Ok(()) }
    }
}
