//! 도메인 타입: 수집기 출력 메시지를 구성하는 공통 타입
//!
//! 수집기는 수집한 데이터 한 건마다 [`OutputMessage`] 하나를 만들어
//! [`OutputTransport`](crate::transport::OutputTransport)에 넘깁니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 출력 메시지 분류 (raw type)
///
/// `Stream`이 아닌 유형(`File`, `Blacklist`)은 `content_type` 속성이 필수입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawType {
    /// 개별 이벤트 스트림
    Stream,
    /// 파일 단위 데이터 (예: CSV 덤프)
    File,
    /// 블랙리스트 스냅샷
    Blacklist,
}

impl RawType {
    /// 와이어 표현 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::File => "file",
            Self::Blacklist => "blacklist",
        }
    }

    /// 이 유형의 메시지가 `content_type` 속성을 가져야 하는지 여부
    pub fn requires_content_type(&self) -> bool {
        !matches!(self, Self::Stream)
    }
}

impl fmt::Display for RawType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RawType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Self::Stream),
            "file" => Ok(Self::File),
            "blacklist" => Ok(Self::Blacklist),
            other => Err(format!(
                "unknown raw type '{other}' (expected: stream, file, blacklist)"
            )),
        }
    }
}

/// 메시지 헤더
///
/// 기본값은 빈 맵입니다. 보조 주석은 `meta` 하위 맵에 넣습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// 최상위 헤더 필드
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// 보조 주석 (`headers["meta"]`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, serde_json::Value>>,
}

impl MessageHeaders {
    /// 빈 헤더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `meta` 하위 맵에 항목을 추가합니다.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.meta
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// 헤더가 완전히 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.meta.is_none()
    }
}

/// 출력 메시지 속성
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputProperties {
    /// 내용 기반 메시지 ID (hex 문자열)
    pub message_id: String,
    /// 메시지 분류
    #[serde(rename = "type")]
    pub raw_type: RawType,
    /// 메시지 생성 시각 (UNIX 초)
    pub timestamp: i64,
    /// 메시지 헤더
    pub headers: MessageHeaders,
    /// MIME 유형 (`Stream`이 아닌 경우에만 존재)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// 전송 계층에 넘겨지는 완성된 출력 메시지
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMessage {
    /// 라우팅 키 (예: `"provider.channel"`)
    pub routing_key: String,
    /// 본문 바이트
    pub body: Bytes,
    /// 메시지 속성
    pub properties: OutputProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_type_roundtrips_through_str() {
        for raw_type in [RawType::Stream, RawType::File, RawType::Blacklist] {
            let parsed: RawType = raw_type.as_str().parse().unwrap();
            assert_eq!(parsed, raw_type);
        }
        assert!("dump".parse::<RawType>().is_err());
    }

    #[test]
    fn only_stream_skips_content_type() {
        assert!(!RawType::Stream.requires_content_type());
        assert!(RawType::File.requires_content_type());
        assert!(RawType::Blacklist.requires_content_type());
    }

    #[test]
    fn headers_meta_is_nested() {
        let mut headers = MessageHeaders::new();
        assert!(headers.is_empty());
        headers.set_meta("mail_subject", "Daily report");
        let json = serde_json::to_value(&headers).unwrap();
        assert_eq!(json["meta"]["mail_subject"], "Daily report");
    }

    #[test]
    fn properties_serialize_type_field() {
        let props = OutputProperties {
            message_id: "abc".to_owned(),
            raw_type: RawType::Stream,
            timestamp: 1_563_000_000,
            headers: MessageHeaders::new(),
            content_type: None,
        };
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["type"], "stream");
        assert!(json.get("content_type").is_none());
    }
}
