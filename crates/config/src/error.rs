//! 설정 계층 에러 타입
//!
//! - [`ConfigSpecError`]: 설정 텍스트/스펙 텍스트 구조 에러와 위치 조회 실패
//! - [`ConfigSpecEggError`]: 스펙 결합(상속) 단계의 에러
//! - [`ConfigError`]: 설정 값 조립 단계의 에러 (누락/불법 옵션, 변환 실패)
//!
//! 세 타입 모두 `From<...> for N6Error`가 구현되어 있어 `?`로 전파됩니다.

use n6_core::error::N6Error;

/// 설정 텍스트 구조 에러
///
/// 잘못된 줄, 중복 섹션/옵션, 잘못된 변환기 이름, 예약 문자 사용과
/// 존재하지 않는 위치 조회를 표현합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSpecError {
    /// 문법에 맞지 않는 줄
    #[error("line {line}: {reason}: {content:?}")]
    Syntax {
        /// 1부터 시작하는 줄 번호
        line: usize,
        /// 실패 사유
        reason: String,
        /// 문제가 된 줄 내용
        content: String,
    },

    /// 같은 이름의 섹션이 두 번 나옴
    #[error("line {line}: duplicate section name {name:?}")]
    DuplicateSection {
        /// 섹션 이름
        name: String,
        /// 1부터 시작하는 줄 번호
        line: usize,
    },

    /// 같은 섹션 안에서 같은 이름의 옵션이 두 번 나옴 (대소문자 무시)
    #[error("line {line}: duplicate option name {option:?} in section {section:?}")]
    DuplicateOption {
        /// 섹션 이름
        section: String,
        /// 옵션 이름 (소문자)
        option: String,
        /// 1부터 시작하는 줄 번호
        line: usize,
    },

    /// 변환기 이름이 단일 비공백 토큰이 아님
    #[error("{location}: invalid converter spec {spec:?}")]
    InvalidConverterSpec {
        /// `section.option` 위치
        location: String,
        /// 문제가 된 변환기 표기
        spec: String,
    },

    /// 스펙 텍스트에 결합 엔진 예약 문자가 포함됨
    #[error("config spec contains a reserved control character ({ch:?})")]
    ReservedCharacter {
        /// 발견된 예약 문자
        ch: char,
    },

    /// 위치 표기가 `section` 또는 `section.option` 형식이 아님
    #[error("invalid location {0:?}")]
    InvalidLocation(String),

    /// 섹션 없음 (`KeyError` 계열)
    #[error("no such section: {0:?}")]
    NoSection(String),

    /// 옵션 없음 (`KeyError` 계열)
    #[error("no such option: {option:?} (in section {section:?})")]
    NoOption {
        /// 섹션 이름
        section: String,
        /// 옵션 이름
        option: String,
    },
}

impl ConfigSpecError {
    /// 조회 실패(`KeyError` 계열) 에러인지 확인합니다.
    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::NoSection(_) | Self::NoOption { .. })
    }
}

/// 스펙 결합 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSpecEggError {
    /// 상속 계층 간 옵션 변환기 불일치
    #[error(
        "{tag}: converter spec mismatch for option {location:?} \
         (background: {background:?}, foreground: {foreground:?})"
    )]
    ConverterSpecMismatch {
        /// 결합 대상 태그 (`module.Type.config_spec`)
        tag: String,
        /// `section.option` 위치
        location: String,
        /// 상위(조상) 쪽 변환기
        background: String,
        /// 하위 쪽 변환기
        foreground: String,
    },

    /// 상속 계층 간 자유 옵션 변환기 불일치
    #[error(
        "{tag}: free options converter spec mismatch in section {section:?} \
         (background: {background:?}, foreground: {foreground:?})"
    )]
    FreeOptsConverterSpecMismatch {
        /// 결합 대상 태그
        tag: String,
        /// 섹션 이름
        section: String,
        /// 상위 쪽 변환기
        background: String,
        /// 하위 쪽 변환기
        foreground: String,
    },

    /// 최종 렌더링 결과에 채워지지 않은 템플릿 키가 남음
    #[error("{tag}: missing format data keys: {}", .keys.join(", "))]
    MissingFormatKeys {
        /// 결합 대상 태그 (단순 문자열 스펙이면 빈 문자열)
        tag: String,
        /// 누락된 키 이름 (정렬, 중복 제거)
        keys: Vec<String>,
    },

    /// 템플릿 문법 오류
    #[error("bad format template: {0}")]
    Template(String),

    /// 하위 렌더링/파싱 에러를 감싼 것
    #[error("{tag}: {reason}")]
    Wrapped {
        /// 결합 대상 태그
        tag: String,
        /// 원래 에러 메시지
        reason: String,
    },
}

/// 설정 값 조립 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 누락/불법 옵션과 변환 실패를 모두 모은 보고
    #[error("{0}")]
    Invalid(String),

    /// 섹션 없음 (`KeyError` 호환)
    #[error("no config section {section:?}")]
    NoSection {
        /// 섹션 이름
        section: String,
    },

    /// 옵션 없음 (`KeyError` 호환)
    #[error("no config option {option:?} in section {section:?}")]
    NoOption {
        /// 섹션 이름
        section: String,
        /// 옵션 이름
        option: String,
    },

    /// 값의 타입이 요청한 타입과 다름
    #[error("config option {location}: {reason}")]
    WrongType {
        /// `section.option` 위치
        location: String,
        /// 실패 사유
        reason: String,
    },

    /// 단일 섹션을 기대했으나 스펙이 그렇지 않음
    #[error("expected config spec to declare exactly one section, {0}")]
    NotSingleSection(String),

    /// 스펙 텍스트 구조 에러
    #[error(transparent)]
    Spec(#[from] ConfigSpecError),

    /// 스펙 결합 에러
    #[error(transparent)]
    SpecEgg(#[from] ConfigSpecEggError),

    /// 설정 파일 읽기 실패
    #[error("cannot read config file {path}: {reason}")]
    FileRead {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 잘못된 파일명 정규식
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl ConfigError {
    /// `KeyError`로도 취급되어야 하는 조회 실패인지 확인합니다.
    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::NoSection { .. } | Self::NoOption { .. })
    }
}

impl From<ConfigSpecError> for N6Error {
    fn from(err: ConfigSpecError) -> Self {
        N6Error::ConfigSpec(err.to_string())
    }
}

impl From<ConfigSpecEggError> for N6Error {
    fn from(err: ConfigSpecEggError) -> Self {
        N6Error::ConfigSpec(err.to_string())
    }
}

impl From<ConfigError> for N6Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Spec(e) => e.into(),
            ConfigError::SpecEgg(e) => e.into(),
            other => N6Error::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_error_classification() {
        assert!(ConfigSpecError::NoSection("s".to_owned()).is_key_error());
        assert!(
            !ConfigSpecError::InvalidLocation("a..".to_owned()).is_key_error()
        );
        let err = ConfigError::NoOption {
            section: "s".to_owned(),
            option: "o".to_owned(),
        };
        assert!(err.is_key_error());
        assert!(!ConfigError::Invalid("x".to_owned()).is_key_error());
    }

    #[test]
    fn missing_keys_display() {
        let err = ConfigSpecEggError::MissingFormatKeys {
            tag: "m.Collector.config_spec".to_owned(),
            keys: vec!["a".to_owned(), "b".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "m.Collector.config_spec: missing format data keys: a, b"
        );
    }

    #[test]
    fn spec_errors_convert_to_config_spec_n6_error() {
        let err: N6Error = ConfigError::Spec(ConfigSpecError::NoSection("s".to_owned())).into();
        assert!(matches!(err, N6Error::ConfigSpec(_)));
        let err: N6Error = ConfigError::Invalid("bad".to_owned()).into();
        assert!(matches!(err, N6Error::Config(_)));
    }
}
