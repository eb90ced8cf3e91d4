//! 변환된 설정 값
//!
//! 변환기는 문자열 원본 값을 [`ConfigValue`]로 바꿉니다.
//! [`FromConfigValue`]는 `section.get::<T>(name)` 형태의 타입 조회를 제공합니다.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};

/// 변환된 설정 값
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// 값 없음 (`py` 변환기의 `None`)
    None,
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 실수
    Float(f64),
    /// 문자열
    Str(String),
    /// 바이트열
    Bytes(Vec<u8>),
    /// 날짜
    Date(NaiveDate),
    /// UTC 시각
    DateTime(DateTime<Utc>),
    /// 절대 경로
    Path(PathBuf),
    /// 리스트
    List(Vec<ConfigValue>),
    /// 튜플
    Tuple(Vec<ConfigValue>),
    /// 집합 (중복 제거, 등장 순서 유지)
    Set(Vec<ConfigValue>),
    /// 딕셔너리 (삽입 순서 유지)
    Dict(Vec<(ConfigValue, ConfigValue)>),
    /// JSON 값
    Json(serde_json::Value),
}

impl ConfigValue {
    /// 값 종류 이름을 반환합니다 (에러 메시지용).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::Dict(_) => "dict",
            Self::Json(_) => "json",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 실수 값을 반환합니다. 정수도 실수로 받아들입니다.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// 리스트/튜플/집합의 원소를 반환합니다.
    pub fn as_seq(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(ConfigValue, ConfigValue)]> {
        match self {
            Self::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// 문자열 키로 딕셔너리 값을 찾습니다.
    pub fn dict_get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// JSON으로 표현합니다 (출력용).
    ///
    /// 바이트열은 손실 없는 UTF-8 디코딩 결과 문자열, 문자열이 아닌 딕셔너리
    /// 키는 JSON 문자열 표현을 씁니다.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::None => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Str(s) => Value::String(s.clone()),
            Self::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::Date(d) => Value::String(d.to_string()),
            Self::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Self::Path(p) => Value::String(p.display().to_string()),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => {
                Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Dict(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Self::Str(s) => s.clone(),
                            other => other.to_json().to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect(),
            ),
            Self::Json(v) => v.clone(),
        }
    }
}

/// [`ConfigValue`]에서 Rust 타입으로의 변환
pub trait FromConfigValue: Sized {
    /// 변환에 실패하면 사유를 돌려줍니다.
    fn from_config_value(value: &ConfigValue) -> Result<Self, String>;
}

fn wrong_kind(expected: &str, value: &ConfigValue) -> String {
    format!("expected {expected}, got {}", value.kind())
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| wrong_kind("bool", value))
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value.as_int().ok_or_else(|| wrong_kind("int", value))
    }
}

impl FromConfigValue for u64 {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        let i = value.as_int().ok_or_else(|| wrong_kind("int", value))?;
        u64::try_from(i).map_err(|_| format!("expected non-negative int, got {i}"))
    }
}

impl FromConfigValue for usize {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        let i = value.as_int().ok_or_else(|| wrong_kind("int", value))?;
        usize::try_from(i).map_err(|_| format!("expected non-negative int, got {i}"))
    }
}

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value.as_float().ok_or_else(|| wrong_kind("float", value))
    }
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| wrong_kind("str", value))
    }
}

impl FromConfigValue for Vec<u8> {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        match value {
            ConfigValue::Bytes(b) => Ok(b.clone()),
            other => Err(wrong_kind("bytes", other)),
        }
    }
}

impl FromConfigValue for PathBuf {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value
            .as_path()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| wrong_kind("path", value))
    }
}

impl FromConfigValue for NaiveDate {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        match value {
            ConfigValue::Date(d) => Ok(*d),
            other => Err(wrong_kind("date", other)),
        }
    }
}

impl FromConfigValue for DateTime<Utc> {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        match value {
            ConfigValue::DateTime(dt) => Ok(*dt),
            other => Err(wrong_kind("datetime", other)),
        }
    }
}

impl FromConfigValue for serde_json::Value {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        Ok(value.to_json())
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        value
            .as_seq()
            .ok_or_else(|| wrong_kind("list", value))?
            .iter()
            .map(T::from_config_value)
            .collect()
    }
}

impl<T: FromConfigValue> FromConfigValue for Option<T> {
    fn from_config_value(value: &ConfigValue) -> Result<Self, String> {
        match value {
            ConfigValue::None => Ok(None),
            other => T::from_config_value(other).map(Some),
        }
    }
}
