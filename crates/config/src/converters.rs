//! 설정 값 변환기
//!
//! 변환기는 이름으로 등록된 `Fn(&str) -> Result<ConfigValue, String>`입니다.
//! `list_of_<name>` 형태의 이름은 등록된 `<name>` 변환기로 자동 구성됩니다.
//!
//! # 기본 변환기
//! | 이름 | 결과 |
//! |---|---|
//! | `str` | 문자열 그대로 |
//! | `bytes` | UTF-8 바이트열 |
//! | `bool` | `1/yes/true/on`, `0/no/false/off` (대소문자 무시) |
//! | `int`, `float` | 숫자 (`_` 구분자 허용) |
//! | `date`, `datetime` | ISO 8601 (시각은 UTC로 정규화) |
//! | `path` | `~` 확장 후 절대 경로 |
//! | `importable_dotted_name` | 점으로 구분된 식별자 (등록된 이름만) |
//! | `py`, `py_namespaces_dict` | 리터럴 표현식 |
//! | `json` | JSON 값 |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::pyliteral::{ensure_string_keys, eval_literal};
use crate::value::ConfigValue;

/// 변환기 함수
pub type Converter = Arc<dyn Fn(&str) -> Result<ConfigValue, String> + Send + Sync>;

/// 리스트 변환기 이름 접두사
pub const LIST_OF_PREFIX: &str = "list_of_";

/// 이름 → 변환기 표
#[derive(Clone, Default)]
pub struct ConverterTable {
    converters: BTreeMap<String, Converter>,
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterTable")
            .field("names", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConverterTable {
    /// 빈 표를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 변환기를 모두 등록한 표를 만듭니다.
    ///
    /// `importable_dotted_name`은 문법만 검사합니다.
    pub fn builtin() -> Self {
        Self::builtin_with_registry(DottedNameRegistry::default())
    }

    /// 점 이름 레지스트리를 사용하는 기본 표를 만듭니다.
    pub fn builtin_with_registry(registry: DottedNameRegistry) -> Self {
        let mut table = Self::new();
        table.insert("str", |raw| Ok(ConfigValue::Str(raw.to_owned())));
        table.insert("bytes", |raw| Ok(ConfigValue::Bytes(raw.as_bytes().to_vec())));
        table.insert("bool", convert_bool);
        table.insert("int", convert_int);
        table.insert("float", convert_float);
        table.insert("date", convert_date);
        table.insert("datetime", convert_datetime);
        table.insert("path", convert_path);
        table.insert("importable_dotted_name", move |raw| registry.resolve(raw));
        table.insert("py", eval_literal);
        table.insert("py_namespaces_dict", convert_py_namespaces_dict);
        table.insert("json", convert_json);
        table
    }

    /// 변환기를 등록합니다. 같은 이름이 있으면 덮어씁니다.
    pub fn insert<F>(&mut self, name: impl Into<String>, converter: F)
    where
        F: Fn(&str) -> Result<ConfigValue, String> + Send + Sync + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
    }

    /// 다른 표의 변환기로 덮어씁니다.
    pub fn extend(&mut self, other: &ConverterTable) {
        for (name, converter) in &other.converters {
            self.converters.insert(name.clone(), Arc::clone(converter));
        }
    }

    /// 등록된 이름 목록을 반환합니다 (`list_of_*` 파생 이름 제외).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    /// 이름에 해당하는 변환기를 찾습니다.
    pub fn get(&self, name: &str) -> Option<Converter> {
        if let Some(converter) = self.converters.get(name) {
            return Some(Arc::clone(converter));
        }
        let item_name = name.strip_prefix(LIST_OF_PREFIX)?;
        let item = self.get(item_name)?;
        let list: Converter = Arc::new(move |raw: &str| {
            split_list(raw)
                .into_iter()
                .map(|part| item(part))
                .collect::<Result<Vec<_>, _>>()
                .map(ConfigValue::List)
        });
        Some(list)
    }

    /// 이름의 변환기로 값을 변환합니다.
    pub fn convert(&self, name: &str, raw: &str) -> Result<ConfigValue, String> {
        let converter = self
            .get(name)
            .ok_or_else(|| format!("unknown converter {name:?}"))?;
        converter(raw)
    }
}

/// `importable_dotted_name` 변환기가 받아들이는 이름들
///
/// 비어 있으면 문법 검사만 합니다.
#[derive(Debug, Clone, Default)]
pub struct DottedNameRegistry {
    names: BTreeSet<String>,
}

impl DottedNameRegistry {
    /// 빈 레지스트리를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름을 등록합니다.
    pub fn register(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// 이름이 등록되어 있는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn resolve(&self, raw: &str) -> Result<ConfigValue, String> {
        let name = raw.trim();
        if !is_dotted_name(name) {
            return Err(format!("{name:?} is not a valid dotted name"));
        }
        if !self.names.is_empty() && !self.names.contains(name) {
            return Err(format!("{name:?} cannot be imported (not registered)"));
        }
        Ok(ConfigValue::Str(name.to_owned()))
    }
}

fn is_dotted_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        })
}

/// 쉼표로 나누고 앞뒤 공백을 제거합니다. 마지막 빈 원소는 버립니다.
pub fn split_list(raw: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

// ─── 기본 변환기 ─────────────────────────────────────────────────

fn convert_bool(raw: &str) -> Result<ConfigValue, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(ConfigValue::Bool(true)),
        "0" | "no" | "false" | "off" => Ok(ConfigValue::Bool(false)),
        _ => Err(format!("{raw:?} is not a valid boolean")),
    }
}

/// 숫자 사이의 `_`만 허용합니다.
fn strip_digit_separators(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if *c == '_' {
            let before = i.checked_sub(1).and_then(|j| chars.get(j));
            let after = chars.get(i + 1);
            if !before.is_some_and(char::is_ascii_digit) || !after.is_some_and(char::is_ascii_digit)
            {
                return None;
            }
        }
    }
    Some(trimmed.replace('_', ""))
}

fn convert_int(raw: &str) -> Result<ConfigValue, String> {
    strip_digit_separators(raw)
        .and_then(|s| s.parse::<i64>().ok())
        .map(ConfigValue::Int)
        .ok_or_else(|| format!("invalid literal for int: {raw:?}"))
}

fn convert_float(raw: &str) -> Result<ConfigValue, String> {
    strip_digit_separators(raw)
        .and_then(|s| s.parse::<f64>().ok())
        .map(ConfigValue::Float)
        .ok_or_else(|| format!("could not convert string to float: {raw:?}"))
}

fn convert_date(raw: &str) -> Result<ConfigValue, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(ConfigValue::Date)
        .map_err(|e| format!("invalid ISO date {raw:?}: {e}"))
}

/// ISO 8601 시각을 UTC로 정규화합니다. 시간대가 없으면 UTC로 간주합니다.
fn convert_datetime(raw: &str) -> Result<ConfigValue, String> {
    parse_iso_datetime(raw.trim())
        .map(ConfigValue::DateTime)
        .ok_or_else(|| format!("invalid ISO datetime {raw:?}"))
}

pub(crate) fn parse_iso_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let zulu;
    let text = match text.strip_suffix(['Z', 'z']) {
        Some(local) => {
            zulu = format!("{local}+00:00");
            zulu.as_str()
        }
        None => text,
    };
    const OFFSET_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%d %H:%M%z",
    ];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn convert_path(raw: &str) -> Result<ConfigValue, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty path".to_owned());
    }
    let expanded = expand_user(raw)?;
    if !expanded.is_absolute() {
        return Err(format!("{raw:?} is not an absolute path"));
    }
    Ok(ConfigValue::Path(expanded))
}

/// `~` 또는 `~/...`를 `HOME` 기준으로 확장합니다.
pub(crate) fn expand_user(raw: &str) -> Result<PathBuf, String> {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return Ok(PathBuf::from(raw)),
    };
    let home = std::env::var_os("HOME").ok_or_else(|| "cannot expand '~': HOME is not set".to_owned())?;
    let mut path = PathBuf::from(home);
    let rest = rest.trim_start_matches('/');
    if !rest.is_empty() {
        path.push(rest);
    }
    Ok(path)
}

fn convert_py_namespaces_dict(raw: &str) -> Result<ConfigValue, String> {
    let value = eval_literal(raw)?;
    if !matches!(value, ConfigValue::Dict(_)) {
        return Err(format!("expected a dict literal, got {}", value.kind()));
    }
    ensure_string_keys(&value)?;
    Ok(value)
}

fn convert_json(raw: &str) -> Result<ConfigValue, String> {
    serde_json::from_str(raw)
        .map(ConfigValue::Json)
        .map_err(|e| format!("invalid JSON: {e}"))
}
