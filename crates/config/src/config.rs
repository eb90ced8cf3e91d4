//! 설정 값 조립
//!
//! 최종 스펙과 원본 키/값 데이터(설정 파일 또는 `section.option` 설정 맵)로
//! 변환된 [`Config`]를 만듭니다.
//!
//! # 사용 예시
//! ```ignore
//! let config = Config::builder("[S]\nx = 1 :: int\ny :: bool\n")
//!     .settings(settings)
//!     .build()?;
//! let x: i64 = config.get_section("S")?.get("x")?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::converters::ConverterTable;
use crate::egg::{FormatArgs, FormatData, SpecSource};
use crate::error::ConfigError;
use crate::loader::{ConfigFileCache, ConfigLoadOptions, load_config_files};
use crate::spec::{ConfigSpec, SectSpec};
use crate::text::RawConfigData;
use crate::value::{ConfigValue, FromConfigValue};

/// `section.option` → 값 형태의 평면 설정 맵
pub type Settings = BTreeMap<String, serde_json::Value>;

/// 변환된 섹션: 옵션 이름 → 값
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSection {
    sect_name: String,
    values: BTreeMap<String, ConfigValue>,
}

impl ConfigSection {
    /// 빈 섹션을 만듭니다.
    pub fn new(sect_name: impl Into<String>) -> Self {
        Self {
            sect_name: sect_name.into(),
            values: BTreeMap::new(),
        }
    }

    /// 섹션 이름
    pub fn sect_name(&self) -> &str {
        &self.sect_name
    }

    /// 옵션 값을 설정합니다.
    pub fn insert(&mut self, name: impl Into<String>, value: ConfigValue) {
        self.values.insert(name.into(), value);
    }

    /// 옵션 값을 조회합니다. 없으면 [`ConfigError::NoOption`]입니다.
    pub fn get_value(&self, name: &str) -> Result<&ConfigValue, ConfigError> {
        self.values.get(name).ok_or_else(|| ConfigError::NoOption {
            section: self.sect_name.clone(),
            option: name.to_owned(),
        })
    }

    /// 옵션 값을 원하는 타입으로 꺼냅니다.
    pub fn get<T: FromConfigValue>(&self, name: &str) -> Result<T, ConfigError> {
        T::from_config_value(self.get_value(name)?).map_err(|reason| ConfigError::WrongType {
            location: format!("{}.{name}", self.sect_name),
            reason,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 옵션을 이름 순서로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON 객체로 표현합니다.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// 변환된 설정: 섹션 이름 → [`ConfigSection`]
///
/// 스펙에 선언된 섹션만 들어 있습니다.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    sections: BTreeMap<String, ConfigSection>,
}

impl Config {
    /// 스펙으로 빌더를 시작합니다.
    pub fn builder(spec: impl Into<SpecSource>) -> ConfigBuilder {
        ConfigBuilder::new(spec.into())
    }

    /// 파싱된 스펙과 원본 데이터로 설정을 조립합니다.
    ///
    /// 누락/불법 옵션과 변환 실패를 모두 모은 뒤 하나의
    /// [`ConfigError::Invalid`]로 보고합니다.
    pub fn from_raw_data(
        spec: &ConfigSpec,
        raw: &RawConfigData,
        converters: &ConverterTable,
    ) -> Result<Self, ConfigError> {
        let mut report = ErrorReport::default();
        let mut sections = BTreeMap::new();

        for sect_spec in spec.get_all_sect_specs() {
            let raw_sect = match raw.get(&sect_spec.name) {
                Some(raw_sect) => Some(raw_sect),
                None if sect_spec.required() => {
                    report.missing_sections.push(sect_spec.name.clone());
                    continue;
                }
                None => {
                    tracing::info!(
                        section = %sect_spec.name,
                        "config section not found, using its default values"
                    );
                    None
                }
            };
            let section = build_section(sect_spec, raw_sect, converters, &mut report);
            sections.insert(sect_spec.name.clone(), section);
        }

        if let Some(message) = report.into_message() {
            tracing::error!(error = %message, "invalid configuration");
            return Err(ConfigError::Invalid(message));
        }
        Ok(Self { sections })
    }

    /// 섹션을 조회합니다. 없으면 [`ConfigError::NoSection`]입니다.
    pub fn get_section(&self, name: &str) -> Result<&ConfigSection, ConfigError> {
        self.sections.get(name).ok_or_else(|| ConfigError::NoSection {
            section: name.to_owned(),
        })
    }

    pub fn contains_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// 섹션 이름 순서로 순회합니다.
    pub fn sections(&self) -> impl Iterator<Item = &ConfigSection> {
        self.sections.values()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// JSON 객체로 표현합니다.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.sections
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn into_single_section(mut self) -> Result<ConfigSection, ConfigError> {
        let names: Vec<String> = self.sections.keys().cloned().collect();
        match names.as_slice() {
            [name] => self
                .sections
                .remove(name)
                .ok_or_else(|| ConfigError::NoSection {
                    section: name.clone(),
                }),
            [] => Err(ConfigError::NotSingleSection("found none".to_owned())),
            many => Err(ConfigError::NotSingleSection(format!(
                "found: {}",
                many.join(", ")
            ))),
        }
    }
}

fn build_section(
    sect_spec: &SectSpec,
    raw_sect: Option<&BTreeMap<String, String>>,
    converters: &ConverterTable,
    report: &mut ErrorReport,
) -> ConfigSection {
    let mut section = ConfigSection::new(sect_spec.name.clone());
    let location = |opt: &str| format!("{}.{opt}", sect_spec.name);

    for opt_spec in &sect_spec.opt_specs {
        let raw_value = raw_sect
            .and_then(|r| r.get(&opt_spec.name))
            .or(opt_spec.default.as_ref());
        let Some(raw_value) = raw_value else {
            report.missing_options.push(location(&opt_spec.name));
            continue;
        };
        match converters.convert(&opt_spec.converter_spec, raw_value) {
            Ok(value) => section.insert(opt_spec.name.clone(), value),
            Err(reason) => report
                .conversion_errors
                .push(format!("{} ({reason})", location(&opt_spec.name))),
        }
    }

    for (name, raw_value) in raw_sect.into_iter().flatten() {
        if sect_spec.get_opt_spec(name).is_some() {
            continue;
        }
        if !sect_spec.free_opts_allowed {
            report.illegal_options.push(location(name));
            continue;
        }
        match converters.convert(&sect_spec.free_opts_converter_spec, raw_value) {
            Ok(value) => section.insert(name.clone(), value),
            Err(reason) => report
                .conversion_errors
                .push(format!("{} ({reason})", location(name))),
        }
    }
    section
}

#[derive(Default)]
struct ErrorReport {
    missing_sections: Vec<String>,
    missing_options: Vec<String>,
    illegal_options: Vec<String>,
    conversion_errors: Vec<String>,
}

impl ErrorReport {
    fn into_message(self) -> Option<String> {
        let clauses: Vec<String> = [
            ("missing required config sections", self.missing_sections),
            ("missing required config options", self.missing_options),
            ("illegal config options", self.illegal_options),
            ("config option value conversion errors", self.conversion_errors),
        ]
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(label, items)| format!("{label}: {}", items.join(", ")))
        .collect();
        (!clauses.is_empty()).then(|| clauses.join("; "))
    }
}

/// 평면 설정 맵을 섹션별 원본 데이터로 바꿉니다.
///
/// `.`이 없는 키는 무시합니다. 문자열이 아닌 값은 문자열 표현으로 바뀝니다.
pub fn settings_to_raw_data(settings: &Settings) -> RawConfigData {
    let mut raw = RawConfigData::new();
    for (key, value) in settings {
        let Some((section, option)) = key.split_once('.') else {
            continue;
        };
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        raw.entry(section.to_owned())
            .or_default()
            .insert(option.to_lowercase(), text);
    }
    raw
}

// ─── 빌더 ─────────────────────────────────────────────────────────

/// [`Config`] 빌더
#[derive(Debug)]
pub struct ConfigBuilder {
    spec: SpecSource,
    settings: Option<Settings>,
    raw_data: Option<RawConfigData>,
    custom_converters: ConverterTable,
    load_options: ConfigLoadOptions,
    format_data: Option<FormatData>,
    cache: Option<Arc<ConfigFileCache>>,
}

impl ConfigBuilder {
    fn new(spec: SpecSource) -> Self {
        Self {
            spec,
            settings: None,
            raw_data: None,
            custom_converters: ConverterTable::new(),
            load_options: ConfigLoadOptions::default(),
            format_data: None,
            cache: None,
        }
    }

    /// 설정 파일 대신 `section.option` 설정 맵을 사용합니다.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 이미 섹션별로 나뉜 원본 데이터를 사용합니다.
    ///
    /// 옵션 이름은 설정 파일과 마찬가지로 소문자로 바뀝니다.
    pub fn raw_data(mut self, raw_data: RawConfigData) -> Self {
        let lowered = raw_data
            .into_iter()
            .map(|(sect_name, options)| {
                let options = options
                    .into_iter()
                    .map(|(opt_name, value)| (opt_name.to_lowercase(), value))
                    .collect();
                (sect_name, options)
            })
            .collect();
        self.raw_data = Some(lowered);
        self
    }

    /// 추가 변환기를 등록합니다. 같은 이름의 기본 변환기를 덮어씁니다.
    pub fn custom_converters(mut self, converters: ConverterTable) -> Self {
        self.custom_converters = converters;
        self
    }

    /// 설정 파일 탐색 조건을 통째로 바꿉니다.
    pub fn load_options(mut self, options: ConfigLoadOptions) -> Self {
        self.load_options = options;
        self
    }

    /// 설정 파일 루트 디렉토리를 바꿉니다.
    pub fn roots(mut self, roots: impl IntoIterator<Item = impl Into<std::path::PathBuf>>) -> Self {
        self.load_options = self.load_options.with_roots(roots);
        self
    }

    pub fn filename_regex(mut self, regex: impl Into<String>) -> Self {
        self.load_options = self.load_options.with_filename_regex(regex);
        self
    }

    pub fn filename_excluding_regex(mut self, regex: impl Into<String>) -> Self {
        self.load_options = self.load_options.with_filename_excluding_regex(regex);
        self
    }

    /// 스펙 템플릿 포맷 데이터를 지정합니다.
    pub fn format_data(mut self, data: FormatData) -> Self {
        self.format_data = Some(data);
        self
    }

    /// 설정 파일 읽기 캐시를 사용합니다.
    pub fn cache(mut self, cache: Arc<ConfigFileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 설정을 조립합니다.
    pub fn build(self) -> Result<Config, ConfigError> {
        let raw = self.resolve_raw_data()?;
        let spec = ConfigSpec::from_source(&self.spec, FormatArgs::from(self.format_data.as_ref()))?;
        let mut converters = ConverterTable::builtin();
        converters.extend(&self.custom_converters);
        Config::from_raw_data(&spec, &raw, &converters)
    }

    /// 섹션이 정확히 하나인 스펙으로 그 섹션만 조립합니다.
    pub fn build_section(self) -> Result<ConfigSection, ConfigError> {
        let spec = ConfigSpec::from_source(&self.spec, FormatArgs::from(self.format_data.as_ref()))?;
        match spec.get_all_sect_specs() {
            [_] => {}
            [] => return Err(ConfigError::NotSingleSection("found none".to_owned())),
            many => {
                let names: Vec<&str> = many.iter().map(|s| s.name.as_str()).collect();
                return Err(ConfigError::NotSingleSection(format!(
                    "found: {}",
                    names.join(", ")
                )));
            }
        }
        self.build()?.into_single_section()
    }

    fn resolve_raw_data(&self) -> Result<RawConfigData, ConfigError> {
        if let Some(raw) = &self.raw_data {
            return Ok(raw.clone());
        }
        if let Some(settings) = &self.settings {
            return Ok(settings_to_raw_data(settings));
        }
        match &self.cache {
            Some(cache) => Ok(cache.get_or_load(&self.load_options)?.as_ref().clone()),
            None => load_config_files(&self.load_options),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn settings(pairs: &[(&str, serde_json::Value)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn settings_flattening() {
        let raw = settings_to_raw_data(&settings(&[
            ("S.X", json!("1")),
            ("S.flag", json!(true)),
            ("S.n", json!(5)),
            ("nodot", json!("ignored")),
        ]));
        assert_eq!(raw["S"]["x"], "1");
        assert_eq!(raw["S"]["flag"], "true");
        assert_eq!(raw["S"]["n"], "5");
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn defaults_and_conversion() {
        let config = Config::builder("[S]\nx = 1 :: int\ny :: bool\nz = a, b :: list_of_str\n")
            .settings(settings(&[("S.y", json!("yes"))]))
            .build()
            .unwrap();
        let s = config.get_section("S").unwrap();
        assert_eq!(s.sect_name(), "S");
        assert_eq!(s.get::<i64>("x").unwrap(), 1);
        assert!(s.get::<bool>("y").unwrap());
        assert_eq!(s.get::<Vec<String>>("z").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn raw_data_option_names_are_case_insensitive() {
        let mut raw = RawConfigData::new();
        raw.entry("S".to_owned())
            .or_default()
            .insert("URL".to_owned(), "http://example.com".to_owned());
        let config = Config::builder("[S]\nurl :: str\n")
            .raw_data(raw)
            .build()
            .unwrap();
        assert_eq!(
            config.get_section("S").unwrap().get::<String>("url").unwrap(),
            "http://example.com"
        );
    }

    #[test]
    fn missing_non_required_section_uses_defaults() {
        let config = Config::builder("[opt]\na = 5 :: int\n")
            .settings(Settings::new())
            .build()
            .unwrap();
        assert_eq!(config.get_section("opt").unwrap().get::<i64>("a").unwrap(), 5);
    }

    #[test]
    fn aggregated_errors() {
        let spec = "[req]\nneeded :: int\n[S]\nx :: int\ny = 1 :: int\n[T]\nt = 1\n";
        let err = Config::builder(spec)
            .settings(settings(&[
                ("S.y", json!("nope")),
                ("S.extra", json!("1")),
                ("T.t", json!("ok")),
            ]))
            .build()
            .unwrap_err();
        let message = err.to_string();
        assert_eq!(
            message,
            "missing required config sections: req; \
             missing required config options: S.x; \
             illegal config options: S.extra; \
             config option value conversion errors: S.y (invalid literal for int: \"nope\")"
        );
        assert!(!err.is_key_error());
    }

    #[test]
    fn free_options() {
        let config = Config::builder("[S]\nknown = 1 :: int\n... :: int\n")
            .settings(settings(&[("S.other", json!("7"))]))
            .build()
            .unwrap();
        let s = config.get_section("S").unwrap();
        assert_eq!(s.get::<i64>("other").unwrap(), 7);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn unknown_converter_is_conversion_error() {
        let err = Config::builder("[S]\nx = 1 :: frobnicate\n")
            .settings(Settings::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown converter \"frobnicate\""));
    }

    #[test]
    fn lookup_errors_are_key_errors() {
        let config = Config::builder("[S]\nx = 1\n")
            .settings(Settings::new())
            .build()
            .unwrap();
        let err = config.get_section("nope").unwrap_err();
        assert!(err.is_key_error());
        let err = config.get_section("S").unwrap().get_value("nope").unwrap_err();
        assert!(err.is_key_error());
        assert_eq!(
            err.to_string(),
            "no config option \"nope\" in section \"S\""
        );
        let err = config.get_section("S").unwrap().get::<i64>("x").unwrap_err();
        assert!(matches!(err, ConfigError::WrongType { .. }));
    }

    #[test]
    fn single_section() {
        let section = Config::builder("[only]\na = 1 :: int\n")
            .settings(Settings::new())
            .build_section()
            .unwrap();
        assert_eq!(section.sect_name(), "only");

        let err = Config::builder("[a]\n[b]\n")
            .settings(Settings::new())
            .build_section()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected config spec to declare exactly one section, found: a, b"
        );
        let err = Config::builder("")
            .settings(Settings::new())
            .build_section()
            .unwrap_err();
        assert!(err.to_string().ends_with("found none"));
    }

    #[test]
    fn custom_converter_is_used() {
        let mut custom = ConverterTable::new();
        custom.insert("upper", |raw: &str| Ok(ConfigValue::Str(raw.to_uppercase())));
        let config = Config::builder("[S]\nname = abc :: upper\n")
            .settings(Settings::new())
            .custom_converters(custom)
            .build()
            .unwrap();
        assert_eq!(config.get_section("S").unwrap().get::<String>("name").unwrap(), "ABC");
    }

    #[test]
    fn format_data_is_applied() {
        let mut data = FormatData::new();
        data.insert("default_url".to_owned(), "https://example.org".to_owned());
        let config = Config::builder("[S]\nurl = {default_url}\n")
            .settings(Settings::new())
            .format_data(data)
            .build()
            .unwrap();
        assert_eq!(
            config.get_section("S").unwrap().get::<String>("url").unwrap(),
            "https://example.org"
        );
    }
}
