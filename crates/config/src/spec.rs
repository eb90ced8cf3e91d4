//! 설정 스펙 모델
//!
//! 스펙 방언으로 파싱한 [`ConfigString`]을 섹션별 [`SectSpec`] 목록으로 해석합니다.
//!
//! ```text
//! [collector]
//! url :: str                  ; 기본값 없음 = 필수
//! timeout = 30 :: int
//! tags = a, b :: list_of_str
//! ... :: int                  ; 선언되지 않은 옵션 허용, int로 변환
//! ```

use std::fmt::Write as _;

use crate::egg::{FormatArgs, SpecSource, as_config_spec_string};
use crate::error::{ConfigError, ConfigSpecError};
use crate::text::{ConfigString, Dialect, Location};

/// 자유 옵션 표식
pub const FREE_OPTS_MARKER: &str = "...";

/// 변환기 표기가 없을 때의 기본 변환기
pub const DEFAULT_CONVERTER_SPEC: &str = "str";

/// 결합 엔진이 내부에서만 쓰는 예약 문자
pub(crate) const RESERVED_CHARS: [char; 2] = ['\u{0E}', '\u{0F}'];

/// 옵션 스펙
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptSpec {
    /// 옵션 이름 (소문자)
    pub name: String,
    /// 기본값 (`None`이면 필수 옵션)
    pub default: Option<String>,
    /// 변환기 이름
    pub converter_spec: String,
}

impl OptSpec {
    /// 기본값이 없는 필수 옵션인지 확인합니다.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// 섹션 스펙
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectSpec {
    /// 섹션 이름
    pub name: String,
    /// 선언 순서대로의 옵션 스펙
    pub opt_specs: Vec<OptSpec>,
    /// 선언되지 않은 옵션 허용 여부 (`...`)
    pub free_opts_allowed: bool,
    /// 자유 옵션에 적용할 변환기 (허용되지 않으면 항상 `"str"`)
    pub free_opts_converter_spec: String,
}

impl SectSpec {
    /// 빈 섹션 스펙을 만듭니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opt_specs: Vec::new(),
            free_opts_allowed: false,
            free_opts_converter_spec: DEFAULT_CONVERTER_SPEC.to_owned(),
        }
    }

    /// 필수 옵션이 하나라도 있으면 섹션 자체가 필수입니다.
    pub fn required(&self) -> bool {
        self.opt_specs.iter().any(OptSpec::is_required)
    }

    /// 이름으로 옵션 스펙을 찾습니다 (대소문자 무시).
    pub fn get_opt_spec(&self, name: &str) -> Option<&OptSpec> {
        let lowered = name.to_lowercase();
        self.opt_specs.iter().find(|o| o.name == lowered)
    }
}

/// 파싱된 설정 스펙 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpec {
    raw: ConfigString,
    sect_specs: Vec<SectSpec>,
}

impl ConfigSpec {
    /// 스펙 텍스트를 파싱합니다.
    ///
    /// 결합 엔진 예약 문자가 들어 있으면 거부합니다.
    pub fn parse(text: &str) -> Result<Self, ConfigSpecError> {
        if let Some(ch) = text.chars().find(|c| RESERVED_CHARS.contains(c)) {
            return Err(ConfigSpecError::ReservedCharacter { ch });
        }
        Self::parse_internal(text)
    }

    /// 스펙 소스(문자열 또는 egg)를 렌더링한 뒤 파싱합니다.
    pub fn from_source(source: &SpecSource, format_args: FormatArgs<'_>) -> Result<Self, ConfigError> {
        let text = as_config_spec_string(source, format_args)?;
        Ok(Self::parse(&text)?)
    }

    /// 예약 문자 검사 없이 파싱합니다 (결합 엔진 내부용).
    pub(crate) fn parse_internal(text: &str) -> Result<Self, ConfigSpecError> {
        let raw = ConfigString::parse_with_dialect(text, Dialect::Spec)?;
        let mut sect_specs = Vec::new();
        for sect in raw.listed_sections() {
            let mut spec = SectSpec::new(sect.name.clone());
            for opt in &sect.opts {
                let converter_spec = opt
                    .conv
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONVERTER_SPEC.to_owned());
                if opt.name == FREE_OPTS_MARKER {
                    if opt.value.is_some() {
                        return Err(ConfigSpecError::Syntax {
                            line: opt.first + 1,
                            reason: "the free options marker cannot have a value".to_owned(),
                            content: raw.lines()[opt.first].clone(),
                        });
                    }
                    spec.free_opts_allowed = true;
                    spec.free_opts_converter_spec = converter_spec;
                } else {
                    spec.opt_specs.push(OptSpec {
                        name: opt.name.clone(),
                        default: opt.value.clone(),
                        converter_spec,
                    });
                }
            }
            sect_specs.push(spec);
        }
        Ok(Self { raw, sect_specs })
    }

    /// 섹션 스펙 목록에서 문서를 만듭니다 (렌더링 후 다시 파싱).
    pub fn from_sect_specs(sect_specs: &[SectSpec]) -> Result<Self, ConfigSpecError> {
        Self::parse_internal(&render_sect_specs(sect_specs))
    }

    /// 원본 텍스트 모델을 반환합니다.
    pub fn raw(&self) -> &ConfigString {
        &self.raw
    }

    /// `section.option` 위치의 옵션 스펙을 반환합니다.
    pub fn get_opt_spec(&self, location: &str) -> Result<&OptSpec, ConfigSpecError> {
        let loc = Location::parse(location)?;
        let Some(option) = loc.option else {
            return Err(ConfigSpecError::InvalidLocation(location.to_owned()));
        };
        self.get_sect_spec(loc.section)?
            .get_opt_spec(option)
            .ok_or_else(|| ConfigSpecError::NoOption {
                section: loc.section.to_owned(),
                option: option.to_owned(),
            })
    }

    /// 섹션 스펙을 반환합니다.
    pub fn get_sect_spec(&self, section: &str) -> Result<&SectSpec, ConfigSpecError> {
        self.sect_specs
            .iter()
            .find(|s| s.name == section)
            .ok_or_else(|| ConfigSpecError::NoSection(section.to_owned()))
    }

    /// 모든 섹션 스펙을 등장 순서대로 반환합니다.
    pub fn get_all_sect_specs(&self) -> &[SectSpec] {
        &self.sect_specs
    }

    /// 스펙 텍스트로 다시 렌더링합니다.
    pub fn render(&self) -> String {
        render_sect_specs(&self.sect_specs)
    }
}

// ─── 렌더링 ──────────────────────────────────────────────────────

/// 섹션 스펙 목록을 스펙 텍스트로 렌더링합니다.
///
/// 암묵적 `""` 섹션은 헤더 없이 맨 앞에 놓입니다. 여러 줄 기본값은
/// 두 칸 들여쓴 연속 줄로, 빈 기본값은 `""`로 씁니다.
pub fn render_sect_specs(sect_specs: &[SectSpec]) -> String {
    let mut out = String::new();
    let (implicit, named): (Vec<&SectSpec>, Vec<&SectSpec>) =
        sect_specs.iter().partition(|s| s.name.is_empty());

    for sect in implicit {
        render_sect_body(&mut out, sect);
        out.push('\n');
    }
    for (i, sect) in named.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", sect.name);
        render_sect_body(&mut out, sect);
    }
    out
}

fn render_sect_body(out: &mut String, sect: &SectSpec) {
    for opt in &sect.opt_specs {
        match &opt.default {
            None => {
                let _ = writeln!(out, "{} :: {}", opt.name, opt.converter_spec);
            }
            Some(default) if default.is_empty() => {
                let _ = writeln!(out, "{} = \"\" :: {}", opt.name, opt.converter_spec);
            }
            Some(default) => {
                let value = default.replace('\n', "\n  ");
                let _ = writeln!(out, "{} = {} :: {}", opt.name, value, opt.converter_spec);
            }
        }
    }
    if sect.free_opts_allowed {
        let _ = writeln!(
            out,
            "{FREE_OPTS_MARKER} :: {}",
            sect.free_opts_converter_spec
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "\
[S]
x = 1 :: int
y :: bool
z = hello

[free]
a = \"\"
... :: int
";

    #[test]
    fn parses_opt_and_sect_specs() {
        let spec = ConfigSpec::parse(SPEC).unwrap();
        let x = spec.get_opt_spec("S.x").unwrap();
        assert_eq!(x.default.as_deref(), Some("1"));
        assert_eq!(x.converter_spec, "int");
        let y = spec.get_opt_spec("S.y").unwrap();
        assert!(y.is_required());
        assert_eq!(y.converter_spec, "bool");
        assert_eq!(spec.get_opt_spec("S.z").unwrap().converter_spec, "str");

        let s = spec.get_sect_spec("S").unwrap();
        assert!(s.required());
        assert!(!s.free_opts_allowed);
        assert_eq!(s.free_opts_converter_spec, "str");

        let free = spec.get_sect_spec("free").unwrap();
        assert!(!free.required());
        assert!(free.free_opts_allowed);
        assert_eq!(free.free_opts_converter_spec, "int");
        assert_eq!(free.opt_specs.len(), 1);
        assert_eq!(free.opt_specs[0].default.as_deref(), Some(""));
    }

    #[test]
    fn section_order_is_source_order() {
        let spec = ConfigSpec::parse("[b]\n[a]\n[c]\n").unwrap();
        let names: Vec<_> = spec
            .get_all_sect_specs()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn free_marker_with_value_is_error() {
        assert!(ConfigSpec::parse("[S]\n... = 3\n").is_err());
    }

    #[test]
    fn reserved_characters_rejected() {
        let err = ConfigSpec::parse("[S]\nx = \u{0E}k\u{0F}\n").unwrap_err();
        assert_eq!(err, ConfigSpecError::ReservedCharacter { ch: '\u{0E}' });
    }

    #[test]
    fn render_round_trip() {
        let spec = ConfigSpec::parse(SPEC).unwrap();
        let rendered = spec.render();
        let reparsed = ConfigSpec::parse(&rendered).unwrap();
        assert_eq!(reparsed.get_all_sect_specs(), spec.get_all_sect_specs());
    }

    #[test]
    fn render_multiline_and_implicit_section() {
        let sect_specs = vec![
            SectSpec {
                name: "s".to_owned(),
                opt_specs: vec![OptSpec {
                    name: "lines".to_owned(),
                    default: Some("a\nb".to_owned()),
                    converter_spec: "list_of_str".to_owned(),
                }],
                free_opts_allowed: false,
                free_opts_converter_spec: "str".to_owned(),
            },
            SectSpec {
                name: String::new(),
                opt_specs: vec![OptSpec {
                    name: "top".to_owned(),
                    default: None,
                    converter_spec: "str".to_owned(),
                }],
                free_opts_allowed: false,
                free_opts_converter_spec: "str".to_owned(),
            },
        ];
        let text = render_sect_specs(&sect_specs);
        assert_eq!(text, "top :: str\n\n[s]\nlines = a\n  b :: list_of_str\n");
        let spec = ConfigSpec::parse(&text).unwrap();
        assert_eq!(
            spec.get_opt_spec("s.lines").unwrap().default.as_deref(),
            Some("a\nb")
        );
        assert!(spec.get_opt_spec(".top").unwrap().is_required());
    }
}
