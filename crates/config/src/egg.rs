//! 스펙 결합 엔진
//!
//! 스펙은 그대로의 문자열([`SpecSource::Raw`])이거나 포맷 데이터가 주어질 때까지
//! 렌더링을 미루는 egg([`SpecSource::Egg`])입니다. [`combine`]은 상위(조상) 스펙과
//! 하위 스펙을 합치는 [`CombinedSpecEgg`]를 만듭니다.
//!
//! # 결합 규칙
//! - 양쪽에 있는 섹션은 옵션 목록을 합칩니다. 하위 쪽 기본값이 이기며,
//!   변환기 표기는 양쪽이 같아야 합니다.
//! - 자유 옵션 허용은 OR이며, 양쪽 모두 허용하면 변환기가 같아야 합니다.
//! - 한쪽에만 있는 섹션/옵션은 그대로 통과합니다.
//!
//! 중간 단계에서 빠진 템플릿 키는 자리표시자로 남겨 두고, 최상위 렌더링에서만
//! 남은 자리표시자를 에러로 보고합니다. 가려진 조상 조각에만 필요한 키는
//! 하위 타입이 몰라도 됩니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigSpecEggError;
use crate::spec::{ConfigSpec, RESERVED_CHARS, SectSpec, render_sect_specs};

/// 템플릿 포맷 데이터
pub type FormatData = BTreeMap<String, String>;

const PLACEHOLDER_START: char = RESERVED_CHARS[0];
const PLACEHOLDER_END: char = RESERVED_CHARS[1];

/// 렌더링 시 포맷 데이터 전달 방식
#[derive(Debug, Clone, Copy, Default)]
pub enum FormatArgs<'a> {
    /// 템플릿 치환 없음
    #[default]
    None,
    /// 최상위 호출: 치환 후 남은 키가 있으면 에러
    Plain(&'a FormatData),
    /// 중간 단계: 빠진 키는 자리표시자로 남김
    Tracking(&'a FormatData),
}

impl<'a> FormatArgs<'a> {
    /// 최상위 호출인지 확인합니다.
    pub fn is_top_level(&self) -> bool {
        !matches!(self, Self::Tracking(_))
    }

    fn tracking(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Plain(data) | Self::Tracking(data) => Self::Tracking(data),
        }
    }
}

impl<'a> From<Option<&'a FormatData>> for FormatArgs<'a> {
    fn from(data: Option<&'a FormatData>) -> Self {
        data.map_or(Self::None, Self::Plain)
    }
}

/// 지연 렌더링되는 스펙
pub trait SpecEgg: fmt::Debug + Send + Sync {
    /// 포맷 데이터로 스펙 텍스트를 렌더링합니다.
    ///
    /// 같은 입력에 대해 항상 같은 결과를 내야 하며 부수 효과가 없어야 합니다.
    fn hatch_out(&self, format_args: FormatArgs<'_>) -> Result<String, ConfigSpecEggError>;
}

/// 스펙 소스
#[derive(Debug, Clone)]
pub enum SpecSource {
    /// 스펙 문자열 (템플릿일 수 있음)
    Raw(String),
    /// 지연 렌더링 스펙
    Egg(Arc<dyn SpecEgg>),
}

impl From<&str> for SpecSource {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_owned())
    }
}

impl From<String> for SpecSource {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<CombinedSpecEgg> for SpecSource {
    fn from(egg: CombinedSpecEgg) -> Self {
        Self::Egg(Arc::new(egg))
    }
}

/// 스펙 소스를 최종 스펙 문자열로 만듭니다.
///
/// egg면 `hatch_out`을 호출하고, 문자열이면 포맷 데이터가 있을 때만 템플릿
/// 치환을 합니다. 마지막으로 들여쓰기를 줄입니다.
pub fn as_config_spec_string(
    spec: &SpecSource,
    format_args: FormatArgs<'_>,
) -> Result<String, ConfigSpecEggError> {
    let text = match spec {
        SpecSource::Egg(egg) => egg.hatch_out(format_args)?,
        SpecSource::Raw(text) => match format_args {
            FormatArgs::None => text.clone(),
            FormatArgs::Plain(data) => format_template(text, data, false)?,
            FormatArgs::Tracking(data) => format_template(text, data, true)?,
        },
    };
    Ok(reduce_indent(&text))
}

// ─── 템플릿 ──────────────────────────────────────────────────────

/// `{name}` 필드를 포맷 데이터로 치환합니다. `{{`/`}}`는 중괄호 하나가 됩니다.
///
/// `track_missing`이면 없는 키를 자리표시자로 남기고, 아니면 에러로 보고합니다.
fn format_template(
    template: &str,
    data: &FormatData,
    track_missing: bool,
) -> Result<String, ConfigSpecEggError> {
    let mut out = String::with_capacity(template.len());
    let mut missing = BTreeSet::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(ConfigSpecEggError::Template(
                    "single '}' encountered in format string".to_owned(),
                ));
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(ConfigSpecEggError::Template(
                        "single '{' encountered in format string".to_owned(),
                    ));
                }
                validate_field_name(&key)?;
                match data.get(&key) {
                    Some(value) => out.push_str(value),
                    None if track_missing => {
                        out.push(PLACEHOLDER_START);
                        out.push_str(&key);
                        out.push(PLACEHOLDER_END);
                    }
                    None => {
                        missing.insert(key);
                    }
                }
            }
            other => out.push(other),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigSpecEggError::MissingFormatKeys {
            tag: String::new(),
            keys: missing.into_iter().collect(),
        });
    }
    Ok(out)
}

fn validate_field_name(key: &str) -> Result<(), ConfigSpecEggError> {
    if key.is_empty() {
        return Err(ConfigSpecEggError::Template(
            "positional format fields are not supported".to_owned(),
        ));
    }
    if key.contains(['{', ':', '!']) || RESERVED_CHARS.iter().any(|c| key.contains(*c)) {
        return Err(ConfigSpecEggError::Template(format!(
            "unsupported format field {{{key}}}"
        )));
    }
    Ok(())
}

/// 렌더링된 텍스트에 남은 자리표시자의 키 이름을 모읍니다.
fn find_placeholders(text: &str) -> Vec<String> {
    let mut keys = BTreeSet::new();
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_START) {
        let after = &rest[start + PLACEHOLDER_START.len_utf8()..];
        let Some(end) = after.find(PLACEHOLDER_END) else {
            break;
        };
        keys.insert(after[..end].to_owned());
        rest = &after[end + PLACEHOLDER_END.len_utf8()..];
    }
    keys.into_iter().collect()
}

// ─── 들여쓰기 ─────────────────────────────────────────────────────

/// 들여쓰기를 줄입니다.
///
/// 첫 줄의 들여쓰기는 지우고, 나머지 비어 있지 않은 줄들의 공통 들여쓰기를
/// 제거합니다. 공백뿐인 줄은 빈 줄이 됩니다. 상대적인 들여쓰기는 유지됩니다.
pub fn reduce_indent(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let common = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_whitespace(l))
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if line.trim().is_empty() {
                ""
            } else if i == 0 {
                line.trim_start()
            } else {
                line.char_indices().nth(common).map_or("", |(at, _)| &line[at..])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

// ─── 결합 ─────────────────────────────────────────────────────────

/// 상위 스펙과 하위 스펙을 결합하는 egg
#[derive(Debug, Clone)]
pub struct CombinedSpecEgg {
    background: Option<SpecSource>,
    foreground: SpecSource,
    tag: String,
}

impl CombinedSpecEgg {
    /// 새 결합 egg를 만듭니다.
    ///
    /// `tag`는 진단용 이름입니다 (예: `my_collectors.Feed.config_spec`).
    pub fn new(
        background: Option<SpecSource>,
        foreground: impl Into<SpecSource>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            background,
            foreground: foreground.into(),
            tag: tag.into(),
        }
    }

    /// 진단용 태그를 반환합니다.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn render_part(
        &self,
        part: &SpecSource,
        format_args: FormatArgs<'_>,
    ) -> Result<Vec<SectSpec>, ConfigSpecEggError> {
        if let SpecSource::Raw(text) = part {
            if let Some(ch) = text.chars().find(|c| RESERVED_CHARS.contains(c)) {
                return Err(self.wrap(format!(
                    "config spec contains a reserved control character ({ch:?})"
                )));
            }
        }
        let text = as_config_spec_string(part, format_args)?;
        let spec = ConfigSpec::parse_internal(&text).map_err(|e| self.wrap(e.to_string()))?;
        Ok(spec.get_all_sect_specs().to_vec())
    }

    fn wrap(&self, reason: String) -> ConfigSpecEggError {
        ConfigSpecEggError::Wrapped {
            tag: self.tag.clone(),
            reason,
        }
    }

    fn merge(
        &self,
        background: Vec<SectSpec>,
        foreground: Vec<SectSpec>,
    ) -> Result<Vec<SectSpec>, ConfigSpecEggError> {
        let mut fg_rest: Vec<Option<SectSpec>> = foreground.into_iter().map(Some).collect();
        let mut merged = Vec::with_capacity(background.len() + fg_rest.len());

        for bg_sect in background {
            let fg_sect = fg_rest
                .iter_mut()
                .find(|s| s.as_ref().is_some_and(|s| s.name == bg_sect.name))
                .and_then(Option::take);
            match fg_sect {
                Some(fg_sect) => merged.push(self.merge_sect(bg_sect, fg_sect)?),
                None => merged.push(bg_sect),
            }
        }
        merged.extend(fg_rest.into_iter().flatten());
        Ok(merged)
    }

    fn merge_sect(&self, bg: SectSpec, fg: SectSpec) -> Result<SectSpec, ConfigSpecEggError> {
        let mut fg_opts: Vec<Option<_>> = fg.opt_specs.into_iter().map(Some).collect();
        let mut opt_specs = Vec::with_capacity(bg.opt_specs.len() + fg_opts.len());

        for mut bg_opt in bg.opt_specs {
            let fg_opt = fg_opts
                .iter_mut()
                .find(|o| o.as_ref().is_some_and(|o| o.name == bg_opt.name))
                .and_then(Option::take);
            if let Some(fg_opt) = fg_opt {
                if fg_opt.converter_spec != bg_opt.converter_spec {
                    return Err(ConfigSpecEggError::ConverterSpecMismatch {
                        tag: self.tag.clone(),
                        location: format!("{}.{}", bg.name, bg_opt.name),
                        background: bg_opt.converter_spec,
                        foreground: fg_opt.converter_spec,
                    });
                }
                bg_opt.default = fg_opt.default;
            }
            opt_specs.push(bg_opt);
        }
        opt_specs.extend(fg_opts.into_iter().flatten());

        if bg.free_opts_allowed
            && fg.free_opts_allowed
            && bg.free_opts_converter_spec != fg.free_opts_converter_spec
        {
            return Err(ConfigSpecEggError::FreeOptsConverterSpecMismatch {
                tag: self.tag.clone(),
                section: bg.name,
                background: bg.free_opts_converter_spec,
                foreground: fg.free_opts_converter_spec,
            });
        }
        let free_opts_converter_spec = if fg.free_opts_allowed {
            fg.free_opts_converter_spec
        } else {
            bg.free_opts_converter_spec
        };

        Ok(SectSpec {
            name: bg.name,
            opt_specs,
            free_opts_allowed: bg.free_opts_allowed || fg.free_opts_allowed,
            free_opts_converter_spec,
        })
    }
}

impl SpecEgg for CombinedSpecEgg {
    fn hatch_out(&self, format_args: FormatArgs<'_>) -> Result<String, ConfigSpecEggError> {
        let nested_args = format_args.tracking();

        let foreground = self.render_part(&self.foreground, nested_args)?;
        let merged = match &self.background {
            Some(background) => {
                let background = self.render_part(background, nested_args)?;
                self.merge(background, foreground)?
            }
            None => foreground,
        };
        let text = render_sect_specs(&merged);

        if format_args.is_top_level() {
            let keys = find_placeholders(&text);
            if !keys.is_empty() {
                return Err(ConfigSpecEggError::MissingFormatKeys {
                    tag: self.tag.clone(),
                    keys,
                });
            }
        }
        Ok(text)
    }
}

/// 상위 스펙과 하위 스펙을 결합한 스펙 소스를 만듭니다.
///
/// 하위 타입의 `config_spec()`에서 부모 타입의 스펙을 `background`로 넘겨
/// 상속 계층을 명시적으로 표현합니다. 상위 스펙이 없으면 `None`입니다.
pub fn combine(
    background: Option<SpecSource>,
    foreground: impl Into<SpecSource>,
    tag: impl Into<String>,
) -> SpecSource {
    CombinedSpecEgg::new(background, foreground, tag).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> FormatData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn sects(source: &SpecSource, args: FormatArgs<'_>) -> Vec<SectSpec> {
        let text = as_config_spec_string(source, args).unwrap();
        ConfigSpec::parse(&text).unwrap().get_all_sect_specs().to_vec()
    }

    #[test]
    fn template_substitution() {
        let d = data(&[("name", "feed"), ("n", "5")]);
        let out = format_template("[{name}]\nx = {n} :: int\ny = {{literal}}", &d, false).unwrap();
        assert_eq!(out, "[feed]\nx = 5 :: int\ny = {literal}");
    }

    #[test]
    fn template_errors() {
        let d = FormatData::new();
        assert!(matches!(
            format_template("a } b", &d, false),
            Err(ConfigSpecEggError::Template(_))
        ));
        assert!(matches!(
            format_template("a { b", &d, false),
            Err(ConfigSpecEggError::Template(_))
        ));
        assert!(matches!(
            format_template("{x:>5}", &d, false),
            Err(ConfigSpecEggError::Template(_))
        ));
        let err = format_template("{b} {a} {b}", &d, false).unwrap_err();
        assert_eq!(
            err,
            ConfigSpecEggError::MissingFormatKeys {
                tag: String::new(),
                keys: vec!["a".to_owned(), "b".to_owned()],
            }
        );
    }

    #[test]
    fn tracking_leaves_placeholders() {
        let out = format_template("x = {a}", &FormatData::new(), true).unwrap();
        assert_eq!(out, "x = \u{0E}a\u{0F}");
        assert_eq!(find_placeholders(&out), vec!["a".to_owned()]);
    }

    #[test]
    fn raw_string_without_format_data_is_literal() {
        let source = SpecSource::from("[S]\nx = {kept}\n");
        let text = as_config_spec_string(&source, FormatArgs::None).unwrap();
        assert_eq!(text, "[S]\nx = {kept}\n");
    }

    #[test]
    fn indentation_reduction() {
        let text = "    [S]\n        x = 1\n          cont\n   \n        y = 2\n";
        assert_eq!(reduce_indent(text), "[S]\nx = 1\n  cont\n\ny = 2\n");
    }

    #[test]
    fn foreground_default_wins_and_order_is_kept() {
        let bg = SpecSource::from("[S]\na = 1 :: int\nb = x\n[T]\nt :: str\n");
        let fg = SpecSource::from("[S]\nb = y\nc = 3\n[U]\nu = 0\n");
        let combined = combine(Some(bg), fg, "m.Child.config_spec");
        let result = sects(&combined, FormatArgs::None);

        let names: Vec<_> = result.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["S", "T", "U"]);
        let s = &result[0];
        let opts: Vec<_> = s
            .opt_specs
            .iter()
            .map(|o| (o.name.as_str(), o.default.as_deref()))
            .collect();
        assert_eq!(opts, vec![("a", Some("1")), ("b", Some("y")), ("c", Some("3"))]);
    }

    #[test]
    fn foreground_can_make_option_required() {
        let bg = SpecSource::from("[S]\na = 1 :: int\n");
        let fg = SpecSource::from("[S]\na :: int\n");
        let result = sects(&combine(Some(bg), fg, "t"), FormatArgs::None);
        assert!(result[0].required());
    }

    #[test]
    fn converter_mismatch_is_error() {
        let bg = SpecSource::from("[S]\na = 1 :: int\n");
        let fg = SpecSource::from("[S]\na = 1\n");
        let err = as_config_spec_string(&combine(Some(bg), fg, "m.B.config_spec"), FormatArgs::None)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigSpecEggError::ConverterSpecMismatch { ref location, .. } if location == "S.a"
        ));
    }

    #[test]
    fn implicit_and_explicit_str_agree() {
        let bg = SpecSource::from("[S]\na = 1\n");
        let fg = SpecSource::from("[S]\na = 2 :: str\n");
        assert!(as_config_spec_string(&combine(Some(bg), fg, "t"), FormatArgs::None).is_ok());
    }

    #[test]
    fn free_opts_merge() {
        let bg = SpecSource::from("[S]\n... :: int\n");
        let fg = SpecSource::from("[S]\nx = 1\n");
        let result = sects(&combine(Some(bg.clone()), fg, "t"), FormatArgs::None);
        assert!(result[0].free_opts_allowed);
        assert_eq!(result[0].free_opts_converter_spec, "int");

        let fg = SpecSource::from("[S]\n... :: bool\n");
        let err = as_config_spec_string(&combine(Some(bg), fg, "t"), FormatArgs::None).unwrap_err();
        assert!(matches!(
            err,
            ConfigSpecEggError::FreeOptsConverterSpecMismatch { .. }
        ));
    }

    #[test]
    fn shadowed_missing_key_is_not_an_error() {
        let bg = SpecSource::from("[S]\nurl = {base_url}\n");
        let fg = SpecSource::from("[S]\nurl = http://example.com\n");
        let combined = combine(Some(bg), fg, "m.B.config_spec");
        let d = FormatData::new();
        let result = sects(&combined, FormatArgs::Plain(&d));
        assert_eq!(
            result[0].opt_specs[0].default.as_deref(),
            Some("http://example.com")
        );
    }

    #[test]
    fn unresolved_key_reported_at_top_level_only() {
        let bg = SpecSource::from("[S]\nurl = {base_url}\nname = {name}\n");
        let mid = combine(Some(bg), "[S]\nextra = 1\n", "m.Mid.config_spec");
        let top = combine(Some(mid), "[S]\nname = fixed\n", "m.Top.config_spec");
        let d = FormatData::new();
        let err = as_config_spec_string(&top, FormatArgs::Plain(&d)).unwrap_err();
        assert_eq!(
            err,
            ConfigSpecEggError::MissingFormatKeys {
                tag: "m.Top.config_spec".to_owned(),
                keys: vec!["base_url".to_owned()],
            }
        );
        let d = data(&[("base_url", "https://x")]);
        let result = sects(&top, FormatArgs::Plain(&d));
        assert_eq!(result[0].opt_specs[0].default.as_deref(), Some("https://x"));
    }

    #[test]
    fn nested_parse_errors_are_wrapped() {
        let combined = combine(None, "[S]\n[S]\n", "m.Bad.config_spec");
        let err = as_config_spec_string(&combined, FormatArgs::None).unwrap_err();
        assert!(matches!(err, ConfigSpecEggError::Wrapped { ref tag, .. } if tag == "m.Bad.config_spec"));
    }

    #[test]
    fn hatching_is_repeatable() {
        let combined = combine(Some("[S]\na = {v}\n".into()), "[S]\nb = 1\n", "t");
        let one = data(&[("v", "1")]);
        let two = data(&[("v", "2")]);
        let first = as_config_spec_string(&combined, FormatArgs::Plain(&one)).unwrap();
        let second = as_config_spec_string(&combined, FormatArgs::Plain(&two)).unwrap();
        let again = as_config_spec_string(&combined, FormatArgs::Plain(&one)).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, again);
    }
}
