//! 설정 텍스트 모델
//!
//! ini 형식의 텍스트를 줄 단위로 나누고 섹션/옵션의 줄 범위를 색인합니다.
//! 색인된 범위를 이용해 특정 위치의 텍스트를 꺼내거나, 위/아래에 끼워 넣거나,
//! 치환/삭제한 **새** 값을 만들 수 있습니다. 원래 값은 바뀌지 않습니다.
//!
//! # 문법
//! ```text
//! ; 주석 (첫 글자가 `;` 또는 `#`)
//! [section]
//! name = value ; 인라인 주석
//! other: first line
//!     continuation line
//! bare_name
//! ```
//!
//! 스펙 방언([`Dialect::Spec`])은 값 뒤의 `:: converter` 표기와
//! 값 없는 `name :: converter` 표기를 추가로 허용합니다.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigSpecError;

/// 값이 정확히 `""`이면 빈 문자열로 취급합니다.
const EMPTY_VALUE_MARKER: &str = "\"\"";

/// 줄 문법의 방언
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// 일반 설정 텍스트
    Config,
    /// 설정 스펙 텍스트 (`:: converter` 허용)
    Spec,
}

/// 섹션/옵션 위치 (`section` 또는 `section.option`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'a> {
    /// 섹션 이름
    pub section: &'a str,
    /// 옵션 이름 (섹션 자체를 가리키면 `None`)
    pub option: Option<&'a str>,
}

impl<'a> Location<'a> {
    /// 위치 문자열을 해석합니다.
    ///
    /// 섹션 이름에는 `.`이 올 수 없으므로 첫 번째 `.`에서 나눕니다.
    pub fn parse(location: &'a str) -> Result<Self, ConfigSpecError> {
        match location.split_once('.') {
            None => Ok(Self {
                section: location,
                option: None,
            }),
            Some((_, "")) => Err(ConfigSpecError::InvalidLocation(location.to_owned())),
            Some((section, option)) => Ok(Self {
                section,
                option: Some(option),
            }),
        }
    }
}

// ─── 색인 ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OptEntry {
    /// 소문자로 정규화된 옵션 이름
    pub(crate) name: String,
    /// 첫 줄 인덱스
    pub(crate) first: usize,
    /// 마지막 줄 인덱스 (포함)
    pub(crate) last: usize,
    /// 정리된 값 (값 없는 옵션이면 `None`)
    pub(crate) value: Option<String>,
    /// `:: converter` 표기 (스펙 방언에서만)
    pub(crate) conv: Option<String>,
    /// 옵션 줄 구분자 뒤의 원본 값 조각들 (첫 줄 + 연속 줄)
    raw_parts: Vec<String>,
    /// 구분자(`:`/`=`)가 있었는지
    has_separator: bool,
    /// 값 없이 `:: converter`만 있는 줄인지
    bare_conv: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SectEntry {
    pub(crate) name: String,
    /// 헤더 줄 인덱스 (암묵적 `""` 섹션이면 0부터 시작)
    pub(crate) first: usize,
    /// 섹션 범위 끝 (미포함)
    pub(crate) end: usize,
    pub(crate) opts: Vec<OptEntry>,
}

impl SectEntry {
    fn find_opt(&self, name: &str) -> Option<&OptEntry> {
        let lowered = name.to_lowercase();
        self.opts.iter().find(|o| o.name == lowered)
    }
}

/// 색인된 설정 텍스트
///
/// 섹션 이름은 대소문자를 구분하며 중복될 수 없고, 옵션 이름은 섹션 안에서
/// 대소문자 구분 없이 유일해야 합니다. 섹션 헤더 이전의 옵션은 암묵적인
/// `""` 섹션에 속합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigString {
    lines: Vec<String>,
    sections: Vec<SectEntry>,
    dialect: Dialect,
}

impl ConfigString {
    /// 일반 설정 방언으로 텍스트를 파싱합니다.
    pub fn parse(text: &str) -> Result<Self, ConfigSpecError> {
        Self::parse_with_dialect(text, Dialect::Config)
    }

    /// 지정한 방언으로 텍스트를 파싱합니다.
    pub fn parse_with_dialect(text: &str, dialect: Dialect) -> Result<Self, ConfigSpecError> {
        let lines = split_lines(text);
        let sections = scan(&lines, dialect, true)?;
        Ok(Self {
            lines,
            sections,
            dialect,
        })
    }

    fn from_lines(lines: Vec<String>, dialect: Dialect) -> Result<Self, ConfigSpecError> {
        let sections = scan(&lines, dialect, true)?;
        Ok(Self {
            lines,
            sections,
            dialect,
        })
    }

    /// 파싱 방언을 반환합니다.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// 정규화된 줄 목록을 반환합니다.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 텍스트가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 위치가 존재하는지 확인합니다.
    pub fn contains(&self, location: &str) -> bool {
        self.span(location).is_ok()
    }

    /// 위치에 해당하는 텍스트를 새 값으로 꺼냅니다.
    pub fn get(&self, location: &str) -> Result<Self, ConfigSpecError> {
        let (first, end) = self.span(location)?;
        Self::from_lines(self.lines[first..end].to_vec(), self.dialect)
    }

    /// 위치 바로 위에 텍스트를 끼워 넣은 새 값을 만듭니다.
    pub fn insert_above(&self, location: &str, text: &str) -> Result<Self, ConfigSpecError> {
        let (first, _) = self.span(location)?;
        self.splice(first, first, text)
    }

    /// 위치 바로 아래에 텍스트를 끼워 넣은 새 값을 만듭니다.
    pub fn insert_below(&self, location: &str, text: &str) -> Result<Self, ConfigSpecError> {
        let (_, end) = self.span(location)?;
        self.splice(end, end, text)
    }

    /// 위치의 텍스트를 치환한 새 값을 만듭니다.
    pub fn substitute(&self, location: &str, text: &str) -> Result<Self, ConfigSpecError> {
        let (first, end) = self.span(location)?;
        self.splice(first, end, text)
    }

    /// 위치의 텍스트를 삭제한 새 값을 만듭니다.
    pub fn remove(&self, location: &str) -> Result<Self, ConfigSpecError> {
        let (first, end) = self.span(location)?;
        self.splice(first, end, "")
    }

    fn splice(&self, first: usize, end: usize, text: &str) -> Result<Self, ConfigSpecError> {
        let mut lines = Vec::with_capacity(self.lines.len());
        lines.extend_from_slice(&self.lines[..first]);
        lines.extend(split_lines(text));
        lines.extend_from_slice(&self.lines[end..]);
        Self::from_lines(lines, self.dialect)
    }

    /// 옵션 값을 반환합니다. 값 없는 옵션이면 `None`입니다.
    ///
    /// 인라인 주석과 앞뒤 공백은 제거되고, 연속 줄은 `\n`으로 이어집니다.
    /// 스펙 방언에서는 `:: converter` 부분이 제외됩니다.
    pub fn get_opt_value(&self, location: &str) -> Result<Option<&str>, ConfigSpecError> {
        Ok(self.opt_entry(location)?.value.as_deref())
    }

    /// 옵션의 `:: converter` 표기를 반환합니다 (스펙 방언).
    pub fn get_opt_converter_spec(&self, location: &str) -> Result<Option<&str>, ConfigSpecError> {
        Ok(self.opt_entry(location)?.conv.as_deref())
    }

    /// 섹션의 옵션 이름을 등장 순서대로 반환합니다.
    pub fn get_opt_names(&self, section: &str) -> Result<Vec<&str>, ConfigSpecError> {
        let sect = self.sect_entry(section)?;
        Ok(sect.opts.iter().map(|o| o.name.as_str()).collect())
    }

    /// 모든 섹션 이름을 등장 순서대로 반환합니다.
    ///
    /// 암묵적 `""` 섹션은 옵션이 있을 때만 포함됩니다.
    pub fn get_all_sect_names(&self) -> Vec<&str> {
        self.listed_sections().map(|s| s.name.as_str()).collect()
    }

    /// 모든 섹션 이름과 각 섹션의 옵션 이름을 등장 순서대로 반환합니다.
    pub fn get_all_sect_and_opt_names(&self) -> Vec<(&str, Vec<&str>)> {
        self.listed_sections()
            .map(|s| {
                (
                    s.name.as_str(),
                    s.opts.iter().map(|o| o.name.as_str()).collect(),
                )
            })
            .collect()
    }

    pub(crate) fn listed_sections(&self) -> impl Iterator<Item = &SectEntry> {
        self.sections
            .iter()
            .filter(|s| !s.name.is_empty() || !s.opts.is_empty())
    }

    fn sect_entry(&self, section: &str) -> Result<&SectEntry, ConfigSpecError> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .ok_or_else(|| ConfigSpecError::NoSection(section.to_owned()))
    }

    fn opt_entry(&self, location: &str) -> Result<&OptEntry, ConfigSpecError> {
        let loc = Location::parse(location)?;
        let Some(option) = loc.option else {
            return Err(ConfigSpecError::InvalidLocation(location.to_owned()));
        };
        self.sect_entry(loc.section)?
            .find_opt(option)
            .ok_or_else(|| ConfigSpecError::NoOption {
                section: loc.section.to_owned(),
                option: option.to_owned(),
            })
    }

    /// 위치의 줄 범위 `[first, end)`를 계산합니다.
    fn span(&self, location: &str) -> Result<(usize, usize), ConfigSpecError> {
        let loc = Location::parse(location)?;
        let sect = self.sect_entry(loc.section)?;
        match loc.option {
            None => Ok((sect.first, sect.end)),
            Some(option) => {
                let opt = sect
                    .find_opt(option)
                    .ok_or_else(|| ConfigSpecError::NoOption {
                        section: loc.section.to_owned(),
                        option: option.to_owned(),
                    })?;
                Ok((opt.first, opt.last + 1))
            }
        }
    }
}

impl fmt::Display for ConfigString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// 설정 파일 데이터: 섹션 → (옵션 → 원본 값)
pub type RawConfigData = BTreeMap<String, BTreeMap<String, String>>;

/// 설정 *데이터* 파일을 관대하게 파싱합니다.
///
/// 스펙과 달리 중복 섹션/옵션을 허용하며 나중 값이 이깁니다.
/// 값 없는 옵션은 빈 문자열이 됩니다.
pub fn parse_config_data(text: &str) -> Result<RawConfigData, ConfigSpecError> {
    let lines = split_lines(text);
    let sections = scan(&lines, Dialect::Config, false)?;
    let mut data = RawConfigData::new();
    for sect in sections {
        if sect.name.is_empty() && sect.opts.is_empty() {
            continue;
        }
        let target = data.entry(sect.name).or_default();
        for opt in sect.opts {
            target.insert(opt.name, opt.value.unwrap_or_default());
        }
    }
    Ok(data)
}

// ─── 줄 분류 ──────────────────────────────────────────────────────

/// 유니버설 개행(`\r\n`, `\r`, `\n`)으로 줄을 나눕니다.
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

// 들여쓴 주석 줄도 주석이며 연속 줄로 보지 않음
fn is_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with(';') || line.starts_with('#')
}

fn starts_with_whitespace(line: &str) -> bool {
    line.chars().next().is_some_and(char::is_whitespace)
}

/// `[ name ]` 헤더에서 섹션 이름을 꺼냅니다.
fn parse_section_header(line: &str) -> Option<&str> {
    let inner = line.trim_end().strip_prefix('[')?.strip_suffix(']')?;
    let name = inner.trim();
    let valid = !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == ']' || c == '.');
    valid.then_some(name)
}

fn is_name_start(c: char) -> bool {
    !(c.is_whitespace() || matches!(c, ':' | '=' | '[' | ';' | '#'))
}

fn is_name_char(c: char) -> bool {
    !(c.is_whitespace() || matches!(c, ':' | '='))
}

/// 옵션 줄 해석 결과
struct OptLine<'a> {
    name: &'a str,
    /// 구분자 뒤의 값 (구분자가 없으면 `None`)
    value: Option<&'a str>,
    /// 스펙 방언의 값 없는 `:: converter` 꼬리
    bare_conv: Option<&'a str>,
}

fn parse_opt_line(line: &str, dialect: Dialect) -> Option<OptLine<'_>> {
    let first = line.chars().next()?;
    if !is_name_start(first) {
        return None;
    }
    let name_end = line
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map_or(line.len(), |(i, _)| i);
    let name = &line[..name_end];
    let rest = line[name_end..].trim_start();

    if rest.is_empty() {
        return Some(OptLine {
            name,
            value: None,
            bare_conv: None,
        });
    }
    if dialect == Dialect::Spec && rest.starts_with("::") {
        return Some(OptLine {
            name,
            value: None,
            bare_conv: Some(rest),
        });
    }
    let value = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':'))?;
    Some(OptLine {
        name,
        value: Some(value),
        bare_conv: None,
    })
}

/// 공백 뒤에 오는 `;`부터 줄 끝까지를 인라인 주석으로 잘라냅니다.
fn strip_inline_comment(value: &str) -> &str {
    let mut prev_ws = false;
    for (i, c) in value.char_indices() {
        if c == ';' && prev_ws {
            return value[..i].trim_end();
        }
        prev_ws = c.is_whitespace();
    }
    value
}

/// 값 끝의 `:: converter` 표기를 분리합니다.
///
/// `::`는 값의 시작이거나 공백 뒤에 와야 하며, 그 뒤에는 공백 없는
/// 토큰 하나만 올 수 있습니다. 그런 `::`가 있는데 어느 것도 형식에 맞지
/// 않으면 `Err(())`를 돌려줍니다.
pub(crate) fn split_converter_spec(value: &str) -> Result<(Option<&str>, Option<&str>), ()> {
    let mut saw_marker = false;
    let mut search_from = 0;
    while let Some(found) = value[search_from..].find("::") {
        let pos = search_from + found;
        search_from = pos + 1;
        let delimited = pos == 0 || value[..pos].ends_with(char::is_whitespace);
        if !delimited {
            continue;
        }
        saw_marker = true;
        let conv = value[pos + 2..].trim_start();
        if conv.contains(char::is_whitespace) {
            continue;
        }
        if conv.is_empty() {
            return Err(());
        }
        let val = (pos > 0).then(|| value[..pos].trim_end());
        return Ok((val, Some(conv)));
    }
    if saw_marker {
        Err(())
    } else {
        Ok((Some(value), None))
    }
}

fn syntax_error(index: usize, reason: &str, line: &str) -> ConfigSpecError {
    ConfigSpecError::Syntax {
        line: index + 1,
        reason: reason.to_owned(),
        content: line.to_owned(),
    }
}

// ─── 스캐너 ──────────────────────────────────────────────────────

/// 줄 목록을 훑어 섹션/옵션 색인을 만듭니다.
///
/// `strict`가 참이면 중복 섹션/옵션이 에러이고, 거짓이면 그대로 기록합니다.
fn scan(
    lines: &[String],
    dialect: Dialect,
    strict: bool,
) -> Result<Vec<SectEntry>, ConfigSpecError> {
    let mut sections = vec![SectEntry {
        name: String::new(),
        first: 0,
        end: lines.len(),
        opts: Vec::new(),
    }];

    for (index, line) in lines.iter().enumerate() {
        if is_blank(line) || is_comment(line) {
            continue;
        }

        if starts_with_whitespace(line) {
            let current = sections.last_mut().and_then(|s| s.opts.last_mut());
            let Some(opt) = current else {
                return Err(syntax_error(
                    index,
                    "looks like a continuation line but there is no preceding option",
                    line,
                ));
            };
            if !opt.has_separator {
                return Err(syntax_error(
                    index,
                    "continuation line of an option that has no value",
                    line,
                ));
            }
            opt.raw_parts.push(line.clone());
            opt.last = index;
            continue;
        }

        if let Some(name) = parse_section_header(line) {
            if strict && sections.iter().any(|s| s.name == name) {
                return Err(ConfigSpecError::DuplicateSection {
                    name: name.to_owned(),
                    line: index + 1,
                });
            }
            if let Some(prev) = sections.last_mut() {
                prev.end = index;
            }
            sections.push(SectEntry {
                name: name.to_owned(),
                first: index,
                end: lines.len(),
                opts: Vec::new(),
            });
            continue;
        }

        let Some(opt_line) = parse_opt_line(line, dialect) else {
            return Err(syntax_error(
                index,
                "not a section header nor an option line",
                line,
            ));
        };
        let Some(sect) = sections.last_mut() else {
            continue;
        };
        let name = opt_line.name.to_lowercase();
        if strict && sect.opts.iter().any(|o| o.name == name) {
            return Err(ConfigSpecError::DuplicateOption {
                section: sect.name.clone(),
                option: name,
                line: index + 1,
            });
        }
        let (raw_parts, has_separator) = match (opt_line.value, opt_line.bare_conv) {
            (Some(value), _) => (vec![value.to_owned()], true),
            (None, Some(bare)) => (vec![bare.to_owned()], true),
            (None, None) => (Vec::new(), false),
        };
        sect.opts.push(OptEntry {
            name,
            first: index,
            last: index,
            value: None,
            conv: None,
            raw_parts,
            has_separator,
            bare_conv: opt_line.bare_conv.is_some(),
        });
    }

    for sect in &mut sections {
        let sect_name = sect.name.clone();
        for opt in &mut sect.opts {
            finish_opt(&sect_name, opt, dialect)?;
        }
    }
    Ok(sections)
}

/// 원본 값 조각에서 최종 값과 변환기 표기를 계산합니다.
fn finish_opt(
    sect_name: &str,
    opt: &mut OptEntry,
    dialect: Dialect,
) -> Result<(), ConfigSpecError> {
    if !opt.has_separator {
        return Ok(());
    }
    let joined = opt
        .raw_parts
        .iter()
        .map(|part| strip_inline_comment(part).trim())
        .collect::<Vec<_>>()
        .join("\n");

    let (value, conv) = match dialect {
        Dialect::Config => (Some(joined.as_str()), None),
        Dialect::Spec => split_converter_spec(&joined).map_err(|()| {
            ConfigSpecError::InvalidConverterSpec {
                location: format!("{sect_name}.{}", opt.name),
                spec: joined.clone(),
            }
        })?,
    };

    // `name = :: conv`은 빈 값, `name :: conv`은 값 없음
    opt.value = match value {
        Some(v) if v == EMPTY_VALUE_MARKER => Some(String::new()),
        Some(v) => Some(v.to_owned()),
        None if opt.bare_conv => None,
        None => Some(String::new()),
    };
    opt.conv = conv.map(str::to_owned);
    Ok(())
}
