//! 리터럴 전용 표현식 평가기
//!
//! `py`/`py_namespaces_dict` 변환기가 사용합니다. 숫자, 문자열(`b`/`r`/`u` 접두사와
//! 이스케이프, 인접 문자열 이어붙이기), `True`/`False`/`None`, 리스트, 튜플,
//! 딕셔너리, 집합, 단항 `+`/`-`만 허용합니다. 이름, 호출, 이항 연산자는 거부합니다.

use crate::value::ConfigValue;

/// 컨테이너와 단항 연산자의 최대 중첩 깊이
pub const MAX_NESTING_DEPTH: usize = 100;

/// 리터럴 표현식을 평가합니다.
pub fn eval_literal(source: &str) -> Result<ConfigValue, String> {
    let mut parser = Parser {
        src: source,
        pos: 0,
        depth: 0,
    };
    parser.skip_ws();
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

/// 딕셔너리 안의 모든 키가 (중첩까지) 문자열인지 검사합니다.
pub fn ensure_string_keys(value: &ConfigValue) -> Result<(), String> {
    match value {
        ConfigValue::Dict(entries) => {
            for (key, val) in entries {
                if !matches!(key, ConfigValue::Str(_)) {
                    return Err(format!("non-string key ({}) in namespaces dict", key.kind()));
                }
                ensure_string_keys(val)?;
            }
            Ok(())
        }
        ConfigValue::List(items) | ConfigValue::Tuple(items) | ConfigValue::Set(items) => {
            items.iter().try_for_each(ensure_string_keys)
        }
        _ => Ok(()),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> String {
        format!("{reason} at offset {}", self.pos)
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<ConfigValue, String> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(&format!(
                "literal nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = self.atom();
        self.depth -= 1;
        value
    }

    fn atom(&mut self) -> Result<ConfigValue, String> {
        match self.peek() {
            Some('-') | Some('+') => {
                let negative = self.bump() == Some('-');
                self.skip_ws();
                match self.expr()? {
                    ConfigValue::Int(i) if negative => i
                        .checked_neg()
                        .map(ConfigValue::Int)
                        .ok_or_else(|| self.error("integer overflow")),
                    ConfigValue::Float(f) if negative => Ok(ConfigValue::Float(-f)),
                    v @ (ConfigValue::Int(_) | ConfigValue::Float(_)) => Ok(v),
                    ConfigValue::Bool(b) => {
                        let i = i64::from(b);
                        Ok(ConfigValue::Int(if negative { -i } else { i }))
                    }
                    _ => Err(self.error("unary operator applied to a non-number")),
                }
            }
            Some('[') => {
                self.bump();
                let items = self.seq(']')?.0;
                Ok(ConfigValue::List(items))
            }
            Some('(') => {
                self.bump();
                let (items, trailing_comma) = self.seq(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap_or(ConfigValue::None))
                } else {
                    Ok(ConfigValue::Tuple(items))
                }
            }
            Some('{') => {
                self.bump();
                self.dict_or_set()
            }
            Some(c) if c == '"' || c == '\'' => self.strings(),
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// 쉼표로 구분된 원소들을 `close`까지 읽습니다.
    fn seq(&mut self, close: char) -> Result<(Vec<ConfigValue>, bool), String> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.expr()?);
            self.skip_ws();
            trailing_comma = self.eat(',');
            if !trailing_comma {
                self.skip_ws();
                if self.eat(close) {
                    return Ok((items, false));
                }
                return Err(self.error(&format!("expected ',' or '{close}'")));
            }
        }
    }

    fn dict_or_set(&mut self) -> Result<ConfigValue, String> {
        self.skip_ws();
        if self.eat('}') {
            return Ok(ConfigValue::Dict(Vec::new()));
        }
        let first = self.expr()?;
        self.skip_ws();
        if self.eat(':') {
            let mut entries: Vec<(ConfigValue, ConfigValue)> = Vec::new();
            let mut key = first;
            loop {
                self.skip_ws();
                let value = self.expr()?;
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
                self.skip_ws();
                let comma = self.eat(',');
                self.skip_ws();
                if self.eat('}') {
                    return Ok(ConfigValue::Dict(entries));
                }
                if !comma {
                    return Err(self.error("expected ',' or '}'"));
                }
                key = self.expr()?;
                self.skip_ws();
                if !self.eat(':') {
                    return Err(self.error("expected ':'"));
                }
            }
        }
        let mut items = vec![first];
        loop {
            self.skip_ws();
            let comma = self.eat(',');
            self.skip_ws();
            if self.eat('}') {
                break;
            }
            if !comma {
                return Err(self.error("expected ',' or '}'"));
            }
            let item = self.expr()?;
            if !items.contains(&item) {
                items.push(item);
            }
        }
        Ok(ConfigValue::Set(items))
    }

    fn word(&mut self) -> Result<ConfigValue, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let word = &self.src[start..self.pos];
        match word {
            "True" => Ok(ConfigValue::Bool(true)),
            "False" => Ok(ConfigValue::Bool(false)),
            "None" => Ok(ConfigValue::None),
            _ if matches!(self.peek(), Some('"' | '\'')) && is_string_prefix(word) => {
                self.pos = start;
                self.strings()
            }
            _ => {
                self.pos = start;
                Err(self.error(&format!("name {word:?} is not a literal")))
            }
        }
    }

    fn number(&mut self) -> Result<ConfigValue, String> {
        let start = self.pos;
        let rest = self.rest();
        let radix = match rest.get(..2).map(str::to_ascii_lowercase).as_deref() {
            Some("0x") => Some(16),
            Some("0o") => Some(8),
            Some("0b") => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                self.bump();
            }
            let digits = self.src[digits_start..self.pos].replace('_', "");
            return i64::from_str_radix(&digits, radix)
                .map(ConfigValue::Int)
                .map_err(|e| format!("invalid number {:?}: {e}", &self.src[start..self.pos]));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let cleaned = text.replace('_', "");
        if is_float {
            cleaned
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|e| format!("invalid number {text:?}: {e}"))
        } else {
            cleaned
                .parse::<i64>()
                .map(ConfigValue::Int)
                .map_err(|e| format!("invalid number {text:?}: {e}"))
        }
    }

    /// 문자열 리터럴 하나 이상을 읽고 이어붙입니다.
    ///
    /// 문자열과 바이트열을 섞으면 에러입니다.
    fn strings(&mut self) -> Result<ConfigValue, String> {
        let mut text: Option<String> = None;
        let mut bytes: Option<Vec<u8>> = None;
        loop {
            let (is_bytes, chunk) = self.string_literal()?;
            if is_bytes {
                if text.is_some() {
                    return Err(self.error("cannot mix bytes and nonbytes literals"));
                }
                let mut buf = Vec::with_capacity(chunk.len());
                for c in chunk.chars() {
                    let b = u8::try_from(u32::from(c))
                        .map_err(|_| self.error("bytes can only contain ASCII literal characters"))?;
                    buf.push(b);
                }
                bytes.get_or_insert_with(Vec::new).extend(buf);
            } else {
                if bytes.is_some() {
                    return Err(self.error("cannot mix bytes and nonbytes literals"));
                }
                text.get_or_insert_with(String::new).push_str(&chunk);
            }

            let save = self.pos;
            self.skip_ws();
            let more = match self.peek() {
                Some('"' | '\'') => true,
                Some(c) if c.is_alphabetic() => {
                    let prefix: String = self.rest().chars().take_while(|c| c.is_alphabetic()).collect();
                    is_string_prefix(&prefix)
                        && matches!(self.rest()[prefix.len()..].chars().next(), Some('"' | '\''))
                }
                _ => false,
            };
            if !more {
                self.pos = save;
                break;
            }
        }
        Ok(match (text, bytes) {
            (_, Some(b)) => ConfigValue::Bytes(b),
            (t, None) => ConfigValue::Str(t.unwrap_or_default()),
        })
    }

    /// 접두사 포함 문자열 리터럴 하나를 읽습니다. `(바이트열 여부, 내용)`을 돌려줍니다.
    /// 바이트열 내용은 코드 포인트 0..=255의 문자로 표현됩니다.
    fn string_literal(&mut self) -> Result<(bool, String), String> {
        let prefix: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect();
        if !is_string_prefix(&prefix) {
            return Err(self.error("invalid string prefix"));
        }
        self.pos += prefix.len();
        let lowered = prefix.to_ascii_lowercase();
        let is_bytes = lowered.contains('b');
        let is_raw = lowered.contains('r');

        let Some(quote) = self.bump() else {
            return Err(self.error("unexpected end of input"));
        };
        let triple = self.rest().starts_with(&format!("{quote}{quote}"));
        if triple {
            self.pos += 2;
        }

        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.rest().starts_with(&format!("{quote}{quote}")) {
                    self.pos += 2;
                    break;
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error("unterminated string literal"));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(esc) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if is_raw {
                out.push('\\');
                out.push(esc);
                continue;
            }
            match esc {
                '\n' => {}
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'a' => out.push('\u{07}'),
                'b' => out.push('\u{08}'),
                'f' => out.push('\u{0C}'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'v' => out.push('\u{0B}'),
                'x' => out.push(self.hex_escape(2)?),
                'u' if !is_bytes => out.push(self.hex_escape(4)?),
                'U' if !is_bytes => out.push(self.hex_escape(8)?),
                '0'..='7' => {
                    let mut code = esc.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                code = code * 8 + d;
                                self.bump();
                            }
                            None => break,
                        }
                    }
                    out.push(char::from_u32(code).ok_or_else(|| self.error("invalid octal escape"))?);
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
        Ok((is_bytes, out))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, String> {
        let digits = self.rest().get(..len).unwrap_or("");
        let code = u32::from_str_radix(digits, 16)
            .ok()
            .filter(|_| digits.len() == len)
            .ok_or_else(|| self.error("truncated hex escape"))?;
        self.pos += len;
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))
    }
}

fn is_string_prefix(prefix: &str) -> bool {
    matches!(
        prefix.to_ascii_lowercase().as_str(),
        "" | "r" | "u" | "b" | "br" | "rb"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> ConfigValue {
        ConfigValue::Str(text.to_owned())
    }

    #[test]
    fn scalars() {
        assert_eq!(eval_literal("42"), Ok(ConfigValue::Int(42)));
        assert_eq!(eval_literal("-1_000"), Ok(ConfigValue::Int(-1000)));
        assert_eq!(eval_literal("0x1F"), Ok(ConfigValue::Int(31)));
        assert_eq!(eval_literal("1.5e2"), Ok(ConfigValue::Float(150.0)));
        assert_eq!(eval_literal(" True "), Ok(ConfigValue::Bool(true)));
        assert_eq!(eval_literal("None"), Ok(ConfigValue::None));
    }

    #[test]
    fn strings_and_bytes() {
        assert_eq!(eval_literal(r#"'a\tb'"#), Ok(s("a\tb")));
        assert_eq!(eval_literal(r#"r'a\tb'"#), Ok(s("a\\tb")));
        assert_eq!(eval_literal(r#""ab" 'cd'"#), Ok(s("abcd")));
        assert_eq!(eval_literal(r#"'é'"#), Ok(s("é")));
        assert_eq!(eval_literal("'''multi\nline'''"), Ok(s("multi\nline")));
        assert_eq!(
            eval_literal(r#"b'\x00\xff'"#),
            Ok(ConfigValue::Bytes(vec![0, 255]))
        );
        assert!(eval_literal(r#"b'a' 'b'"#).is_err());
    }

    #[test]
    fn containers() {
        assert_eq!(
            eval_literal("[1, 'a',]"),
            Ok(ConfigValue::List(vec![ConfigValue::Int(1), s("a")]))
        );
        assert_eq!(eval_literal("(1)"), Ok(ConfigValue::Int(1)));
        assert_eq!(
            eval_literal("(1,)"),
            Ok(ConfigValue::Tuple(vec![ConfigValue::Int(1)]))
        );
        assert_eq!(eval_literal("()"), Ok(ConfigValue::Tuple(vec![])));
        assert_eq!(
            eval_literal("{'a': 1, 'a': 2}"),
            Ok(ConfigValue::Dict(vec![(s("a"), ConfigValue::Int(2))]))
        );
        assert_eq!(
            eval_literal("{1, 2, 1}"),
            Ok(ConfigValue::Set(vec![ConfigValue::Int(1), ConfigValue::Int(2)]))
        );
        assert_eq!(eval_literal("{}"), Ok(ConfigValue::Dict(vec![])));
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let deep = "[".repeat(10_000);
        let err = eval_literal(&deep).unwrap_err();
        assert!(err.contains("nested deeper than"), "{err}");
        assert!(eval_literal(&"-".repeat(10_000)).is_err());

        let ok = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(eval_literal(&ok), Ok(ConfigValue::Int(1)));
    }

    #[test]
    fn rejects_non_literals() {
        for src in ["os.system('x')", "1 + 2", "foo", "[1, 2", "__import__('os')", "'a' * 3"] {
            assert!(eval_literal(src).is_err(), "{src:?} should be rejected");
        }
    }

    #[test]
    fn namespace_dict_keys() {
        let ok = eval_literal("{'a': {'b': [{'c': 1}]}}").unwrap();
        assert!(ensure_string_keys(&ok).is_ok());
        let bad = eval_literal("{'a': {1: 'x'}}").unwrap();
        assert!(ensure_string_keys(&bad).is_err());
    }
}
