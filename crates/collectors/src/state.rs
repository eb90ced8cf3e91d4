//! 수집기 상태 저장소
//!
//! 상태 값은 수집기 타입마다 하나씩인 상태 파일에 pickle 스트림으로 저장합니다.
//! 파일 이름은 타입 경로에서 나옵니다 (`my_feeds::Feodo` → `my_feeds.Feodo.pickle`).
//!
//! # 읽기 규칙
//!
//! 1. 파일이 없으면 경고를 남기고 기본 상태를 돌려줍니다 (파일은 만들지 않음).
//! 2. 현재 형식으로 디코딩합니다.
//! 3. 실패했고 프로토콜 표시가 2 이하이면 레거시 경로로 다시 디코딩합니다.
//!    레거시 스트림의 바이트 문자열은 [`LegacyTextEncoding`]에 따라 텍스트로 바꿉니다.
//! 4. 그 외의 실패(빈 파일, 손상, 지원하지 않는 프로토콜)는 복구하지 않습니다.
//!
//! 쓰기는 같은 디렉터리의 임시 파일에 쓴 뒤 rename 하므로, 실패해도 기존 파일은
//! 그대로 남습니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_pickle::{DeOptions, HashableValue, SerOptions, Value};

use n6_config::{ConfigSection, SpecSource, combine};
use n6_core::metrics as m;

use crate::error::{CollectorError, StateError};

/// 상태 파일 확장자
pub const STATE_FILE_SUFFIX: &str = ".pickle";

/// 상태 디렉터리 기본값
pub const DEFAULT_STATE_DIR: &str = "~/.n6state";

/// 상태를 가진 수집기의 설정 스펙
pub fn stateful_config_spec() -> SpecSource {
    combine(
        None,
        "
        [{section}]
        state_dir = ~/.n6state :: path
        ",
        "n6_collectors.state.StatefulCollector.config_spec",
    )
}

/// 설정 섹션에서 상태 디렉터리를 읽습니다.
pub fn state_dir_from_section(section: &ConfigSection) -> Result<PathBuf, CollectorError> {
    Ok(section.get::<PathBuf>("state_dir")?)
}

// ─── 파일 이름 ──────────────────────────────────────────────────────

/// 타입 경로에서 상태 파일 이름을 만듭니다.
///
/// # Errors
///
/// 바이너리 진입점 모듈(`main`)의 타입이거나 제네릭 인자/클로저가 섞인
/// 경로처럼 이름이 안정적이지 않으면 `InvalidFileName`을 돌려줍니다.
pub fn state_file_name_for(type_path: &str) -> Result<String, StateError> {
    if type_path.is_empty()
        || type_path.contains(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
    {
        return Err(StateError::InvalidFileName(format!(
            "{type_path:?} is not a plain type path"
        )));
    }
    let first = type_path.split("::").next().unwrap_or_default();
    if first == "main" || first == "__main__" {
        return Err(StateError::InvalidFileName(format!(
            "{type_path:?} is defined in the program entry point module; \
             move the collector type into a named module"
        )));
    }
    Ok(format!("{}{STATE_FILE_SUFFIX}", type_path.replace("::", ".")))
}

/// 타입 `T`의 상태 파일 이름
pub fn state_file_name<T: ?Sized>() -> Result<String, StateError> {
    state_file_name_for(std::any::type_name::<T>())
}

// ─── 코덱 ───────────────────────────────────────────────────────────

/// 디코딩 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<S> {
    /// 현재 형식으로 읽음
    Current(S),
    /// 레거시 경로로 복구함
    Legacy(S),
}

impl<S> Decoded<S> {
    pub fn into_inner(self) -> S {
        match self {
            Self::Current(s) | Self::Legacy(s) => s,
        }
    }
}

/// 상태 값 직렬화 방식
pub trait StateCodec: Send + Sync {
    /// 상태 값을 바이트열로 만듭니다.
    fn encode<S: Serialize>(&self, state: &S) -> Result<Vec<u8>, StateError>;

    /// 바이트열에서 상태 값을 복원합니다. `path`는 에러 메시지용입니다.
    fn decode<S: DeserializeOwned>(
        &self,
        path: &Path,
        data: &[u8],
    ) -> Result<Decoded<S>, StateError>;
}

/// 쓰기 프로토콜 버전
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickleProtocol {
    /// 프로토콜 2
    V2,
    /// 프로토콜 3
    #[default]
    V3,
}

impl std::str::FromStr for PickleProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(Self::V2),
            "v3" | "3" => Ok(Self::V3),
            other => Err(format!("unsupported pickle protocol '{other}' (expected: v2, v3)")),
        }
    }
}

/// 레거시 스트림의 바이트 문자열을 텍스트로 바꾸는 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegacyTextEncoding {
    /// 모든 바이트를 Latin-1 코드 포인트로 해석
    Latin1,
    /// UTF-8로 읽고, 실패하면 Latin-1로 해석
    #[default]
    Utf8OrLatin1,
}

impl LegacyTextEncoding {
    fn decode(self, bytes: &[u8]) -> String {
        let latin1 = || bytes.iter().map(|&b| char::from(b)).collect();
        match self {
            Self::Latin1 => latin1(),
            Self::Utf8OrLatin1 => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_owned(),
                Err(_) => latin1(),
            },
        }
    }
}

/// pickle 스트림 코덱
#[derive(Debug, Clone, Copy, Default)]
pub struct PickleStateCodec {
    protocol: PickleProtocol,
    legacy_text_encoding: LegacyTextEncoding,
}

impl PickleStateCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 쓰기 프로토콜을 지정합니다.
    pub fn with_protocol(mut self, protocol: PickleProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// 레거시 경로의 텍스트 해석 방식을 지정합니다.
    pub fn with_legacy_text_encoding(mut self, encoding: LegacyTextEncoding) -> Self {
        self.legacy_text_encoding = encoding;
        self
    }

    pub fn protocol(&self) -> PickleProtocol {
        self.protocol
    }

    fn decode_legacy<S: DeserializeOwned>(&self, data: &[u8]) -> Result<S, serde_pickle::Error> {
        let value = serde_pickle::value_from_slice(data, DeOptions::new())?;
        serde_pickle::from_value(bytes_to_text(value, self.legacy_text_encoding))
    }
}

/// pickle 스트림의 프로토콜 번호
///
/// 프로토콜 0/1 스트림은 표시가 없으므로 0으로 봅니다. 빈 입력이면 `None`입니다.
pub fn pickle_protocol(data: &[u8]) -> Option<u8> {
    match data {
        [] => None,
        [0x80, proto, ..] => Some(*proto),
        _ => Some(0),
    }
}

impl StateCodec for PickleStateCodec {
    fn encode<S: Serialize>(&self, state: &S) -> Result<Vec<u8>, StateError> {
        let options = match self.protocol {
            PickleProtocol::V2 => SerOptions::new().proto_v2(),
            PickleProtocol::V3 => SerOptions::new(),
        };
        serde_pickle::to_vec(state, options).map_err(|e| StateError::Encode(e.to_string()))
    }

    fn decode<S: DeserializeOwned>(
        &self,
        path: &Path,
        data: &[u8],
    ) -> Result<Decoded<S>, StateError> {
        let Some(protocol) = pickle_protocol(data) else {
            return Err(StateError::UnexpectedEof {
                path: path.to_path_buf(),
            });
        };

        let primary = match serde_pickle::from_slice::<S>(data, DeOptions::new()) {
            Ok(state) => return Ok(Decoded::Current(state)),
            Err(e) => e,
        };

        if protocol > 2 {
            return Err(StateError::Decode {
                path: path.to_path_buf(),
                reason: format!("protocol {protocol}: {primary}"),
            });
        }

        tracing::debug!(
            path = %path.display(),
            protocol,
            error = %primary,
            "retrying state decode through the legacy path"
        );
        self.decode_legacy(data)
            .map(Decoded::Legacy)
            .map_err(|legacy| StateError::Decode {
                path: path.to_path_buf(),
                reason: format!("{primary}; legacy decode also failed: {legacy}"),
            })
    }
}

fn bytes_to_text(value: Value, encoding: LegacyTextEncoding) -> Value {
    match value {
        Value::Bytes(b) => Value::String(encoding.decode(&b)),
        Value::List(items) => Value::List(
            items
                .into_iter()
                .map(|v| bytes_to_text(v, encoding))
                .collect(),
        ),
        Value::Tuple(items) => Value::Tuple(
            items
                .into_iter()
                .map(|v| bytes_to_text(v, encoding))
                .collect(),
        ),
        Value::Set(items) => Value::Set(hashable_set_to_text(items, encoding)),
        Value::FrozenSet(items) => Value::FrozenSet(hashable_set_to_text(items, encoding)),
        Value::Dict(entries) => Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| {
                    (
                        hashable_to_text(k, encoding),
                        bytes_to_text(v, encoding),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        ),
        other => other,
    }
}

fn hashable_to_text(value: HashableValue, encoding: LegacyTextEncoding) -> HashableValue {
    match value {
        HashableValue::Bytes(b) => HashableValue::String(encoding.decode(&b)),
        HashableValue::Tuple(items) => HashableValue::Tuple(
            items
                .into_iter()
                .map(|v| hashable_to_text(v, encoding))
                .collect(),
        ),
        HashableValue::FrozenSet(items) => {
            HashableValue::FrozenSet(hashable_set_to_text(items, encoding))
        }
        other => other,
    }
}

fn hashable_set_to_text(
    items: BTreeSet<HashableValue>,
    encoding: LegacyTextEncoding,
) -> BTreeSet<HashableValue> {
    items
        .into_iter()
        .map(|v| hashable_to_text(v, encoding))
        .collect()
}

// ─── 저장소 ─────────────────────────────────────────────────────────

/// 상태를 어디서 읽었는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 파일이 없어 기본 상태를 씀
    Missing,
    /// 현재 형식
    Current,
    /// 레거시 경로로 복구
    Legacy,
}

/// 상태 파일 하나를 관리하는 저장소
///
/// 한 상태 파일의 작성자는 동시에 하나뿐이라고 가정합니다 (내부 잠금 없음).
#[derive(Debug, Clone)]
pub struct StateStore<K = PickleStateCodec> {
    dir: PathBuf,
    file_name: String,
    codec: K,
}

impl StateStore<PickleStateCodec> {
    /// 기본 pickle 코덱을 쓰는 저장소를 만듭니다.
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self::with_codec(dir, file_name, PickleStateCodec::new())
    }

    /// 타입 `T`의 상태 파일을 쓰는 저장소를 만듭니다.
    pub fn for_type<T: ?Sized>(dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        Ok(Self::new(dir, state_file_name::<T>()?))
    }
}

impl<K: StateCodec> StateStore<K> {
    pub fn with_codec(dir: impl Into<PathBuf>, file_name: impl Into<String>, codec: K) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            codec,
        }
    }

    /// 상태 파일 전체 경로
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn codec(&self) -> &K {
        &self.codec
    }

    /// 상태를 읽습니다.
    ///
    /// 레거시 경로로 읽은 값은 `adjust_legacy`를 거칩니다.
    pub fn load<S: DeserializeOwned>(
        &self,
        make_default: impl FnOnce() -> S,
        adjust_legacy: impl FnOnce(S) -> S,
    ) -> Result<S, StateError> {
        self.load_with_outcome(make_default, adjust_legacy)
            .map(|(state, _)| state)
    }

    /// 상태와 함께 읽은 경로를 돌려줍니다.
    pub fn load_with_outcome<S: DeserializeOwned>(
        &self,
        make_default: impl FnOnce() -> S,
        adjust_legacy: impl FnOnce(S) -> S,
    ) -> Result<(S, LoadOutcome), StateError> {
        let path = self.path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "state file not found, starting from the default state"
                );
                return Ok((make_default(), LoadOutcome::Missing));
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        match self.codec.decode::<S>(&path, &data) {
            Ok(Decoded::Current(state)) => {
                tracing::debug!(path = %path.display(), bytes = data.len(), "state loaded");
                Ok((state, LoadOutcome::Current))
            }
            Ok(Decoded::Legacy(state)) => {
                tracing::warn!(
                    path = %path.display(),
                    "state file was written in a legacy format; \
                     it will be rewritten in the current format on the next save"
                );
                metrics::counter!(m::COLLECTOR_STATE_LEGACY_LOADS_TOTAL).increment(1);
                Ok((adjust_legacy(state), LoadOutcome::Legacy))
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "cannot load collector state");
                Err(e)
            }
        }
    }

    /// 상태를 원자적으로 저장합니다.
    pub fn save<S: Serialize>(&self, state: &S) -> Result<(), StateError> {
        let path = self.path();
        let io_err = |source: std::io::Error| StateError::Io {
            path: path.clone(),
            source,
        };

        let data = self.codec.encode(state)?;
        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "state saved");
        Ok(())
    }
}

// ─── StatefulCollector ──────────────────────────────────────────────

/// 실행 사이에 상태를 유지하는 수집기
pub trait StatefulCollector: Send + Sync {
    /// 상태 값 (첫 실행 기본값은 `Default`)
    type State: Serialize + DeserializeOwned + Default + Send;

    /// 이 수집기의 상태 저장소
    fn state_store(&self) -> &StateStore;

    /// 상태 파일이 없을 때 쓸 값
    fn make_default_state(&self) -> Self::State {
        Self::State::default()
    }

    /// 레거시 경로로 읽은 값의 후처리 (기본: 그대로)
    fn adjust_legacy_state(&self, state: Self::State) -> Self::State {
        state
    }

    fn load_state(&self) -> Result<Self::State, StateError> {
        self.state_store().load(
            || self.make_default_state(),
            |state| self.adjust_legacy_state(state),
        )
    }

    fn save_state(&self, state: &Self::State) -> Result<(), StateError> {
        self.state_store().save(state)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        runs: u32,
        last: Option<String>,
    }

    #[test]
    fn file_name_from_type_path() {
        assert_eq!(
            state_file_name_for("my_feeds::abuse::FeodoCollector").unwrap(),
            "my_feeds.abuse.FeodoCollector.pickle"
        );
        assert!(matches!(
            state_file_name_for("main::Feed"),
            Err(StateError::InvalidFileName(_))
        ));
        assert!(state_file_name_for("feeds::Wrapper<feeds::Inner>").is_err());
        assert!(state_file_name_for("").is_err());

        let derived = state_file_name::<Counter>().unwrap();
        assert!(derived.ends_with(".state.tests.Counter.pickle"), "{derived}");
    }

    #[test]
    fn protocol_marker() {
        assert_eq!(pickle_protocol(b""), None);
        assert_eq!(pickle_protocol(b"\x80\x03}q\x00."), Some(3));
        assert_eq!(pickle_protocol(b"(dp0\n."), Some(0));
    }

    #[test]
    fn missing_file_returns_default_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "x.pickle");
        let (state, outcome) = store
            .load_with_outcome(Counter::default, |s| s)
            .unwrap();
        assert_eq!(state, Counter::default());
        assert_eq!(outcome, LoadOutcome::Missing);
        assert!(!store.path().exists());
    }

    #[test]
    fn save_then_load_both_protocols() {
        for protocol in [PickleProtocol::V2, PickleProtocol::V3] {
            let dir = tempfile::tempdir().unwrap();
            let codec = PickleStateCodec::new().with_protocol(protocol);
            let store = StateStore::with_codec(dir.path(), "c.pickle", codec);
            let state = Counter {
                runs: 3,
                last: Some("2019-07-13".to_owned()),
            };
            store.save(&state).unwrap();

            let data = fs::read(store.path()).unwrap();
            let expected = if protocol == PickleProtocol::V2 { 2 } else { 3 };
            assert_eq!(pickle_protocol(&data), Some(expected));

            let (loaded, outcome) = store
                .load_with_outcome(Counter::default, |s| s)
                .unwrap();
            assert_eq!(loaded, state);
            assert_eq!(outcome, LoadOutcome::Current);
        }
    }

    #[test]
    fn empty_file_is_unexpected_eof() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "e.pickle");
        fs::write(store.path(), b"").unwrap();
        let err = store.load(Counter::default, |s| s).unwrap_err();
        assert!(matches!(err, StateError::UnexpectedEof { .. }));
        assert!(err.to_string().contains("unexpected end of data"));
    }

    #[test]
    fn garbage_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "g.pickle");
        fs::write(store.path(), b"definitely not a pickle").unwrap();
        let err = store.load(Counter::default, |s| s).unwrap_err();
        assert!(matches!(err, StateError::Decode { .. }));
    }

    #[test]
    fn unsupported_protocol_is_fatal_without_legacy_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "p.pickle");
        fs::write(store.path(), b"\x80\x09\x00\x00").unwrap();
        let err = store.load(Counter::default, |s| s).unwrap_err();
        match err {
            StateError::Decode { reason, .. } => {
                assert!(reason.starts_with("protocol 9"));
                assert!(!reason.contains("legacy"));
            }
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn failed_save_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "k.pickle");
        // rename 대상이 비어 있지 않은 디렉터리
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("keep"), b"x").unwrap();

        let err = store.save(&Counter::default()).unwrap_err();
        assert!(matches!(err, StateError::Io { .. }));
        assert!(store.path().join("keep").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn legacy_text_decoding() {
        assert_eq!(LegacyTextEncoding::Latin1.decode(b"\xe9t\xe9"), "été");
        assert_eq!(LegacyTextEncoding::Utf8OrLatin1.decode("été".as_bytes()), "été");
        assert_eq!(LegacyTextEncoding::Utf8OrLatin1.decode(b"\xe9"), "é");
    }
}
