//! 설정 파일 탐색과 읽기
//!
//! 두 개의 루트 디렉토리(`/etc/n6`, `~/.n6`)를 재귀적으로 훑어 파일명 정규식에
//! 맞는 파일을 이름 순서대로 읽고 병합합니다. 나중 파일의 값이 이깁니다.
//!
//! [`ConfigFileCache`]는 같은 탐색 조건의 읽기 결과를 일정 시간(기본 60초)
//! 동안 재사용합니다. 시계는 주입할 수 있어 만료 동작을 결정적으로 테스트할 수 있습니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;
use walkdir::WalkDir;

use crate::converters::expand_user;
use crate::error::ConfigError;
use crate::text::{RawConfigData, parse_config_data};

/// 기본 설정 파일명 정규식
pub const DEFAULT_CONFIG_FILENAME_REGEX: &str = r"\A[0-9][0-9]_.*\.conf\z";

/// 기본 설정 파일명 제외 정규식
pub const DEFAULT_CONFIG_FILENAME_EXCLUDING_REGEX: &str = r"\Alogging[-.]";

/// 시스템 설정 루트
pub const SYSTEM_CONFIG_ROOT: &str = "/etc/n6";

/// 사용자 설정 루트
pub const USER_CONFIG_ROOT: &str = "~/.n6";

/// 설정 파일 읽기 캐시 기본 유효 시간
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// 기본 설정 루트 목록을 반환합니다.
///
/// `HOME`이 없으면 사용자 루트는 빠집니다.
pub fn default_config_roots() -> Vec<PathBuf> {
    let mut roots = vec![PathBuf::from(SYSTEM_CONFIG_ROOT)];
    match expand_user(USER_CONFIG_ROOT) {
        Ok(user_root) => roots.push(user_root),
        Err(reason) => tracing::debug!(reason = %reason, "skipping user config root"),
    }
    roots
}

/// 설정 파일 탐색 조건
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigLoadOptions {
    /// 탐색할 루트 디렉토리 (앞쪽이 먼저 읽힘)
    pub roots: Vec<PathBuf>,
    /// 파일명이 맞아야 하는 정규식
    pub filename_regex: String,
    /// 파일명이 맞으면 제외되는 정규식
    pub filename_excluding_regex: String,
}

impl Default for ConfigLoadOptions {
    fn default() -> Self {
        Self {
            roots: default_config_roots(),
            filename_regex: DEFAULT_CONFIG_FILENAME_REGEX.to_owned(),
            filename_excluding_regex: DEFAULT_CONFIG_FILENAME_EXCLUDING_REGEX.to_owned(),
        }
    }
}

impl ConfigLoadOptions {
    /// 루트 디렉토리를 바꿉니다.
    pub fn with_roots(mut self, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// 파일명 정규식을 바꿉니다.
    pub fn with_filename_regex(mut self, regex: impl Into<String>) -> Self {
        self.filename_regex = regex.into();
        self
    }

    /// 파일명 제외 정규식을 바꿉니다.
    pub fn with_filename_excluding_regex(mut self, regex: impl Into<String>) -> Self {
        self.filename_excluding_regex = regex.into();
        self
    }
}

/// 조건에 맞는 설정 파일 경로를 읽기 순서대로 반환합니다.
pub fn discover_config_files(options: &ConfigLoadOptions) -> Result<Vec<PathBuf>, ConfigError> {
    let include = Regex::new(&options.filename_regex)?;
    let exclude = Regex::new(&options.filename_excluding_regex)?;

    let mut files = Vec::new();
    for root in &options.roots {
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "config root does not exist");
            continue;
        }
        let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| ConfigError::FileRead {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if include.is_match(name) && !exclude.is_match(name) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// 설정 파일 하나를 읽어 파싱합니다.
pub fn read_config_file(path: &Path) -> Result<RawConfigData, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config_data(&text).map_err(|e| ConfigError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// 조건에 맞는 모든 설정 파일을 읽어 병합합니다.
pub fn load_config_files(options: &ConfigLoadOptions) -> Result<RawConfigData, ConfigError> {
    let mut merged = RawConfigData::new();
    for path in discover_config_files(options)? {
        tracing::debug!(path = %path.display(), "reading config file");
        for (section, opts) in read_config_file(&path)? {
            merged.entry(section).or_default().extend(opts);
        }
    }
    Ok(merged)
}

// ─── 캐시 ─────────────────────────────────────────────────────────

/// 캐시 만료 판단에 쓰는 시계
pub trait Clock: Send + Sync {
    /// 현재 단조 시각
    fn now(&self) -> Instant;
}

/// 실제 단조 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 수동으로 진행시키는 시계 (테스트용)
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// 현재 시각에서 멈춘 시계를 만듭니다.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// 시계를 앞으로 돌립니다.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = *self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        self.base + elapsed
    }
}

struct CacheEntry {
    loaded_at: Instant,
    data: Arc<RawConfigData>,
}

/// 시간 제한이 있는 설정 파일 읽기 캐시
///
/// 같은 탐색 조건으로 유효 시간 안에 다시 읽으면 이전 결과를 돌려줍니다.
/// 읽는 동안 잠금을 유지하므로 동시에 요청한 쪽들은 같은 결과를 받습니다.
pub struct ConfigFileCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<ConfigLoadOptions, CacheEntry>>,
}

impl std::fmt::Debug for ConfigFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFileCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigFileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFileCache {
    /// 실제 시계와 기본 유효 시간으로 캐시를 만듭니다.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_CACHE_TTL)
    }

    /// 시계와 유효 시간을 지정해 캐시를 만듭니다.
    pub fn with_clock(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시된 결과가 유효하면 돌려주고, 아니면 파일을 읽어 저장합니다.
    pub fn get_or_load(&self, options: &ConfigLoadOptions) -> Result<Arc<RawConfigData>, ConfigError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        if let Some(entry) = entries.get(options) {
            if now.duration_since(entry.loaded_at) < self.ttl {
                return Ok(Arc::clone(&entry.data));
            }
        }
        let data = Arc::new(load_config_files(options)?);
        entries.insert(
            options.clone(),
            CacheEntry {
                loaded_at: now,
                data: Arc::clone(&data),
            },
        );
        Ok(data)
    }

    /// 모든 캐시 항목을 버립니다.
    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn options(roots: &[&Path]) -> ConfigLoadOptions {
        ConfigLoadOptions::default().with_roots(roots.iter().copied())
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "20_b.conf", "");
        write(dir.path(), "10_a.conf", "");
        write(dir.path(), "sub/05_c.conf", "");
        write(dir.path(), "logging-10_x.conf", "");
        write(dir.path(), "09_logging.conf.bak", "");
        write(dir.path(), "a_10.conf", "");

        let files = discover_config_files(&options(&[dir.path()])).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["10_a.conf", "20_b.conf", "sub/05_c.conf"]);
    }

    #[test]
    fn exclusion_regex_applies_to_matching_names() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_logging.conf", "");
        let opts = options(&[dir.path()]).with_filename_regex(r".*\.conf\z");
        write(dir.path(), "logging.conf", "");
        let files = discover_config_files(&opts).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("10_logging.conf"));
    }

    #[test]
    fn later_files_override_earlier() {
        let etc = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        write(etc.path(), "00_global.conf", "[s]\na = 1\nb = 2\n");
        write(etc.path(), "50_more.conf", "[s]\nB = 3\n[t]\nx = y\n");
        write(home.path(), "00_user.conf", "[s]\na = user\n");

        let data = load_config_files(&options(&[etc.path(), home.path()])).unwrap();
        assert_eq!(data["s"]["a"], "user");
        assert_eq!(data["s"]["b"], "3");
        assert_eq!(data["t"]["x"], "y");
    }

    #[test]
    fn missing_roots_are_skipped() {
        let data = load_config_files(&options(&[Path::new("/nonexistent/n6/root")])).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_bad.conf", "  orphan continuation\n");
        let err = load_config_files(&options(&[dir.path()])).unwrap_err();
        assert!(err.to_string().contains("10_bad.conf"));
    }

    #[test]
    fn invalid_regex_is_error() {
        let opts = ConfigLoadOptions::default().with_filename_regex("(");
        assert!(matches!(
            discover_config_files(&opts),
            Err(ConfigError::Regex(_))
        ));
    }

    #[test]
    fn cache_expires_with_clock() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_a.conf", "[s]\na = 1\n");
        let clock = Arc::new(ManualClock::new());
        let cache = ConfigFileCache::with_clock(clock.clone(), DEFAULT_CACHE_TTL);
        let opts = options(&[dir.path()]);

        let first = cache.get_or_load(&opts).unwrap();
        write(dir.path(), "10_a.conf", "[s]\na = 2\n");

        clock.advance(Duration::from_secs(59));
        let cached = cache.get_or_load(&opts).unwrap();
        assert!(Arc::ptr_eq(&first, &cached));
        assert_eq!(cached["s"]["a"], "1");

        clock.advance(Duration::from_secs(1));
        let reloaded = cache.get_or_load(&opts).unwrap();
        assert_eq!(reloaded["s"]["a"], "2");
    }

    #[test]
    fn cache_invalidate_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_a.conf", "[s]\na = 1\n");
        let cache = ConfigFileCache::with_clock(Arc::new(ManualClock::new()), DEFAULT_CACHE_TTL);
        let opts = options(&[dir.path()]);
        let _ = cache.get_or_load(&opts).unwrap();
        write(dir.path(), "10_a.conf", "[s]\na = 2\n");
        cache.invalidate();
        assert_eq!(cache.get_or_load(&opts).unwrap()["s"]["a"], "2");
    }

    #[test]
    fn cache_is_keyed_by_options() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "10_a.conf", "[s]\na = 1\n");
        write(dir.path(), "x.ini", "[s]\na = ini\n");
        let cache = ConfigFileCache::with_clock(Arc::new(ManualClock::new()), DEFAULT_CACHE_TTL);
        let conf = cache.get_or_load(&options(&[dir.path()])).unwrap();
        let ini = cache
            .get_or_load(&options(&[dir.path()]).with_filename_regex(r"\.ini\z"))
            .unwrap();
        assert_eq!(conf["s"]["a"], "1");
        assert_eq!(ini["s"]["a"], "ini");
    }
}
