#![doc = include_str!("../README.md")]

pub mod config;
pub mod converters;
pub mod egg;
pub mod error;
pub mod loader;
pub mod pyliteral;
pub mod spec;
pub mod text;
pub mod value;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ConfigSpecEggError, ConfigSpecError};

// 텍스트/스펙 모델
pub use spec::{ConfigSpec, OptSpec, SectSpec, render_sect_specs};
pub use text::{ConfigString, Dialect, RawConfigData, parse_config_data};

// 결합 엔진
pub use egg::{
    CombinedSpecEgg, FormatArgs, FormatData, SpecEgg, SpecSource, as_config_spec_string, combine,
};

// 값 엔진
pub use config::{Config, ConfigBuilder, ConfigSection, Settings};
pub use converters::{Converter, ConverterTable, DottedNameRegistry};
pub use value::{ConfigValue, FromConfigValue};

// 설정 파일
pub use loader::{
    Clock, ConfigFileCache, ConfigLoadOptions, DEFAULT_CONFIG_FILENAME_EXCLUDING_REGEX,
    DEFAULT_CONFIG_FILENAME_REGEX, ManualClock, SystemClock,
};
