//! 스펙 파싱/결합 속성 테스트

use proptest::prelude::*;

use n6_config::{ConfigSpec, FormatArgs, OptSpec, SectSpec, as_config_spec_string, combine, render_sect_specs};

fn converter() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["str", "int", "bool", "list_of_str", "json", "py"])
        .prop_map(str::to_owned)
}

fn default_value() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop_oneof![
        Just(String::new()),
        "[a-zA-Z0-9_/,.-]{1,12}",
        ("[a-z0-9]{1,6}", "[a-z0-9]{1,6}").prop_map(|(a, b)| format!("{a}\n{b}")),
    ])
}

fn opt_spec() -> impl Strategy<Value = OptSpec> {
    ("[a-z][a-z0-9_]{0,8}", default_value(), converter()).prop_map(|(name, default, converter_spec)| {
        OptSpec {
            name,
            default,
            converter_spec,
        }
    })
}

fn sect_spec() -> impl Strategy<Value = SectSpec> {
    (
        "[a-zA-Z][a-zA-Z0-9_-]{0,8}",
        prop::collection::vec(opt_spec(), 0..6),
        prop::option::of(converter()),
    )
        .prop_map(|(name, opts, free)| {
            let mut seen = std::collections::BTreeSet::new();
            let opt_specs = opts
                .into_iter()
                .filter(|o| seen.insert(o.name.clone()))
                .collect();
            SectSpec {
                name,
                opt_specs,
                free_opts_allowed: free.is_some(),
                free_opts_converter_spec: free.unwrap_or_else(|| "str".to_owned()),
            }
        })
}

fn sect_specs() -> impl Strategy<Value = Vec<SectSpec>> {
    prop::collection::vec(sect_spec(), 0..5).prop_map(|sects| {
        let mut seen = std::collections::BTreeSet::new();
        sects
            .into_iter()
            .filter(|s| seen.insert(s.name.clone()))
            .collect()
    })
}

proptest! {
    /// 렌더링 후 다시 파싱하면 같은 스펙
    #[test]
    fn render_then_parse_round_trips(specs in sect_specs()) {
        let text = render_sect_specs(&specs);
        let parsed = ConfigSpec::parse(&text).expect("rendered spec must parse");
        prop_assert_eq!(parsed.get_all_sect_specs(), specs.as_slice());
    }

    /// 자기 자신과 결합해도 그대로
    #[test]
    fn combining_with_itself_is_identity(specs in sect_specs()) {
        let text = render_sect_specs(&specs);
        let combined = combine(Some(text.clone().into()), text, "props.Same.config_spec");
        let rendered = as_config_spec_string(&combined, FormatArgs::None)
            .expect("self combination must succeed");
        let parsed = ConfigSpec::parse(&rendered).expect("combined spec must parse");
        prop_assert_eq!(parsed.get_all_sect_specs(), specs.as_slice());
    }

    /// 임의 텍스트 파싱은 패닉하지 않음
    #[test]
    fn parse_arbitrary_text_does_not_panic(text in "\\PC{0,200}") {
        let _ = ConfigSpec::parse(&text);
    }
}
