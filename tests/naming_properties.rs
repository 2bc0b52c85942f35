//! Property tests for suite and checkpoint name derivation.

use expectation_server::datasource::DatasourceConfig;
use expectation_server::naming::{checkpoint_name, suite_name};
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_filter("YAML keyword", |s| {
        !matches!(s.as_str(), "true" | "false" | "null")
    })
}

proptest! {
    #[test]
    fn suite_name_is_deterministic(source in identifier(), label in identifier()) {
        prop_assert_eq!(suite_name(&source, &label), suite_name(&source, &label));
        let name = suite_name(&source, &label);
        prop_assert_eq!(
            name.as_str(),
            format!("{source}.{label}_expectation_suite")
        );
    }

    #[test]
    fn checkpoint_name_is_deterministic(source in identifier(), asset in identifier()) {
        prop_assert_eq!(checkpoint_name(&source, &asset), checkpoint_name(&source, &asset));
        prop_assert!(checkpoint_name(&source, &asset).as_str().ends_with("_checkpoint"));
    }

    #[test]
    fn suite_docs_path_has_one_segment_per_dot(source in identifier(), label in identifier()) {
        let name = suite_name(&source, &label);
        let path = name.docs_path();
        prop_assert_eq!(path.split('/').count(), name.segments().count());
        prop_assert!(!path.contains('.'));
    }

    #[test]
    fn names_ignore_unrelated_datasource_keys(
        source in identifier(),
        asset in identifier(),
        extra in identifier(),
    ) {
        let plain = format!(
            "execution_engine: {{credentials: {{database: {source}}}}}\n\
             data_connectors: {{c: {{assets: {{{asset}: {{}}}}}}}}\n"
        );
        let decorated = format!("{plain}{extra}_setting: 42\nclass_name: Datasource\n");

        let a = DatasourceConfig::from_yaml(&plain).unwrap();
        let b = DatasourceConfig::from_yaml(&decorated).unwrap();
        prop_assert_eq!(
            checkpoint_name(a.source_name(), a.asset_name()),
            checkpoint_name(b.source_name(), b.asset_name())
        );
    }
}
