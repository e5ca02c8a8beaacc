//! Property tests for the namelist model, composition and diff.

use ifsbench_namelist::{
    Array, ChangeKind, ConfigError, ConfigLayer, DiffOptions, Group, Namelist, NamelistOverride,
    Provenance, Scalar, Value, compose, diff, is_valid_name, parse_str, to_string,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn name() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9_]{0,6}".prop_filter("END terminates a group", |s| s != "END")
}

/// Mostly identifiers, plus names the reader would refuse
fn any_name() -> impl Strategy<Value = String> {
    prop_oneof![
        2 => "[A-Za-z_][A-Za-z0-9_]{0,5}",
        1 => "[ -~]{0,6}",
        1 => Just("END".to_string()),
    ]
}

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::Int),
        any::<f64>().prop_map(Scalar::Float),
        "[ -~]{0,12}".prop_map(Scalar::Str),
    ]
}

fn array() -> impl Strategy<Value = Array> {
    proptest::collection::btree_map(1usize..16, scalar(), 1..5).prop_map(|elements| {
        let mut array = Array::new();
        for (index, value) in elements {
            array.insert(index, value);
        }
        array
    })
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![scalar().prop_map(Value::Scalar), array().prop_map(Value::Array)]
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => leaf(),
        1 => proptest::collection::btree_map(name(), leaf(), 1..3).prop_map(|fields| {
            let mut record = Group::new("record").unwrap();
            for (field, value) in fields {
                record.insert(field, value).unwrap();
            }
            Value::Record(record)
        }),
    ]
}

fn namelist() -> impl Strategy<Value = Namelist> {
    proptest::collection::btree_map(
        name(),
        proptest::collection::btree_map(name(), value(), 0..4),
        0..4,
    )
    .prop_map(|groups| {
        let mut builder = Namelist::builder();
        for (group, entries) in groups {
            builder = builder.group(group.clone());
            for (key, value) in entries {
                builder = builder.set(group.clone(), key, value);
            }
        }
        builder.build().unwrap()
    })
}

fn layers(namelists: Vec<Namelist>) -> Vec<ConfigLayer> {
    namelists
        .into_iter()
        .enumerate()
        .map(|(i, nml)| ConfigLayer::new(format!("layer{}", i), Provenance::Experiment, nml))
        .collect()
}

fn keys_of(report: &ifsbench_namelist::DiffReport, kind: ChangeKind) -> BTreeSet<String> {
    report
        .iter()
        .filter(|c| c.kind == kind)
        .map(|c| format!("{}.{}", c.group, c.key).to_ascii_lowercase())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn serialized_namelist_reads_back_equal(nml in namelist()) {
        let text = to_string(&nml);
        let read = parse_str(&text).unwrap();
        prop_assert_eq!(&read, &nml);

        let order: Vec<&str> = read.groups().map(Group::name).collect();
        let expected: Vec<&str> = nml.groups().map(Group::name).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn composing_a_prefix_first_changes_nothing(
        namelists in proptest::collection::vec(namelist(), 1..5),
        split in any::<proptest::sample::Index>(),
    ) {
        let stack = layers(namelists);
        let k = split.index(stack.len() + 1);

        let full = compose(&stack);
        let prefix = compose(&stack[..k]).to_layer("prefix", Provenance::Site);
        let mut regrouped = vec![prefix];
        regrouped.extend_from_slice(&stack[k..]);
        let staged = compose(&regrouped);

        prop_assert_eq!(staged.namelist(), full.namelist());
        prop_assert_eq!(staged.digest(), full.digest());
    }

    #[test]
    fn diff_with_self_is_empty(nml in namelist()) {
        prop_assert!(diff(&nml, &nml, &DiffOptions::default()).is_empty());
    }

    #[test]
    fn diff_swaps_added_and_removed(a in namelist(), b in namelist()) {
        let options = DiffOptions::default();
        let ab = diff(&a, &b, &options);
        let ba = diff(&b, &a, &options);

        prop_assert_eq!(keys_of(&ab, ChangeKind::Added), keys_of(&ba, ChangeKind::Removed));
        prop_assert_eq!(keys_of(&ab, ChangeKind::Removed), keys_of(&ba, ChangeKind::Added));
        prop_assert_eq!(keys_of(&ab, ChangeKind::Changed), keys_of(&ba, ChangeKind::Changed));
    }

    #[test]
    fn with_override_leaves_original_untouched(nml in namelist(), group in name(), key in name(), v in leaf()) {
        let before = nml.clone();
        let after = nml.with_override(&group, &key, v.clone()).unwrap();

        prop_assert_eq!(&nml, &before);
        prop_assert_eq!(after.get(&group, &key).unwrap(), &v);
        prop_assert!(diff(&nml, &after, &DiffOptions::default()).len() <= 1);
    }

    #[test]
    fn only_names_the_reader_accepts_can_be_built(group in any_name(), key in any_name()) {
        let valid = is_valid_name(&group) && !group.eq_ignore_ascii_case("end") && is_valid_name(&key);

        let built = Namelist::builder().set(group.clone(), key.clone(), 1).build();
        prop_assert_eq!(built.is_ok(), valid);
        if let Ok(nml) = built {
            prop_assert_eq!(parse_str(&to_string(&nml)).unwrap(), nml);
        }

        prop_assert_eq!(Namelist::new().with_override(&group, &key, Value::from(1)).is_ok(), valid);
        prop_assert_eq!(NamelistOverride::set(group.clone(), key.clone(), 1).apply(&Namelist::new()).is_ok(), valid);
    }

    #[test]
    fn duplicate_keys_in_any_casing_are_rejected(key in "[A-Z][A-Z0-9]{0,5}", flip in any::<bool>()) {
        let other = if flip { key.to_ascii_lowercase() } else { key.clone() };
        let text = format!("&G\n  {} = 1,\n  {} = 2,\n/\n", key, other);
        let rejected = matches!(parse_str(&text), Err(ConfigError::DuplicateKey { .. }));
        prop_assert!(rejected);
    }
}

#[test]
fn overriding_layer_example() {
    let defaults = parse_str("&A x = 1 /").unwrap();
    let overrides = parse_str("&A x = 2 /\n&B y = 'hi' /").unwrap();
    let effective = compose(&layers(vec![defaults.clone(), overrides]));

    let expected = Namelist::builder()
        .set("A", "x", 2)
        .set("B", "y", "hi")
        .build()
        .unwrap();
    assert_eq!(effective.namelist(), &expected);

    let report = diff(&defaults, effective.namelist(), &DiffOptions::default());
    assert_eq!(
        report.render_lines(),
        vec!["changed A.x: 1 -> 2", "added B.y: None -> \"hi\""]
    );
}
