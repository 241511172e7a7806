#![allow(missing_docs)]

use artigraph::graph::{derive_index_name, IndexDef};
use proptest::prelude::*;

fn arb_label() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z#]{0,24}"
}

fn arb_keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z][A-Za-z]{0,12}", 1..=4)
}

proptest! {
    #[test]
    fn prop_name_is_a_pure_function(label in arb_label(), keys in arb_keys()) {
        let first = derive_index_name(&label, &keys);
        let second = derive_index_name(&label.clone(), &keys.clone());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, format!("{}.{}", label, keys.join(".")));
    }

    #[test]
    fn prop_composite_defs_carry_the_derived_name(label in arb_label(), keys in arb_keys()) {
        let def = IndexDef::composite(label.clone(), keys.clone());
        prop_assert_eq!(def.name, derive_index_name(&label, &keys));
        prop_assert_eq!(def.keys, keys);
    }

    #[test]
    fn prop_key_order_is_significant(label in arb_label(), a in "[a-z]{1,6}", b in "[A-Z]{1,6}") {
        prop_assert_ne!(
            derive_index_name(&label, &[a.clone(), b.clone()]),
            derive_index_name(&label, &[b, a])
        );
    }
}
