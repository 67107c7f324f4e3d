//! Property-based tests for grant types.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use std::cmp::Ordering;

    use crate::model::{Grant, GrantScope, GrantSource, PermissionRef, Polarity, ResourceRef};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Strategy to generate grants differing in every ordering field.
    fn grant_strategy() -> impl Strategy<Value = Grant> {
        (
            "[a-z0-9]{1,8}",
            any::<bool>(),
            prop_oneof![
                Just(GrantSource::Role),
                Just(GrantSource::DirectResource),
                Just(GrantSource::Delegation)
            ],
            -5i32..5,
            0i64..10,
        )
            .prop_map(|(id, resource_scoped, source, priority, created)| {
                let scope = if resource_scoped {
                    GrantScope::Resource(ResourceRef::new("document", "doc_1"))
                } else {
                    GrantScope::Global
                };
                Grant::new(
                    id,
                    "user-1",
                    PermissionRef::new("document", "READ"),
                    scope,
                    Polarity::Allow,
                    source,
                    ts(created),
                )
                .with_priority(priority)
            })
    }

    proptest! {
        #[test]
        fn test_permission_parse_roundtrip(
            module in "[a-z]{1,10}",
            action in "[A-Z_]{1,10}"
        ) {
            let input = format!("{module}:{action}");
            let parsed = PermissionRef::parse(&input);
            prop_assert!(parsed.is_ok());
            prop_assert_eq!(parsed.unwrap().to_string(), input);
        }

        #[test]
        fn test_specificity_order_is_antisymmetric(a in grant_strategy(), b in grant_strategy()) {
            let forward = a.specificity_cmp(&b);
            let backward = b.specificity_cmp(&a);
            prop_assert_eq!(forward, backward.reverse());
            if forward == Ordering::Equal {
                prop_assert_eq!(&a.id, &b.id);
            }
        }

        #[test]
        fn test_resource_scope_always_outranks_global(a in grant_strategy(), b in grant_strategy()) {
            if a.scope.specificity() > b.scope.specificity() {
                prop_assert_eq!(a.specificity_cmp(&b), Ordering::Greater);
            }
        }
    }
}
