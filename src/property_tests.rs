//! Property-based testing for the security model.
//!
//! This module uses the `proptest` crate to verify id allocation, filtering and
//! authorization checks under a wide variety of inputs.

use crate::{
    error::Error,
    filter::FilterOptions,
    matcher::{GlobPathMatcher, PathMatcher},
    model::GenericSecurityModel,
    role::Role,
    storage::IdSequence,
    user::User,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Generate distinct lowercase usernames.
fn usernames_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z][a-z0-9]{0,11}", 1..max)
        .prop_map(|names| names.into_iter().collect())
}

/// Generate request paths made of simple segments.
fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_-]{1,8}", 1..5).prop_map(|segments| {
        segments
            .iter()
            .map(|segment| format!("/{segment}"))
            .collect::<String>()
    })
}

proptest! {
    #[test]
    fn prop_user_ids_are_sequential(usernames in usernames_strategy(12)) {
        let mut model = GenericSecurityModel::new();
        let mut ids = Vec::new();

        for username in &usernames {
            let mut user = User::with_credentials(username.as_str(), "secret");
            model.save_user(&mut user).unwrap();
            ids.push(user.id().unwrap());
        }

        let expected: Vec<u64> = (1..=usernames.len() as u64).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn prop_id_sequence_never_reuses_ids(
        preset in prop::collection::btree_set(1u64..1000, 0..8),
        fresh in 0usize..8
    ) {
        let mut sequence = IdSequence::new();
        let mut roles: Vec<Role> = preset
            .iter()
            .map(|id| {
                let mut role = Role::named(format!("preset-{id}"));
                role.set_id(*id).unwrap();
                role
            })
            .collect();
        roles.extend((0..fresh).map(|index| Role::named(format!("fresh-{index}"))));

        let keyed = sequence.assign_roles(roles).unwrap();
        prop_assert_eq!(keyed.len(), preset.len() + fresh);

        let highest = preset.iter().copied().max().unwrap_or(0);
        for (id, role) in &keyed {
            prop_assert_eq!(role.id(), Some(*id));
            if role.name().starts_with("fresh-") {
                prop_assert!(*id > highest);
            }
        }
        prop_assert!(sequence.next_role_id() > keyed.keys().copied().max().unwrap_or(0));
    }

    #[test]
    fn prop_counts_ignore_pagination(
        usernames in usernames_strategy(20),
        query in "[a-z]{0,2}",
        limit in 1usize..6
    ) {
        let mut model = GenericSecurityModel::new();
        for username in &usernames {
            let mut user = User::with_credentials(username.as_str(), "secret");
            model.save_user(&mut user).unwrap();
        }

        let filter = FilterOptions::new().query(query.as_str());
        let total = model.count_users(&filter).unwrap();
        prop_assert_eq!(
            total,
            usernames.iter().filter(|name| name.contains(query.as_str())).count()
        );

        let mut seen = BTreeSet::new();
        let mut page = 1;
        loop {
            let paged = filter.clone().limit(limit).page(page);
            prop_assert_eq!(model.count_users(&paged).unwrap(), total);

            let users = model.users(&paged).unwrap();
            prop_assert!(users.len() <= limit);
            if users.is_empty() {
                break;
            }
            for user in users {
                prop_assert!(seen.insert(user.id().unwrap()));
            }
            page += 1;
        }
        prop_assert_eq!(seen.len(), total);
    }

    #[test]
    fn prop_usernames_conflict_regardless_of_case(username in "[a-z][a-z0-9]{0,11}") {
        let mut model = GenericSecurityModel::new();
        let mut first = User::with_credentials(username.as_str(), "secret");
        model.save_user(&mut first).unwrap();

        let mut second = User::with_credentials(username.to_uppercase(), "secret");
        prop_assert!(matches!(
            model.save_user(&mut second),
            Err(Error::UsernameExists(_))
        ));
        prop_assert!(model.user_by_username(&username.to_uppercase()).unwrap().is_some());
    }

    #[test]
    fn prop_glob_patterns(path in path_strategy()) {
        let matcher = GlobPathMatcher::new();

        prop_assert!(matcher.matches(&path, None, &[path.clone()]));
        prop_assert!(matcher.matches(&path, Some("GET"), &["/**".to_string()]));
        prop_assert!(!matcher.matches(&path, None, &[]));

        let first_segment = path.split('/').nth(1).unwrap_or_default();
        let single = format!("/{first_segment}");
        prop_assert_eq!(
            matcher.matches_pattern(&path, None, "/*"),
            path == single
        );
    }

    #[test]
    fn prop_role_weight_is_highest_role(weights in prop::collection::vec(-100i32..100, 0..6)) {
        let mut user = User::with_credentials("alice", "secret");
        user.set_roles(weights.iter().enumerate().map(|(index, weight)| {
            let mut role = Role::named(format!("role-{index}"));
            role.set_id(index as u64 + 1).unwrap();
            role.set_weight(*weight);
            std::sync::Arc::new(role)
        }));

        let expected = weights.iter().copied().fold(0, i32::max);
        prop_assert_eq!(user.role_weight(), expected);

        user.set_super_user(true);
        prop_assert_eq!(user.role_weight(), User::SUPER_USER_WEIGHT);
    }
}
