//! Integration tests for the security model.

use security_model::{
    Error, FilterOptions, GenericSecurityModel, GlobPathMatcher, ModelConfig, Role, User,
    XmlStore,
};
use serde_json::json;
use std::sync::Arc;

fn saved_user(model: &mut GenericSecurityModel<XmlStore>, username: &str) -> User {
    let mut user = User::with_credentials(username, "secret");
    model.save_user(&mut user).unwrap();
    user
}

fn saved_role(model: &mut GenericSecurityModel, name: &str, weight: i32) -> Arc<Role> {
    let mut role = Role::named(name);
    role.set_weight(weight);
    model.save_role(&mut role).unwrap();
    model.role_by_id(role.id().unwrap()).unwrap().unwrap()
}

#[test]
fn test_basic_role_assignment_and_permission_check() {
    let mut model = GenericSecurityModel::new();
    model.add_permission("article.edit").unwrap();
    model.add_permission("article.view").unwrap();

    let editor = saved_role(&mut model, "editor", 10);
    model
        .set_granted_permissions_to_role(&editor, ["article.edit"])
        .unwrap();

    let mut alice = User::with_credentials("alice", "secret");
    model.save_user(&mut alice).unwrap();
    let editor = model.role_by_name("editor").unwrap().unwrap();
    model.set_roles_to_user(&alice, &[editor]).unwrap();

    let alice = model.user_by_username("alice").unwrap().unwrap();
    assert!(alice.is_permission_granted("article.edit"));
    assert!(!alice.is_permission_granted("article.view"));
}

#[test]
fn test_unregistered_permissions_are_dropped() {
    let mut model = GenericSecurityModel::new();
    model.add_permission("edit").unwrap();

    let role = saved_role(&mut model, "editor", 1);
    model
        .set_granted_permissions_to_role(&role, ["edit", "view"])
        .unwrap();

    let role = model.role_by_id(role.id().unwrap()).unwrap().unwrap();
    let codes: Vec<&str> = role.permissions().iter().map(|p| p.code()).collect();
    assert_eq!(codes, vec!["edit"]);
}

#[test]
fn test_username_lookup_and_conflicts() {
    let mut model = GenericSecurityModel::new();

    let mut alice = User::with_credentials("Alice", "secret");
    alice.set_email(Some("alice@example.com".to_string()));
    model.save_user(&mut alice).unwrap();

    assert_eq!(
        model.user_by_username("alice").unwrap().unwrap().id(),
        alice.id()
    );

    let mut duplicate = User::with_credentials("alice", "secret");
    assert!(matches!(
        model.save_user(&mut duplicate),
        Err(Error::UsernameExists(_))
    ));

    let mut bob = User::with_credentials("bob", "secret");
    bob.set_email(Some("ALICE@example.com".to_string()));
    assert!(matches!(
        model.save_user(&mut bob),
        Err(Error::EmailExists(_))
    ));

    // Saving the same user again is not a conflict
    alice.set_display_name("Alice Liddell");
    model.save_user(&mut alice).unwrap();
    assert_eq!(model.count_users(&FilterOptions::new()).unwrap(), 1);
}

#[test]
fn test_sequential_ids() {
    let mut model = GenericSecurityModel::new();

    let ids: Vec<u64> = ["alice", "bob", "carol"]
        .iter()
        .map(|name| {
            let mut user = User::with_credentials(*name, "secret");
            model.save_user(&mut user).unwrap();
            user.id().unwrap()
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let role = saved_role(&mut model, "editor", 1);
    assert_eq!(role.id(), Some(1));
}

#[test]
fn test_id_cannot_be_reassigned() {
    let mut user = User::new();
    user.set_id(7).unwrap();
    user.set_id(7).unwrap();
    assert!(matches!(
        user.set_id(8),
        Err(Error::IdAlreadySet {
            current: 7,
            requested: 8,
            ..
        })
    ));
}

#[test]
fn test_role_weight() {
    let mut model = GenericSecurityModel::new();
    let low = saved_role(&mut model, "low", 5);
    let high = saved_role(&mut model, "high", 20);

    let mut alice = User::with_credentials("alice", "secret");
    model.save_user(&mut alice).unwrap();
    model.set_roles_to_user(&alice, &[low, high]).unwrap();

    let mut alice = model.user_by_username("alice").unwrap().unwrap();
    assert_eq!(alice.role_weight(), 20);

    alice.set_super_user(true);
    assert_eq!(alice.role_weight(), User::SUPER_USER_WEIGHT);
    assert_eq!(User::new().role_weight(), 0);
}

#[test]
fn test_delete_nonexistent_user_is_noop() {
    let mut model = GenericSecurityModel::new();
    let mut alice = User::with_credentials("alice", "secret");
    model.save_user(&mut alice).unwrap();

    let mut ghost = User::with_credentials("ghost", "secret");
    ghost.set_id(999).unwrap();
    model.delete_user(&ghost).unwrap();

    assert_eq!(model.count_users(&FilterOptions::new()).unwrap(), 1);
}

#[test]
fn test_count_ignores_pagination() {
    let mut model = GenericSecurityModel::new();
    for name in ["alice", "alina", "bob"] {
        let mut user = User::with_credentials(name, "secret");
        model.save_user(&mut user).unwrap();
    }

    let query = FilterOptions::new().query("ali");
    assert_eq!(model.count_users(&query).unwrap(), 2);
    assert_eq!(
        model
            .count_users(&query.clone().limit(1).page(2))
            .unwrap(),
        2
    );

    let page: Vec<String> = model
        .users(&query.limit(1).page(2))
        .unwrap()
        .iter()
        .map(|user| user.username().to_string())
        .collect();
    assert_eq!(page, vec!["alina".to_string()]);
}

#[test]
fn test_role_listing() {
    let mut model = GenericSecurityModel::new();
    saved_role(&mut model, "editor", 1);
    saved_role(&mut model, "viewer", 1);
    saved_role(&mut model, "admin", 100);

    let filter = FilterOptions::new().name("e");
    assert_eq!(model.count_roles(&filter).unwrap(), 2);

    let names: Vec<String> = model
        .roles(&FilterOptions::new().limit(2))
        .unwrap()
        .iter()
        .map(|role| role.name().to_string())
        .collect();
    assert_eq!(names, vec!["editor".to_string(), "viewer".to_string()]);
}

#[test]
fn test_allowed_paths() {
    let mut model = GenericSecurityModel::new();
    let editor = saved_role(&mut model, "editor", 1);
    model
        .set_allowed_paths_to_role(
            &editor,
            &["/articles/**".to_string(), "[POST] /comments".to_string()],
        )
        .unwrap();

    let mut alice = User::with_credentials("alice", "secret");
    model.save_user(&mut alice).unwrap();
    let editor = model.role_by_name("editor").unwrap().unwrap();
    model.set_roles_to_user(&alice, &[editor]).unwrap();

    let alice = model.user_by_username("alice").unwrap().unwrap();
    let matcher = GlobPathMatcher::new();
    assert!(alice.is_path_allowed("/articles/3/edit", Some("GET"), &matcher));
    assert!(alice.is_path_allowed("/comments", Some("POST"), &matcher));
    assert!(!alice.is_path_allowed("/comments", Some("GET"), &matcher));
    assert!(!alice.is_path_allowed("/admin", None, &matcher));
}

#[test]
fn test_xml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("security.xml");

    {
        let mut model = GenericSecurityModel::with_store(XmlStore::new(&path), ModelConfig::default());
        model.add_permission("article.edit").unwrap();
        model
            .add_permission_with_description("article.view", "View articles")
            .unwrap();
        model
            .set_secured_paths(vec!["/admin/**".to_string()])
            .unwrap();

        for (name, weight) in [("R1", 1), ("R2", 2)] {
            let mut role = Role::named(name);
            role.set_weight(weight);
            model.save_role(&mut role).unwrap();
        }
        let r1 = model.role_by_name("R1").unwrap().unwrap();
        let r2 = model.role_by_name("R2").unwrap().unwrap();
        model
            .set_granted_permissions_to_role(&r1, ["article.edit", "article.view"])
            .unwrap();
        model
            .set_allowed_paths_to_role(&r2, &["/articles/*".to_string()])
            .unwrap();

        let mut alice = User::with_credentials("alice", "secret");
        alice.set_email(Some("alice@example.com".to_string()));
        alice.set_email_confirmed(true);
        alice.set_active(true);
        alice.set_preference("theme", json!("dark"));
        model.save_user(&mut alice).unwrap();

        let r1 = model.role_by_name("R1").unwrap().unwrap();
        let r2 = model.role_by_name("R2").unwrap().unwrap();
        model.set_roles_to_user(&alice, &[r1, r2]).unwrap();

        saved_user(&mut model, "bob");
    }

    let mut model = GenericSecurityModel::with_store(XmlStore::new(&path), ModelConfig::default());
    let alice = model.user_by_username("alice").unwrap().unwrap();

    assert_eq!(alice.id(), Some(1));
    assert_eq!(alice.password(), "secret");
    assert!(!alice.is_password_changed());
    assert_eq!(alice.email(), Some("alice@example.com"));
    assert!(alice.is_email_confirmed());
    assert!(alice.is_active());
    assert!(!alice.is_super_user());
    assert_eq!(alice.preference("theme"), Some(&json!("dark")));

    let roles: Vec<&str> = alice.roles().iter().map(|role| role.name()).collect();
    assert_eq!(roles, vec!["R1", "R2"]);
    assert_eq!(alice.role_weight(), 2);
    assert!(alice.is_permission_granted("article.view"));
    assert_eq!(alice.allowed_paths(), ["/articles/*"]);

    let view = model.permission("article.view").unwrap().unwrap();
    assert_eq!(view.description(), "View articles");
    assert_eq!(model.secured_paths().unwrap(), vec!["/admin/**".to_string()]);

    // Ids continue after the highest stored id
    let mut carol = User::with_credentials("carol", "secret");
    model.save_user(&mut carol).unwrap();
    assert_eq!(carol.id(), Some(3));
}

#[test]
fn test_xml_store_with_missing_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("security.xml");

    let mut model = GenericSecurityModel::with_store(XmlStore::new(&path), ModelConfig::default());
    assert!(model.ping());
    assert_eq!(model.count_users(&FilterOptions::new()).unwrap(), 0);
    assert!(!path.exists());

    model.add_permission("edit").unwrap();
    assert!(path.exists());
}
