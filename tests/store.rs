use klaxon::error::Error;
use klaxon::store::{SqliteStore, Store};
use klaxon::types::*;
use tempfile::TempDir;

fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = SqliteStore::new(dir.path().join("test.db")).expect("open store");
    store.initialize().expect("initialize schema");
    (dir, store)
}

fn make_user(store: &SqliteStore, name: &str) -> User {
    let user = User::new(name, "$argon2id$fake$hash");
    store.create_user(&user).expect("create user");
    user
}

fn make_page(store: &SqliteStore, owner: &User, name: &str) -> Page {
    let page = Page::new(name, owner.id.clone());
    store.create_page(&page).expect("create page");
    page
}

fn make_alarm(store: &SqliteStore, page: &Page, creator: &User) -> Alarm {
    let alarm = Alarm {
        id: uuid::Uuid::new_v4().to_string(),
        page_id: page.id.clone(),
        ticker: "EUR/USD".into(),
        option: "spot".into(),
        condition: "above".into(),
        strategy_id: None,
        strategy_name: None,
        created_by: creator.id.clone(),
        active: true,
        created_at: chrono::Utc::now(),
        last_triggered: None,
    };
    store.create_alarm(&alarm).expect("create alarm");
    alarm
}

fn grant(store: &SqliteStore, page: &Page, subject: Subject, view: bool, edit: bool) {
    store
        .upsert_permission(&PagePermission {
            page_id: page.id.clone(),
            subject,
            can_view: view,
            can_edit: edit,
        })
        .expect("upsert permission");
}

#[test]
fn test_duplicate_username_rejected() {
    let (_dir, store) = open_store();
    make_user(&store, "alice");

    let dup = User::new("alice", "other-hash");
    assert!(matches!(
        store.create_user(&dup),
        Err(Error::UsernameTaken)
    ));
}

#[test]
fn test_find_user_by_username_returns_hash() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");

    let found = store
        .find_user_by_username("alice")
        .unwrap()
        .expect("alice exists");
    assert_eq!(found.id, alice.id);
    assert_eq!(found.password_hash, alice.password_hash);

    assert!(store.find_user_by_username("nobody").unwrap().is_none());
}

#[test]
fn test_create_group_enrolls_creator() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");

    let group = Group::new("traders");
    store.create_group(&group, &alice.id).unwrap();

    assert!(store.is_member(&group.id, &alice.id).unwrap());
    assert!(store.list_groups_of_user(&alice.id).unwrap().contains(&group.id));
}

#[test]
fn test_duplicate_group_name_rejected() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");

    store.create_group(&Group::new("traders"), &alice.id).unwrap();
    assert!(matches!(
        store.create_group(&Group::new("traders"), &alice.id),
        Err(Error::GroupNameTaken)
    ));
}

#[test]
fn test_membership_errors() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");

    let group = Group::new("traders");
    store.create_group(&group, &alice.id).unwrap();

    store.add_member(&group.id, &bob.id).unwrap();
    assert!(matches!(
        store.add_member(&group.id, &bob.id),
        Err(Error::AlreadyMember)
    ));
    assert!(matches!(
        store.add_member("missing-group", &bob.id),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        store.add_member(&group.id, "missing-user"),
        Err(Error::NotFound(_))
    ));

    store.remove_member(&group.id, &bob.id).unwrap();
    assert!(!store.is_member(&group.id, &bob.id).unwrap());
    assert!(matches!(
        store.remove_member(&group.id, &bob.id),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_visibility_owner_and_stranger() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    let visible = store.list_pages_visible_to(&alice.id).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].page.id, page.id);
    assert!(visible[0].is_owner);
    assert!(visible[0].can_edit);

    assert!(store.list_pages_visible_to(&bob.id).unwrap().is_empty());
}

#[test]
fn test_visibility_direct_grant() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    grant(&store, &page, Subject::user(bob.id.clone()), true, false);

    let visible = store.list_pages_visible_to(&bob.id).unwrap();
    assert_eq!(visible.len(), 1);
    assert!(!visible[0].is_owner);
    assert!(!visible[0].can_edit);
}

#[test]
fn test_visibility_through_group() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    let group = Group::new("traders");
    store.create_group(&group, &alice.id).unwrap();
    store.add_member(&group.id, &bob.id).unwrap();
    grant(&store, &page, Subject::group(group.id.clone()), true, true);

    let visible = store.list_pages_visible_to(&bob.id).unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].can_edit);
}

#[test]
fn test_visibility_edit_only_row_implies_view() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    grant(&store, &page, Subject::user(bob.id.clone()), false, true);

    let visible = store.list_pages_visible_to(&bob.id).unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].can_edit);
}

#[test]
fn test_upsert_permission_rejects_owner_and_unknowns() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let page = make_page(&store, &alice, "Trading");

    let owner_row = PagePermission {
        page_id: page.id.clone(),
        subject: Subject::user(alice.id.clone()),
        can_view: true,
        can_edit: false,
    };
    assert!(matches!(
        store.upsert_permission(&owner_row),
        Err(Error::OwnerGrant)
    ));

    let ghost = PagePermission {
        page_id: page.id.clone(),
        subject: Subject::user("ghost"),
        can_view: true,
        can_edit: false,
    };
    assert!(matches!(
        store.upsert_permission(&ghost),
        Err(Error::InvalidSubject)
    ));

    let missing_page = PagePermission {
        page_id: "missing".into(),
        subject: Subject::user(alice.id.clone()),
        can_view: true,
        can_edit: false,
    };
    assert!(matches!(
        store.upsert_permission(&missing_page),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_upsert_replaces_existing_row() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    grant(&store, &page, Subject::user(bob.id.clone()), true, false);
    grant(&store, &page, Subject::user(bob.id.clone()), true, true);

    let rows = store.list_permissions(&page.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].can_edit);
}

#[test]
fn test_delete_permission() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");

    let subject = Subject::user(bob.id.clone());
    grant(&store, &page, subject.clone(), true, false);

    assert!(store.delete_permission(&page.id, &subject).unwrap());
    assert!(!store.delete_permission(&page.id, &subject).unwrap());
    assert!(store.list_permissions(&page.id).unwrap().is_empty());
}

#[test]
fn test_list_pages_granted_to_subject() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let p1 = make_page(&store, &alice, "One");
    let p2 = make_page(&store, &alice, "Two");

    let group = Group::new("traders");
    store.create_group(&group, &alice.id).unwrap();
    let subject = Subject::group(group.id.clone());
    grant(&store, &p1, subject.clone(), true, false);
    grant(&store, &p2, subject.clone(), false, true);

    let mut ids: Vec<String> = store
        .list_pages_granted_to(&subject)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    ids.sort();
    let mut expected = vec![p1.id, p2.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn test_create_alarm_requires_page() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");

    let orphan = Alarm {
        id: uuid::Uuid::new_v4().to_string(),
        page_id: "missing".into(),
        ticker: "EUR/USD".into(),
        option: "spot".into(),
        condition: "above".into(),
        strategy_id: None,
        strategy_name: None,
        created_by: alice.id.clone(),
        active: true,
        created_at: chrono::Utc::now(),
        last_triggered: None,
    };
    assert!(matches!(
        store.create_alarm(&orphan),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_update_alarm_patch_semantics() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let page = make_page(&store, &alice, "Trading");
    let alarm = make_alarm(&store, &page, &alice);

    let patch = AlarmPatch {
        ticker: Some("GBP/USD".into()),
        active: Some(false),
        ..Default::default()
    };
    let updated = store.update_alarm(&alarm.id, &patch).unwrap().unwrap();
    assert_eq!(updated.ticker, "GBP/USD");
    assert!(!updated.active);
    // Untouched fields survive.
    assert_eq!(updated.option, "spot");
    assert_eq!(updated.condition, "above");
    assert_eq!(updated.page_id, page.id);

    // An empty patch is a no-op returning the current row.
    let unchanged = store
        .update_alarm(&alarm.id, &AlarmPatch::default())
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.ticker, "GBP/USD");
    assert!(!unchanged.active);

    assert!(store
        .update_alarm("missing", &AlarmPatch::default())
        .unwrap()
        .is_none());
}

#[test]
fn test_delete_alarm_returns_page_id() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let page = make_page(&store, &alice, "Trading");
    let alarm = make_alarm(&store, &page, &alice);

    assert_eq!(
        store.delete_alarm(&alarm.id).unwrap().as_deref(),
        Some(page.id.as_str())
    );
    assert!(store.get_alarm(&alarm.id).unwrap().is_none());
    assert!(store.delete_alarm(&alarm.id).unwrap().is_none());
}

#[test]
fn test_trigger_alarm_appends_event_and_stamps() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let page = make_page(&store, &alice, "Trading");
    let alarm = make_alarm(&store, &page, &alice);
    assert!(alarm.last_triggered.is_none());

    let (triggered, event) = store
        .trigger_alarm(&alarm.id, &bob.id, Some(1.085))
        .unwrap()
        .unwrap();
    assert!(triggered.last_triggered.is_some());
    assert_eq!(event.triggered_by, bob.id);
    assert_eq!(event.price, Some(1.085));

    store.trigger_alarm(&alarm.id, &alice.id, None).unwrap().unwrap();

    // Every trigger call appends another event.
    let events = store.list_alarm_events(&alarm.id, 100).unwrap();
    assert_eq!(events.len(), 2);

    let limited = store.list_alarm_events(&alarm.id, 1).unwrap();
    assert_eq!(limited.len(), 1);

    assert!(store.trigger_alarm("missing", &bob.id, None).unwrap().is_none());
}

#[test]
fn test_list_alarms_in_pages() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let p1 = make_page(&store, &alice, "One");
    let p2 = make_page(&store, &alice, "Two");
    let p3 = make_page(&store, &alice, "Three");
    make_alarm(&store, &p1, &alice);
    make_alarm(&store, &p2, &alice);
    make_alarm(&store, &p3, &alice);

    let alarms = store
        .list_alarms_in_pages(&[p1.id.clone(), p2.id.clone()])
        .unwrap();
    assert_eq!(alarms.len(), 2);
    assert!(alarms.iter().all(|a| a.page_id != p3.id));

    assert!(store.list_alarms_in_pages(&[]).unwrap().is_empty());
}

#[test]
fn test_audience_unions_all_paths() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let charlie = make_user(&store, "charlie");
    let dave = make_user(&store, "dave");
    let page = make_page(&store, &alice, "Trading");

    // Owner only at first.
    let audience = store.users_with_view_access(&page.id).unwrap();
    assert_eq!(audience.len(), 1);
    assert!(audience.contains(&alice.id));

    // Direct grant, plus a group grant reaching charlie, plus an
    // edit-only direct row for dave.
    grant(&store, &page, Subject::user(bob.id.clone()), true, false);
    let group = Group::new("traders");
    store.create_group(&group, &charlie.id).unwrap();
    grant(&store, &page, Subject::group(group.id.clone()), true, false);
    grant(&store, &page, Subject::user(dave.id.clone()), false, true);

    let audience = store.users_with_view_access(&page.id).unwrap();
    assert_eq!(audience.len(), 4);
    for id in [&alice.id, &bob.id, &charlie.id, &dave.id] {
        assert!(audience.contains(id));
    }

    // A user in the audience through two paths appears once: the set
    // abstraction handles it.
    store.add_member(&group.id, &bob.id).unwrap();
    assert_eq!(store.users_with_view_access(&page.id).unwrap().len(), 4);

    assert!(store.users_with_view_access("missing").unwrap().is_empty());
}

// The pure resolver and the audience SQL must agree: a user resolves to
// view exactly when the audience query includes them.
#[test]
fn test_resolver_agrees_with_audience_query() {
    let (_dir, store) = open_store();
    let alice = make_user(&store, "alice");
    let bob = make_user(&store, "bob");
    let charlie = make_user(&store, "charlie");
    let dave = make_user(&store, "dave");
    let page = make_page(&store, &alice, "Trading");

    let group = Group::new("traders");
    store.create_group(&group, &charlie.id).unwrap();
    grant(&store, &page, Subject::user(bob.id.clone()), true, false);
    grant(&store, &page, Subject::group(group.id.clone()), false, true);

    let audience = store.users_with_view_access(&page.id).unwrap();
    let grants = store.list_permissions(&page.id).unwrap();

    for user in [&alice, &bob, &charlie, &dave] {
        let groups = store.list_groups_of_user(&user.id).unwrap();
        let access = klaxon::authz::resolve(&user.id, &page, &grants, &groups);
        assert_eq!(
            access.view,
            audience.contains(&user.id),
            "disagreement for {}",
            user.username
        );
    }
}
