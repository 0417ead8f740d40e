mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{blog, comment, post, seed, user, Blog};
use elif_mapper::{
    key_string, row, MapperBuilder, MapperConfig, MapperRegistry, MemoryExecutor, ModelError,
    PivotConfig, QueryKind, Related, RelationDescriptor, RelationState, Row, SyncChanges,
};
use serde_json::json;

fn pivot(user_id: i64, role_id: i64, granted_by: &str) -> Row {
    row([
        ("user_id", json!(user_id)),
        ("role_id", json!(role_id)),
        ("granted_by", json!(granted_by)),
    ])
}

fn role_ids(blog: &Blog, user_id: i64) -> BTreeSet<String> {
    blog.executor
        .rows("role_user")
        .iter()
        .filter(|r| r.get("user_id") == Some(&json!(user_id)))
        .filter_map(|r| r.get("role_id").and_then(key_string))
        .collect()
}

fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn roles_blog() -> Blog {
    let blog = blog();
    seed(&blog, "users", vec![user(1, "Ada"), user(2, "Grace")]);
    seed(
        &blog,
        "roles",
        (1..=4)
            .map(|i| row([("id", json!(i)), ("name", json!(format!("role{}", i)))]))
            .collect(),
    );
    seed(
        &blog,
        "role_user",
        vec![
            pivot(1, 1, "root"),
            pivot(1, 2, "root"),
            pivot(1, 3, "ops"),
            pivot(2, 3, "ops"),
        ],
    );
    blog
}

#[tokio::test]
async fn test_sync_detaches_removed_and_attaches_added() {
    let blog = roles_blog();
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();
    let roles = ada.relation("roles").unwrap();
    blog.executor.clear_log();

    let changes = roles.sync([2, 3, 4]).await.unwrap();

    assert_eq!(
        changes,
        SyncChanges {
            attached: vec![json!(4)],
            detached: vec![json!(1)],
        }
    );
    assert_eq!(blog.executor.count_of(QueryKind::Delete), 1);
    assert_eq!(blog.executor.count_of(QueryKind::Insert), 1);
    assert_eq!(
        role_ids(&blog, 1),
        ids(&["2", "3", "4"])
    );
    assert_eq!(role_ids(&blog, 2), ids(&["3"]));
}

#[tokio::test]
async fn test_sync_with_current_set_changes_nothing() {
    let blog = roles_blog();
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();
    blog.executor.clear_log();

    let changes = ada.relation("roles").unwrap().sync(["1", "2", "3"]).await.unwrap();
    assert!(changes.is_empty());
    assert_eq!(blog.executor.count_of(QueryKind::Delete), 0);
    assert_eq!(blog.executor.count_of(QueryKind::Insert), 0);
}

#[tokio::test]
async fn test_sync_is_not_atomic() {
    let blog = roles_blog();
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();
    blog.executor.fail_next_of(QueryKind::Insert, "pivot insert failed");

    let err = ada.relation("roles").unwrap().sync([2, 3, 4]).await.unwrap_err();

    assert_eq!(err, ModelError::Database("pivot insert failed".to_string()));
    assert_eq!(
        role_ids(&blog, 1),
        ids(&["2", "3"])
    );
}

#[tokio::test]
async fn test_attach_and_detach() {
    let blog = roles_blog();
    let grace = blog.mapper("users").find(2, &[]).await.unwrap();
    let roles = grace.relation("roles").unwrap();

    assert_eq!(roles.attach([1, 2]).await.unwrap(), 2);
    assert_eq!(roles.detach([3]).await.unwrap(), 1);

    blog.executor.clear_log();
    assert_eq!(roles.detach(Vec::<i64>::new()).await.unwrap(), 0);
    assert_eq!(blog.executor.query_count(), 0);

    assert_eq!(
        role_ids(&blog, 2),
        ids(&["1", "2"])
    );
    assert_eq!(roles.detach_all().await.unwrap(), 2);
    assert!(role_ids(&blog, 2).is_empty());
}

#[tokio::test]
async fn test_with_pivot_nests_pivot_columns() {
    let blog = roles_blog();
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();

    let mut roles = ada.relation("roles").unwrap().with_pivot(&["granted_by"]).unwrap();
    let loaded = roles.load().await.unwrap();
    assert_eq!(roles.state(), RelationState::Resolved);

    let records = loaded.as_many();
    assert_eq!(records.len(), 3);
    for role in records {
        let pivot = role.pivot().unwrap();
        assert_eq!(pivot.source, "role_user");
        assert_eq!(pivot.get("user_id"), Some(&json!(1)));
        assert_eq!(pivot.get("role_id"), role.get("id"));
        assert!(pivot.get("granted_by").is_some());
        assert_eq!(role.get("granted_by"), None);
        assert!(role.attributes().iter().all(|(k, _)| !k.starts_with("_pivot_")));
    }
}

#[tokio::test]
async fn test_update_pivot_changes_one_row() {
    let blog = roles_blog();
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();

    let affected = ada
        .relation("roles")
        .unwrap()
        .update_pivot(2, row([("granted_by", "admin")]))
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let granted: Vec<_> = blog
        .executor
        .rows("role_user")
        .into_iter()
        .filter(|r| r.get("granted_by") == Some(&json!("admin")))
        .collect();
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].get("role_id"), Some(&json!(2)));
}

#[tokio::test]
async fn test_eager_pivot_load_groups_by_parent() {
    let blog = roles_blog();
    blog.executor.clear_log();
    let users = blog.mapper("users").all(&["roles"]).await.unwrap();
    assert_eq!(blog.executor.query_count(), 2);

    for user in &users {
        let expected = if user.key() == Some(&json!(1)) { 3 } else { 1 };
        assert_eq!(user.related_many("roles").len(), expected);
    }
}

#[tokio::test]
async fn test_morph_to_many_keeps_owner_types_apart() {
    let blog = blog();
    seed(&blog, "users", vec![user(1, "Ada")]);
    seed(&blog, "posts", vec![post(1, 1, "p1")]);
    seed(&blog, "videos", vec![row([("id", json!(1)), ("title", json!("v1"))])]);
    seed(
        &blog,
        "tags",
        (1..=3)
            .map(|i| row([("id", json!(i)), ("name", json!(format!("tag{}", i)))]))
            .collect(),
    );
    let tagging = |tag: i64, kind: &str| {
        row([
            ("tag_id", json!(tag)),
            ("taggable_id", json!(1)),
            ("taggable_type", json!(kind)),
        ])
    };
    seed(
        &blog,
        "taggables",
        vec![tagging(1, "posts"), tagging(2, "posts"), tagging(2, "videos")],
    );

    let post = blog.mapper("posts").find(1, &[]).await.unwrap();
    post.relation("tags").unwrap().attach([3]).await.unwrap();
    let stored = blog.executor.rows("taggables");
    assert_eq!(stored.last().and_then(|r| r.get("taggable_type")), Some(&json!("posts")));

    let post = blog.mapper("posts").find(1, &["tags"]).await.unwrap();
    let video = blog.mapper("videos").find(1, &["tags"]).await.unwrap();
    assert_eq!(post.related_many("tags").len(), 3);
    assert_eq!(video.related_many("tags").len(), 1);
    assert_eq!(
        video.related_many("tags")[0].get("name"),
        Some(&json!("tag2"))
    );
}

#[tokio::test]
async fn test_associate_and_dissociate() {
    let blog = blog();
    seed(&blog, "users", vec![user(7, "Ada")]);
    let users = blog.mapper("users");
    let posts = blog.mapper("posts");

    let ada = users.find(7, &[]).await.unwrap();
    let mut draft = posts.new_instance(row([("title", "draft")]), false);
    let author = posts.get_relation("author").unwrap();

    author.associate(&mut draft, &ada).unwrap();
    assert_eq!(draft.get("user_id"), Some(&json!(7)));
    assert_eq!(draft.related_one("author").and_then(|a| a.key()), Some(&json!(7)));

    draft.save().await.unwrap();
    let stored = posts.find(draft.key().cloned().unwrap(), &["author"]).await.unwrap();
    assert_eq!(
        stored.related_one("author").and_then(|a| a.get("name")),
        Some(&json!("Ada"))
    );

    let mut stored = stored;
    author.dissociate(&mut stored).unwrap();
    assert_eq!(stored.get("user_id"), Some(&json!(null)));
    assert!(matches!(stored.related("author"), Some(Related::One(None))));
    assert_eq!(stored.dirty_fields(), vec!["user_id".to_string()]);
}

#[tokio::test]
async fn test_morph_to_associate_writes_discriminator() {
    let blog = blog();
    seed(&blog, "videos", vec![row([("id", json!(3)), ("title", json!("v"))])]);
    let video = blog.mapper("videos").find(3, &[]).await.unwrap();
    let comments = blog.mapper("comments");

    let mut note = comments.new_instance(row([("body", "nice")]), false);
    comments
        .get_relation("commentable")
        .unwrap()
        .associate(&mut note, &video)
        .unwrap();

    assert_eq!(note.get("commentable_type"), Some(&json!("videos")));
    assert_eq!(note.get("commentable_id"), Some(&json!(3)));

    let err = comments
        .get_relation("commentable")
        .unwrap()
        .associate(&mut note, &comments.new_instance(row([("id", json!(1))]), true))
        .unwrap_err();
    assert!(matches!(err, ModelError::RelationConfiguration(_)));
}

#[tokio::test]
async fn test_has_many_create_and_save_preset_foreign_key() {
    let blog = blog();
    seed(&blog, "users", vec![user(1, "Ada")]);
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();
    let posts = ada.relation("posts").unwrap();

    let created = posts.create(row([("title", "first")])).await.unwrap();
    assert!(created.exists());
    assert_eq!(created.get("user_id"), Some(&json!(1)));

    let mut second = blog.mapper("posts").new_instance(row([("title", "second")]), false);
    posts.save(&mut second).await.unwrap();
    assert_eq!(second.get("user_id"), Some(&json!(1)));

    let reloaded = blog.mapper("users").find(1, &["posts"]).await.unwrap();
    assert_eq!(reloaded.related_many("posts").len(), 2);
}

#[tokio::test]
async fn test_morph_many_create_sets_type_and_id() {
    let blog = blog();
    seed(&blog, "posts", vec![post(4, 1, "p")]);
    let p = blog.mapper("posts").find(4, &[]).await.unwrap();

    let created = p
        .relation("comments")
        .unwrap()
        .create(row([("body", "hello")]))
        .await
        .unwrap();
    assert_eq!(created.get("commentable_type"), Some(&json!("posts")));
    assert_eq!(created.get("commentable_id"), Some(&json!(4)));
}

#[tokio::test]
async fn test_relation_state_machine_is_enforced() {
    let blog = blog();
    seed(&blog, "users", vec![user(1, "Ada")]);
    seed(&blog, "comments", vec![comment(1, "users", 1, "hi")]);
    let users = blog.mapper("users");

    let mut unconstrained = users.get_relation("posts").unwrap();
    assert_eq!(unconstrained.state(), RelationState::Unconstrained);
    assert!(matches!(
        unconstrained.get_results().await,
        Err(ModelError::Relationship(_))
    ));

    let ada = users.find(1, &[]).await.unwrap();
    let mut comments = ada.relation("comments").unwrap();
    let loaded = comments.load().await.unwrap();
    assert_eq!(loaded.as_many().len(), 1);
    assert!(matches!(comments.load().await, Err(ModelError::Relationship(_))));

    let err = ada.relation("posts").unwrap().attach([1]).await.unwrap_err();
    assert!(matches!(err, ModelError::Relationship(_)));
}

#[tokio::test]
async fn test_constrain_adds_caller_conditions() {
    let blog = blog();
    seed(&blog, "users", vec![user(1, "Ada")]);
    seed(&blog, "posts", vec![post(1, 1, "keep"), post(2, 1, "drop")]);
    let ada = blog.mapper("users").find(1, &[]).await.unwrap();

    let mut posts = ada
        .relation("posts")
        .unwrap()
        .constrain(|q| q.where_eq("title", "keep"))
        .unwrap();
    let loaded = posts.load().await.unwrap();
    assert_eq!(loaded.as_many().len(), 1);
    assert_eq!(loaded.as_many()[0].get("id"), Some(&json!(1)));
}

#[tokio::test]
async fn test_pivot_keys_follow_mapper_primary_keys() {
    let executor = Arc::new(MemoryExecutor::new());
    executor.create_table("members", "uuid");
    executor.create_table("badges", "code");
    executor.create_keyless_table("badge_member");
    executor
        .seed("members", vec![row([("uuid", json!("m-1")), ("name", json!("Ada"))])])
        .unwrap();
    executor
        .seed(
            "badges",
            vec![
                row([("code", json!("gold")), ("label", json!("Gold"))]),
                row([("code", json!("iron")), ("label", json!("Iron"))]),
            ],
        )
        .unwrap();

    let registry = MapperRegistry::new();
    let members = MapperBuilder::new("members")
        .config(MapperConfig {
            primary_key: "uuid".to_string(),
            ..MapperConfig::default()
        })
        .executor(executor.clone())
        .relation(RelationDescriptor::belongs_to_many(
            "badges",
            "badges",
            PivotConfig::new("badge_member", "member_uuid", "badge_code"),
        ))
        .register(&registry)
        .unwrap();
    MapperBuilder::new("badges")
        .primary_key("code")
        .executor(executor.clone())
        .register(&registry)
        .unwrap();

    let ada = members.find("m-1", &[]).await.unwrap();
    ada.relation("badges").unwrap().attach(["gold"]).await.unwrap();
    assert_eq!(
        executor.rows("badge_member"),
        vec![row([("member_uuid", json!("m-1")), ("badge_code", json!("gold"))])]
    );

    let ada = members.find("m-1", &["badges"]).await.unwrap();
    let labels: Vec<_> = ada
        .related_many("badges")
        .iter()
        .map(|b| b.get("label").cloned())
        .collect();
    assert_eq!(labels, vec![Some(json!("Gold"))]);
}
