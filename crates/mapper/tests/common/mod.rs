//! Shared fixtures: a small blog schema over the in-memory executor

#![allow(dead_code)]

use std::sync::Arc;

use elif_mapper::{
    row, FieldDef, FieldType, Mapper, MapperBuilder, MapperRegistry, MemoryExecutor, MorphConfig,
    PivotConfig, RelationDescriptor, Row,
};
use serde_json::json;

pub struct Blog {
    pub registry: MapperRegistry,
    pub executor: Arc<MemoryExecutor>,
}

impl Blog {
    pub fn mapper(&self, name: &str) -> Mapper {
        self.registry.get(name).expect("mapper is registered")
    }
}

pub fn tables() -> Arc<MemoryExecutor> {
    let executor = Arc::new(MemoryExecutor::new());
    for table in ["users", "posts", "profiles", "roles", "comments", "videos", "tags"] {
        executor.create_table(table, "id");
    }
    executor.create_keyless_table("role_user");
    executor.create_keyless_table("taggables");
    executor
}

/// Register every blog mapper; `customize` may add hooks to the users mapper
pub fn blog_with(customize: impl FnOnce(MapperBuilder) -> MapperBuilder) -> Blog {
    let executor = tables();
    let registry = MapperRegistry::new();

    let users = MapperBuilder::new("users")
        .executor(executor.clone())
        .field(FieldDef::new("name", FieldType::Text).max_length(32))
        .relation(RelationDescriptor::has_many("posts", "posts", "user_id", "id"))
        .relation(RelationDescriptor::has_one("profile", "profiles", "user_id", "id"))
        .relation(RelationDescriptor::belongs_to_many(
            "roles",
            "roles",
            PivotConfig::new("role_user", "user_id", "role_id"),
        ))
        .relation(RelationDescriptor::morph_many(
            "comments",
            "comments",
            MorphConfig::conventional("commentable", "users"),
            "id",
        ));
    customize(users).register(&registry).unwrap();

    MapperBuilder::new("posts")
        .executor(executor.clone())
        .relation(RelationDescriptor::belongs_to("author", "users", "user_id", "id"))
        .relation(RelationDescriptor::morph_many(
            "comments",
            "comments",
            MorphConfig::conventional("commentable", "posts"),
            "id",
        ))
        .relation(RelationDescriptor::morph_to_many(
            "tags",
            "tags",
            PivotConfig::new("taggables", "taggable_id", "tag_id"),
            MorphConfig::conventional("taggable", "posts"),
        ))
        .register(&registry)
        .unwrap();

    MapperBuilder::new("videos")
        .executor(executor.clone())
        .relation(RelationDescriptor::morph_many(
            "comments",
            "comments",
            MorphConfig::conventional("commentable", "videos"),
            "id",
        ))
        .relation(RelationDescriptor::morph_to_many(
            "tags",
            "tags",
            PivotConfig::new("taggables", "taggable_id", "tag_id"),
            MorphConfig::conventional("taggable", "videos"),
        ))
        .register(&registry)
        .unwrap();

    MapperBuilder::new("comments")
        .executor(executor.clone())
        .relation(RelationDescriptor::morph_to(
            "commentable",
            "commentable_type",
            "commentable_id",
            &[("posts", "posts"), ("videos", "videos"), ("users", "users")],
        ))
        .register(&registry)
        .unwrap();

    for name in ["profiles", "roles", "tags"] {
        MapperBuilder::new(name)
            .executor(executor.clone())
            .register(&registry)
            .unwrap();
    }

    Blog { registry, executor }
}

pub fn blog() -> Blog {
    blog_with(|users| users)
}

pub fn seed(blog: &Blog, table: &str, rows: Vec<Row>) {
    blog.executor.seed(table, rows).unwrap();
}

pub fn user(id: i64, name: &str) -> Row {
    row([("id", json!(id)), ("name", json!(name))])
}

pub fn post(id: i64, user_id: i64, title: &str) -> Row {
    row([("id", json!(id)), ("user_id", json!(user_id)), ("title", json!(title))])
}

pub fn comment(id: i64, commentable_type: &str, commentable_id: i64, body: &str) -> Row {
    row([
        ("id", json!(id)),
        ("commentable_type", json!(commentable_type)),
        ("commentable_id", json!(commentable_id)),
        ("body", json!(body)),
    ])
}
