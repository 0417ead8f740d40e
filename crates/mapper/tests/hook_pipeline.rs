mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{blog, blog_with, seed, user};
use elif_mapper::{
    row, HookError, HookOutcome, ModelError, PostHook, PreHook, QueryKind,
};
use serde_json::json;

type Events = Arc<Mutex<Vec<String>>>;

fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(events: &Events, event: &str) {
    events.lock().unwrap().push(event.to_string());
}

fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

#[tokio::test]
async fn test_core_waits_for_sync_and_async_pre_hooks() {
    let log = events();
    let (p1, p2, p3, core) = (log.clone(), log.clone(), log.clone(), log.clone());

    let blog = blog_with(move |users| {
        users
            .before(
                "creating",
                PreHook::sync(move |_| {
                    push(&p1, "p1");
                    Ok(())
                }),
            )
            .before(
                "creating",
                PreHook::detached(move |_| {
                    let p2 = p2.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        push(&p2, "p2");
                        Ok::<(), HookError>(())
                    }
                }),
            )
            .before(
                "creating",
                PreHook::sync(move |_| {
                    push(&p3, "p3");
                    Ok(())
                }),
            )
            .after(
                "created",
                PostHook::sync(move |_, _| {
                    push(&core, "created");
                    Ok(())
                }),
            )
    });

    let users = blog.mapper("users");
    users.create(row([("name", "Ada")])).await.unwrap();

    let seen = snapshot(&log);
    assert_eq!(seen, vec!["p1", "p3", "p2", "created"]);
    assert_eq!(blog.executor.count_of(QueryKind::Insert), 1);
}

#[tokio::test]
async fn test_deferred_hook_lets_next_hook_start_before_completing() {
    let log = events();
    let (deferred, next) = (log.clone(), log.clone());

    let blog = blog_with(move |users| {
        users
            .before(
                "creating",
                PreHook::deferred(move |_, mut continuation| {
                    let deferred = deferred.clone();
                    tokio::spawn(async move {
                        push(&deferred, "proceed");
                        continuation.proceed();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        push(&deferred, "done");
                        continuation.complete(Ok(()));
                    });
                }),
            )
            .before(
                "creating",
                PreHook::sync(move |_| {
                    push(&next, "next");
                    Ok(())
                }),
            )
    });

    blog.mapper("users")
        .create(row([("name", "Ada")]))
        .await
        .unwrap();

    assert_eq!(snapshot(&log), vec!["proceed", "next", "done"]);
}

#[tokio::test]
async fn test_failing_pre_hook_skips_core_and_post_hooks() {
    let log = events();
    let post = log.clone();

    let blog = blog_with(move |users| {
        users
            .before(
                "creating",
                PreHook::sync(|_| Err(HookError::validation_with_hint("name taken", "pick another"))),
            )
            .after(
                "created",
                PostHook::sync(move |_, _| {
                    push(&post, "created");
                    Ok(())
                }),
            )
    });

    let users = blog.mapper("users");
    let mut record = users.new_instance(row([("name", "Ada")]), false);
    let err = record.save().await.unwrap_err();

    assert_eq!(
        err,
        ModelError::Hook(HookError::validation_with_hint("name taken", "pick another"))
    );
    assert_eq!(blog.executor.count_of(QueryKind::Insert), 0);
    assert!(snapshot(&log).is_empty());
    assert!(!record.exists());
    assert_eq!(record.get("name"), Some(&json!("Ada")));
    assert!(record.is_dirty());
}

#[tokio::test]
async fn test_failing_async_pre_hook_propagates_its_error() {
    let blog = blog_with(|users| {
        users.before(
            "deleting",
            PreHook::detached(|_| async { Err::<(), _>(HookError::rejected("protected")) }),
        )
    });
    seed(&blog, "users", vec![user(1, "Ada")]);

    let users = blog.mapper("users");
    let mut record = users.find(1, &[]).await.unwrap();
    let err = record.destroy().await.unwrap_err();

    assert_eq!(err.as_hook_error(), Some(&HookError::rejected("protected")));
    assert_eq!(blog.executor.count_of(QueryKind::Delete), 0);
    assert!(!record.is_destroyed());
}

#[tokio::test]
async fn test_post_hook_failure_keeps_completed_write() {
    let blog = blog_with(|users| {
        users.after(
            "created",
            PostHook::sync(|_, _| Err(HookError::failed("mailer down"))),
        )
    });

    let users = blog.mapper("users");
    let mut record = users.new_instance(row([("name", "Ada")]), false);
    let err = record.save().await.unwrap_err();

    assert_eq!(err, ModelError::Hook(HookError::failed("mailer down")));
    assert_eq!(blog.executor.rows("users").len(), 1);
    assert!(record.exists());
    assert_eq!(record.key(), Some(&json!(1)));
}

#[tokio::test]
async fn test_post_hooks_see_the_outcome() {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let seen = outcomes.clone();

    let blog = blog_with(move |users| {
        users.after(
            "saved",
            PostHook::sync(move |_, outcome| {
                seen.lock().unwrap().push(outcome.clone());
                Ok(())
            }),
        )
    });

    let users = blog.mapper("users");
    let mut record = users.create(row([("name", "Ada")])).await.unwrap();
    record.set("name", "Grace").unwrap();
    record.save().await.unwrap();

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![
            HookOutcome::Inserted { key: Some(json!(1)) },
            HookOutcome::Updated { affected: 1 },
        ]
    );
}

#[tokio::test]
async fn test_derived_mapper_hooks_do_not_leak_to_base() {
    let log = events();
    let derived_log = log.clone();

    let blog = blog();
    let users = blog.mapper("users");
    let admins = users
        .extend("admins")
        .before(
            "creating",
            PreHook::sync(move |ctx| {
                push(&derived_log, "admin creating");
                ctx.set("admin", true).map_err(HookError::from)?;
                Ok(())
            }),
        )
        .register(&blog.registry)
        .unwrap();

    let plain = users.create(row([("name", "Ada")])).await.unwrap();
    assert!(snapshot(&log).is_empty());
    assert_eq!(plain.get("admin"), None);

    let admin = admins.create(row([("name", "Grace")])).await.unwrap();
    assert_eq!(snapshot(&log), vec!["admin creating"]);
    assert_eq!(admin.get("admin"), Some(&json!(true)));
    assert_eq!(users.hooks().hook_count(), 0);
}

#[tokio::test]
async fn test_update_hooks_wrap_only_updates() {
    let log = events();
    let (updating, creating) = (log.clone(), log.clone());

    let blog = blog_with(move |users| {
        users
            .before(
                "updating",
                PreHook::sync(move |_| {
                    push(&updating, "updating");
                    Ok(())
                }),
            )
            .before(
                "creating",
                PreHook::sync(move |_| {
                    push(&creating, "creating");
                    Ok(())
                }),
            )
    });
    seed(&blog, "users", vec![user(1, "Ada")]);

    let mut record = blog.mapper("users").find(1, &[]).await.unwrap();
    record.set("name", "Grace").unwrap();
    record.save().await.unwrap();

    assert_eq!(snapshot(&log), vec!["updating"]);
}
