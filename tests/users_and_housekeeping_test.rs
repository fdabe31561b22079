mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use central_stores::{
    entities::{
        department_request::Priority,
        notification,
        user::{Department, Role},
    },
    errors::ServiceError,
    services::{users::UserUpdate, workflow::NewRequest},
};
use chrono::{Duration, Utc};
use common::TestContext;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use uuid::Uuid;

async fn stored_notification(
    ctx: &TestContext,
    user_id: Uuid,
    title: &str,
    is_read: bool,
    age_days: i64,
) {
    notification::ActiveModel {
        user_id: Set(user_id),
        kind: Set("REMINDER".to_string()),
        title: Set(title.to_string()),
        message: Set("Stage overdue".to_string()),
        priority: Set("MEDIUM".to_string()),
        related_object_type: Set(None),
        related_object_id: Set(None),
        is_read: Set(is_read),
        created_at: Set(Utc::now() - Duration::days(age_days)),
        ..Default::default()
    }
    .insert(ctx.state.db.as_ref())
    .await
    .unwrap();
}

#[tokio::test]
async fn cleanup_drops_only_old_read_notifications() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    let owner = staff.stores_manager.id;
    stored_notification(&ctx, owner, "old read", true, 45).await;
    stored_notification(&ctx, owner, "old unread", false, 45).await;
    stored_notification(&ctx, owner, "recent read", true, 5).await;

    let deleted = ctx
        .state
        .notifications
        .cleanup_old_notifications(Utc::now())
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let mut left: Vec<String> = notification::Entity::find()
        .all(ctx.state.db.as_ref())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    left.sort();
    assert_eq!(left, vec!["old unread", "recent read"]);

    let again = ctx
        .state
        .notifications
        .cleanup_old_notifications(Utc::now())
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn users_are_listed_newest_first() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;

    let users = ctx.state.users.list_users().await.unwrap();
    assert_eq!(users.len(), 5);
    assert_eq!(users[0].id, staff.admin.id);
    assert_eq!(users[4].id, staff.dean.id);
}

#[tokio::test]
async fn partial_user_update_keeps_other_fields() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;

    let updated = ctx
        .state
        .users
        .update_user(
            staff.procurement.id,
            UserUpdate {
                role: Some(Role::Cfo),
                department: Some(Department::Finance),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.role(), Some(Role::Cfo));
    assert_eq!(updated.department(), Some(Department::Finance));
    assert_eq!(updated.email, staff.procurement.email);
    assert!(updated.is_active);

    let err = ctx
        .state
        .users
        .update_user(
            staff.procurement.id,
            UserUpdate {
                blockchain_address: Some("0x1234".to_string()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = ctx
        .state
        .users
        .update_user(Uuid::new_v4(), UserUpdate::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn users_owning_requests_are_not_deleted() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;
    ctx.state
        .workflow
        .create_request(
            &staff.dean,
            NewRequest {
                item_name: "Dell Laptop".to_string(),
                quantity: 1,
                priority: Priority::Low,
                reason: "Spare".to_string(),
                department: None,
            },
        )
        .await
        .unwrap();

    let err = ctx.state.users.delete_user(staff.dean.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    ctx.state.users.delete_user(staff.cfo.id).await.unwrap();
    assert!(ctx.state.users.get_user(staff.cfo.id).await.unwrap().is_none());
    assert_matches!(
        ctx.state.users.delete_user(staff.cfo.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn user_administration_over_http_is_admin_only() {
    let ctx = TestContext::new().await;
    let staff = ctx.staff().await;

    let (status, _) = ctx
        .call(Method::GET, "/api/v1/users", Some(staff.stores_manager.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx
        .call(Method::GET, "/api/v1/users", Some(staff.admin.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 5);

    let uri = format!("/api/v1/users/{}", staff.cfo.id);
    let (status, body) = ctx
        .call(
            Method::PUT,
            &uri,
            Some(staff.admin.id),
            Some(json!({ "full_name": "Chief Financial Officer", "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["full_name"], "Chief Financial Officer");
    assert_eq!(body["data"]["is_active"], false);

    let (status, _) = ctx
        .call(Method::DELETE, &uri, Some(staff.dean.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx
        .call(Method::DELETE, &uri, Some(staff.admin.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted");
}
