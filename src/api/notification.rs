use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use axum_web::context::ReqContext;
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::db;

use super::{token_from_xid, token_to_xid, AppState, Pagination};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NotificationOutput {
    pub id: PackObject<xid::Id>,
    pub kind: i8,
    pub actor_id: PackObject<xid::Id>,
    pub actor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PackObject<xid::Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_content: Option<String>,
    pub read: bool,
    pub created_at: i64,
}

impl NotificationOutput {
    pub fn from<T>(val: db::Notification, to: &PackObject<T>) -> Self {
        Self {
            id: to.with(val.id),
            kind: val.kind,
            actor_id: to.with(val.actor_id),
            actor_name: val.actor_name,
            actor_photo: if val.actor_photo.is_empty() {
                None
            } else {
                Some(val.actor_photo)
            },
            post_id: if val.post_id.is_zero() {
                None
            } else {
                Some(to.with(val.post_id))
            },
            post_content: if val.post_content.is_empty() {
                None
            } else {
                Some(val.post_content)
            },
            comment_content: if val.comment_content.is_empty() {
                None
            } else {
                Some(val.comment_content)
            },
            read: val.read,
            created_at: val.created_at,
        }
    }
}

pub async fn list(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<Pagination>,
) -> Result<PackObject<SuccessResponse<Vec<NotificationOutput>>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let page_size = input.page_size.unwrap_or(20);
    ctx.set_kvs(vec![("action", "list_notification".into())]).await;

    let res = db::Notification::list_by_uid(
        &app.scylla,
        ctx.user,
        page_size,
        token_to_xid(&input.page_token),
    )
    .await?;
    let next_page_token = if res.len() >= page_size as usize {
        to.with_option(token_from_xid(res.last().map(|doc| doc.id)))
    } else {
        None
    };

    Ok(to.with(SuccessResponse {
        total_size: None,
        next_page_token,
        result: res
            .into_iter()
            .map(|r| NotificationOutput::from(r, &to))
            .collect(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReadNotificationInput {
    pub id: PackObject<xid::Id>,
}

pub async fn read(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<ReadNotificationInput>,
) -> Result<PackObject<SuccessResponse<bool>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let id = input.id.unwrap();
    ctx.set_kvs(vec![
        ("action", "read_notification".into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::Notification::with_pk(ctx.user, id);
    let res = doc.mark_read(&app.scylla).await?;
    Ok(to.with(SuccessResponse::new(res)))
}

pub async fn read_all(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<usize>>, HTTPError> {
    valid_user(ctx.user)?;
    ctx.set_kvs(vec![("action", "read_all_notification".into())])
        .await;

    let res = db::Notification::mark_all_read(&app.scylla, ctx.user).await?;
    Ok(to.with(SuccessResponse::new(res)))
}
