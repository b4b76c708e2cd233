use axum::{
    extract::{Query, State},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use axum_web::context::ReqContext;
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::db;

use super::{get_fields, token_from_xid, token_to_xid, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentInput {
    pub uid: PackObject<xid::Id>, // post author
    pub id: PackObject<xid::Id>,  // post id
    #[validate(length(min = 1, max = 1024))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CommentOutput {
    pub post_id: PackObject<xid::Id>,
    pub id: PackObject<xid::Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<PackObject<xid::Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl CommentOutput {
    pub fn from<T>(val: db::Comment, to: &PackObject<T>) -> Self {
        let mut rt = Self {
            post_id: to.with(val.post_id),
            id: to.with(val.id),
            ..Default::default()
        };

        for v in val._fields {
            match v.as_str() {
                "uid" => rt.uid = Some(to.with(val.uid)),
                "author_name" => rt.author_name = Some(val.author_name.to_owned()),
                "author_photo" => rt.author_photo = Some(val.author_photo.to_owned()),
                "content" => rt.content = Some(val.content.to_owned()),
                "created_at" => rt.created_at = Some(val.created_at),
                _ => {}
            }
        }

        rt
    }
}

pub async fn create(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<CreateCommentInput>,
) -> Result<PackObject<SuccessResponse<CommentOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    if input.content.trim().is_empty() {
        return Err(HTTPError::new(400, "Comment cannot be empty".to_string()));
    }

    let uid = input.uid.unwrap();
    let id = input.id.unwrap();

    let mut post = db::Post::with_pk(uid, id);
    post.get_one(&app.scylla, Vec::new()).await?;

    let settings = db::UserSettings::get_or_default(&app.scylla, post.uid).await?;
    if !settings.enable_comments {
        return Err(HTTPError::new(
            403,
            "Comments are disabled on this post".to_string(),
        ));
    }
    if settings.comment_audience == db::AUDIENCE_FOLLOWERS && post.uid != ctx.user {
        let mut author = db::User::with_pk(post.uid);
        author
            .get_one(&app.scylla, vec!["followers".to_string()])
            .await?;
        if !settings.audience_allows(settings.comment_audience, ctx.user, &author.followers) {
            return Err(HTTPError::new(
                403,
                "Only followers can comment on this post".to_string(),
            ));
        }
    }

    let mut actor = db::User::with_pk(ctx.user);
    actor
        .get_one(&app.scylla, vec!["name".to_string(), "photo".to_string()])
        .await?;

    let mut doc = db::Comment::with_pk(id, xid::new());
    doc.uid = ctx.user;
    doc.author_name = actor.name.clone();
    doc.author_photo = actor.photo.clone();
    doc.content = input.content.trim().to_string();

    ctx.set_kvs(vec![
        ("action", "create_comment".into()),
        ("post_id", id.to_string().into()),
        ("id", doc.id.to_string().into()),
    ])
    .await;

    doc.save(&app.scylla).await?;
    post.incr_comments_count(&app.scylla).await?;

    if let Err(err) = db::Notification::emit(
        &app.scylla,
        post.uid,
        db::KIND_COMMENT,
        ctx.user,
        actor.name,
        actor.photo,
        id,
        &post.content,
        &doc.content,
    )
    .await
    {
        log::warn!(target: "notification",
            rid = ctx.rid,
            action = "create_comment";
            "emit failed: {}", err,
        );
    }

    Ok(to.with(SuccessResponse::new(CommentOutput::from(doc, &to))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryComments {
    pub id: PackObject<xid::Id>, // post id
    pub fields: Option<String>,
    pub page_token: Option<PackObject<Vec<u8>>>,
    #[validate(range(min = 2, max = 1000))]
    pub page_size: Option<u16>,
}

pub async fn list(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<QueryComments>,
) -> Result<PackObject<SuccessResponse<Vec<CommentOutput>>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let id = input.id.unwrap();
    let page_size = input.page_size.unwrap_or(10);
    ctx.set_kvs(vec![
        ("action", "list_comment".into()),
        ("post_id", id.to_string().into()),
    ])
    .await;

    let res = db::Comment::list_by_post(
        &app.scylla,
        id,
        get_fields(input.fields.clone()),
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
            .iter()
            .map(|r| CommentOutput::from(r.to_owned(), &to))
            .collect(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryDeleteComment {
    pub uid: PackObject<xid::Id>, // post author
    pub id: PackObject<xid::Id>,  // post id
    pub cid: PackObject<xid::Id>, // comment id
}

/// Deletes a comment, then rewrites the parent's comments_count from a
/// live recount so the counter heals any accumulated drift.
pub async fn delete(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryDeleteComment>,
) -> Result<PackObject<SuccessResponse<bool>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = *input.uid.to_owned();
    let id = *input.id.to_owned();
    let cid = *input.cid.to_owned();

    let mut doc = db::Comment::with_pk(id, cid);
    doc.get_one(&app.scylla, vec!["uid".to_string()]).await?;
    // the comment author and the post author may remove it
    if doc.uid != ctx.user && uid != ctx.user {
        return Err(HTTPError::new(
            403,
            "Not allowed to delete this comment".to_string(),
        ));
    }

    ctx.set_kvs(vec![
        ("action", "delete_comment".into()),
        ("post_id", id.to_string().into()),
        ("id", cid.to_string().into()),
    ])
    .await;

    let res = doc.delete(&app.scylla).await?;

    let count = db::Comment::count_by_post(&app.scylla, id).await?;
    let mut post = db::Post::with_pk(uid, id);
    post.get_one(
        &app.scylla,
        vec!["comments_count".to_string(), "updated_at".to_string()],
    )
    .await?;
    post.set_comments_count(&app.scylla, count as i32).await?;

    Ok(to.with(SuccessResponse::new(res)))
}
