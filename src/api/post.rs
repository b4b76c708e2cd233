use axum::{
    extract::{Query, State},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use axum_web::context::{unix_ms, ReqContext};
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::db;
use crate::engagement::{quota, unix_day};

use super::{get_fields, token_from_xid, token_to_xid, AppState, QueryPostId, UidPagination};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreatePostInput {
    #[validate(range(min = 0, max = 2))]
    pub kind: i8,
    #[validate(length(min = 0, max = 2048))]
    pub content: String,
    #[validate(url)]
    pub image_url: Option<String>,
    pub thread_id: Option<PackObject<xid::Id>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PostOutput {
    pub uid: PackObject<xid::Id>,
    pub id: PackObject<xid::Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<PackObject<xid::Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_index: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by: Option<Vec<PackObject<xid::Id>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upvotes_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upvoted_by: Option<Vec<PackObject<xid::Id>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_spotlight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotlight_day: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_post_of_week: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_of_week_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl PostOutput {
    pub fn from<T>(val: db::Post, to: &PackObject<T>) -> Self {
        let mut rt = Self {
            uid: to.with(val.uid),
            id: to.with(val.id),
            ..Default::default()
        };

        for v in val._fields {
            match v.as_str() {
                "kind" => rt.kind = Some(val.kind),
                "author_name" => rt.author_name = Some(val.author_name.to_owned()),
                "author_photo" => rt.author_photo = Some(val.author_photo.to_owned()),
                "content" => rt.content = Some(val.content.to_owned()),
                "image_url" => rt.image_url = Some(val.image_url.to_owned()),
                "thread_id" => {
                    if !val.thread_id.is_zero() {
                        rt.thread_id = Some(to.with(val.thread_id));
                    }
                }
                "day" => rt.day = Some(val.day),
                "daily_index" => rt.daily_index = Some(val.daily_index),
                "likes" => rt.likes = Some(val.likes),
                "liked_by" => rt.liked_by = Some(to.with_set(val.liked_by.to_owned())),
                "upvotes_count" => rt.upvotes_count = Some(val.upvotes_count),
                "upvoted_by" => rt.upvoted_by = Some(to.with_set(val.upvoted_by.to_owned())),
                "comments_count" => rt.comments_count = Some(val.comments_count),
                "is_spotlight" => rt.is_spotlight = Some(val.is_spotlight),
                "spotlight_day" => rt.spotlight_day = Some(val.spotlight_day),
                "is_post_of_week" => rt.is_post_of_week = Some(val.is_post_of_week),
                "post_of_week_at" => rt.post_of_week_at = Some(val.post_of_week_at),
                "created_at" => rt.created_at = Some(val.created_at),
                "updated_at" => rt.updated_at = Some(val.updated_at),
                _ => {}
            }
        }

        rt
    }
}

pub async fn create(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<CreatePostInput>,
) -> Result<PackObject<SuccessResponse<PostOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    if input.content.trim().is_empty() && input.image_url.is_none() {
        return Err(HTTPError::new(400, "Post content cannot be empty".to_string()));
    }

    let mut author = db::User::with_pk(ctx.user);
    author
        .get_one(&app.scylla, vec!["name".to_string(), "photo".to_string()])
        .await?;

    let thread_id = input.thread_id.map(|id| id.unwrap());
    // thread replies do not consume the daily quota and carry index 0
    let daily_index = match thread_id {
        Some(_) => 0i16,
        None => {
            db::PostQuota::reserve(
                &app.scylla,
                ctx.user,
                unix_day(unix_ms() as i64),
                app.engagement.daily_post_limit,
            )
            .await?
        }
    };

    let mut doc = db::Post {
        uid: ctx.user,
        id: xid::new(),
        kind: input.kind,
        author_name: author.name,
        author_photo: author.photo,
        content: input.content.trim().to_string(),
        image_url: input.image_url.unwrap_or_default(),
        daily_index,
        ..Default::default()
    };

    match thread_id {
        Some(id) => {
            doc.kind = db::KIND_THREAD;
            doc.thread_id = id;
        }
        None if doc.kind == db::KIND_THREAD => {
            // the first post of a thread anchors the thread to itself
            doc.thread_id = doc.id;
        }
        None => {}
    }

    ctx.set_kvs(vec![
        ("action", "create_post".into()),
        ("id", doc.id.to_string().into()),
        ("daily_index", daily_index.into()),
    ])
    .await;

    let ok = doc.save(&app.scylla).await?;
    ctx.set("created", ok.into()).await;
    Ok(to.with(SuccessResponse::new(PostOutput::from(doc, &to))))
}

pub async fn get(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryPostId>,
) -> Result<PackObject<SuccessResponse<PostOutput>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = *input.uid.to_owned();
    let id = *input.id.to_owned();

    ctx.set_kvs(vec![
        ("action", "get_post".into()),
        ("uid", uid.to_string().into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::Post::with_pk(uid, id);
    doc.get_one(&app.scylla, get_fields(input.fields.clone()))
        .await?;
    Ok(to.with(SuccessResponse::new(PostOutput::from(doc, &to))))
}

pub async fn list(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<UidPagination>,
) -> Result<PackObject<SuccessResponse<Vec<PostOutput>>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = input.uid.unwrap();
    let page_size = input.page_size.unwrap_or(10);
    ctx.set_kvs(vec![
        ("action", "list_post".into()),
        ("uid", uid.to_string().into()),
    ])
    .await;

    let fields = input.fields.unwrap_or_default();
    let res = db::Post::list_by_uid(
        &app.scylla,
        uid,
        fields,
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
            .map(|r| PostOutput::from(r.to_owned(), &to))
            .collect(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryFeed {
    pub day: Option<i32>,
    pub fields: Option<String>,
}

// the home feed: a UTC day's posts, newest first
pub async fn feed(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryFeed>,
) -> Result<PackObject<SuccessResponse<Vec<PostOutput>>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let day = input.day.unwrap_or_else(|| unix_day(unix_ms() as i64));
    ctx.set_kvs(vec![("action", "feed_post".into()), ("day", day.into())])
        .await;

    let index = db::PostDay::list_by_day(&app.scylla, day).await?;
    let mut res = db::Post::batch_get(
        &app.scylla,
        index.iter().map(|d| (d.uid, d.id)).collect(),
        get_fields(input.fields.clone()),
    )
    .await?;
    res.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(to.with(SuccessResponse::new(
        res.iter()
            .map(|r| PostOutput::from(r.to_owned(), &to))
            .collect(),
    )))
}

pub async fn delete(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryPostId>,
) -> Result<PackObject<SuccessResponse<bool>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = *input.uid.to_owned();
    let id = *input.id.to_owned();
    if uid != ctx.user {
        return Err(HTTPError::new(
            403,
            "Only the author can delete a post".to_string(),
        ));
    }

    ctx.set_kvs(vec![
        ("action", "delete_post".into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::Post::with_pk(uid, id);
    let res = doc.delete(&app.scylla).await?;
    Ok(to.with(SuccessResponse::new(res)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LikePostInput {
    pub uid: PackObject<xid::Id>,
    pub id: PackObject<xid::Id>,
}

pub async fn like(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<LikePostInput>,
) -> Result<PackObject<SuccessResponse<PostOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = input.uid.unwrap();
    let id = input.id.unwrap();

    let mut doc = db::Post::with_pk(uid, id);
    let liked = doc.toggle_like(&app.scylla, ctx.user).await?;
    ctx.set_kvs(vec![
        ("action", "like_post".into()),
        ("id", id.to_string().into()),
        ("liked", liked.into()),
    ])
    .await;

    if liked && uid != ctx.user {
        let mut actor = db::User::with_pk(ctx.user);
        let _ = actor
            .get_one(&app.scylla, vec!["name".to_string(), "photo".to_string()])
            .await;
        let mut post = db::Post::with_pk(uid, id);
        let _ = post.get_one(&app.scylla, vec!["content".to_string()]).await;
        if let Err(err) = db::Notification::emit(
            &app.scylla,
            uid,
            db::KIND_LIKE,
            ctx.user,
            actor.name,
            actor.photo,
            id,
            &post.content,
            "",
        )
        .await
        {
            log::warn!(target: "notification",
                rid = ctx.rid,
                action = "like_post";
                "emit failed: {}", err,
            );
        }
    }

    doc._fields = vec![
        "likes".to_string(),
        "liked_by".to_string(),
        "updated_at".to_string(),
    ];
    Ok(to.with(SuccessResponse::new(PostOutput::from(doc, &to))))
}

// fail-open posting allowance for the composer
pub async fn today_quota(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<quota::QuotaStatus>>, HTTPError> {
    valid_user(ctx.user)?;

    let now = unix_ms() as i64;
    let count = quota::count_posts_today(&app.scylla, ctx.user, now).await;
    ctx.set_kvs(vec![("action", "today_quota".into()), ("count", count.into())])
        .await;

    let mut res = quota::status(count, app.engagement.daily_post_limit);
    res.next_index = quota::next_daily_index(&app.scylla, ctx.user, now).await;
    Ok(to.with(SuccessResponse::new(res)))
}
