use axum::{
    extract::{Query, State},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use axum_web::context::ReqContext;
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::db;

use super::{token_from_xid, token_to_xid, AppState, Pagination, QueryPostId};

use crate::api::post::PostOutput;

#[derive(Debug, Deserialize, Validate)]
pub struct UpvoteInput {
    pub uid: PackObject<xid::Id>, // post author
    pub id: PackObject<xid::Id>,  // post id
}

/// Upvote add: validate against the post, claim the join row, then move
/// the counter. The join row is the duplicate guard; the counter update
/// can lag it if this handler dies in between, which the reconcile batch
/// repairs.
pub async fn create(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<UpvoteInput>,
) -> Result<PackObject<SuccessResponse<PostOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let uid = input.uid.unwrap();
    let id = input.id.unwrap();

    let mut post = db::Post::with_pk(uid, id);
    post.get_one(&app.scylla, Vec::new()).await?; // 404 when the post is gone
    if post.uid == ctx.user {
        return Err(HTTPError::new(400, "Cannot upvote your own post".to_string()));
    }

    let settings = db::UserSettings::get_or_default(&app.scylla, post.uid).await?;
    if !settings.enable_upvotes {
        return Err(HTTPError::new(
            403,
            "Upvotes are disabled on this post".to_string(),
        ));
    }
    if settings.upvote_audience == db::AUDIENCE_FOLLOWERS {
        let mut author = db::User::with_pk(post.uid);
        author
            .get_one(&app.scylla, vec!["followers".to_string()])
            .await?;
        if !settings.audience_allows(settings.upvote_audience, ctx.user, &author.followers) {
            return Err(HTTPError::new(
                403,
                "Only followers can upvote this post".to_string(),
            ));
        }
    }

    ctx.set_kvs(vec![
        ("action", "create_upvote".into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::Upvote::with_pk(id, ctx.user);
    doc.post_uid = post.uid;
    doc.save(&app.scylla).await?;

    post.apply_upvote(&app.scylla, ctx.user, true).await?;

    if settings.notify_upvoted {
        let mut actor = db::User::with_pk(ctx.user);
        let _ = actor
            .get_one(&app.scylla, vec!["name".to_string(), "photo".to_string()])
            .await;
        if let Err(err) = db::Notification::emit(
            &app.scylla,
            post.uid,
            db::KIND_UPVOTE,
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
                action = "create_upvote";
                "emit failed: {}", err,
            );
        }
    }

    post._fields = vec![
        "upvotes_count".to_string(),
        "upvoted_by".to_string(),
        "updated_at".to_string(),
    ];
    Ok(to.with(SuccessResponse::new(PostOutput::from(post, &to))))
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

    ctx.set_kvs(vec![
        ("action", "delete_upvote".into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::Upvote::with_pk(id, ctx.user);
    doc.delete(&app.scylla).await?; // 404 when no upvote exists

    let mut post = db::Post::with_pk(uid, id);
    post.get_one(
        &app.scylla,
        vec![
            "upvotes_count".to_string(),
            "upvoted_by".to_string(),
            "updated_at".to_string(),
        ],
    )
    .await?;
    post.apply_upvote(&app.scylla, ctx.user, false).await?;

    Ok(to.with(SuccessResponse::new(true)))
}

/// Ids of posts the acting user has upvoted, for hydrating client state.
pub async fn list_by_user(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<Pagination>,
) -> Result<PackObject<SuccessResponse<Vec<PackObject<xid::Id>>>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let page_size = input.page_size.unwrap_or(100);
    ctx.set_kvs(vec![("action", "list_upvoted".into())]).await;

    let res = db::Upvote::list_post_ids_by_uid(
        &app.scylla,
        ctx.user,
        page_size,
        token_to_xid(&input.page_token),
    )
    .await?;
    let next_page_token = if res.len() >= page_size as usize {
        to.with_option(token_from_xid(res.last().copied()))
    } else {
        None
    };

    Ok(to.with(SuccessResponse {
        total_size: None,
        next_page_token,
        result: to.with_vec(res),
    }))
}
