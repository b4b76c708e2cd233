use axum::{extract::State, Extension};
use std::sync::Arc;

use axum_web::context::{unix_ms, ReqContext};
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::api::post::PostOutput;
use crate::db;
use crate::engagement::unix_day;

use super::AppState;

/// Today's community spotlight, electing yesterday's top-upvoted post on
/// first call of the day. A day with no eligible posts answers null.
pub async fn get(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<Option<PostOutput>>>, HTTPError> {
    valid_user(ctx.user)?;

    let today = unix_day(unix_ms() as i64);
    ctx.set_kvs(vec![("action", "get_spotlight".into()), ("day", today.into())])
        .await;

    let res = db::Spotlight::select_for_day(&app.scylla, today).await?;
    ctx.set("selected", res.is_some().into()).await;

    Ok(to.with(SuccessResponse::new(
        res.map(|post| PostOutput::from(post, &to)),
    )))
}

/// Latest snapshot from the live spotlight feed.
pub async fn live(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<Option<PostOutput>>>, HTTPError> {
    valid_user(ctx.user)?;
    ctx.set_kvs(vec![("action", "live_spotlight".into())]).await;

    let snapshot: Option<db::Post> = (*app.spotlight.latest()).clone();
    Ok(to.with(SuccessResponse::new(
        snapshot.map(|post| PostOutput::from(post, &to)),
    )))
}
