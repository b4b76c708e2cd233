use axum::{
    extract::{Query, State},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use axum_web::context::{unix_ms, ReqContext};
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;

use crate::api::post::PostOutput;
use crate::engagement::trending;

use super::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct QueryTrending {
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

/// One-shot trending ranking over the trailing window.
pub async fn list(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryTrending>,
) -> Result<PackObject<SuccessResponse<Vec<PostOutput>>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let limit = input.limit.unwrap_or(app.engagement.trending_limit);
    ctx.set_kvs(vec![
        ("action", "list_trending".into()),
        ("limit", limit.into()),
    ])
    .await;

    let res = trending::trending_posts(&app.scylla, &app.engagement, unix_ms() as i64, limit)
        .await
        .unwrap_or_else(|err| {
            // a read failure degrades to an empty board, never a refusal
            log::warn!(target: "trending",
                rid = ctx.rid;
                "trending_posts failed: {}", err,
            );
            Vec::new()
        });

    Ok(to.with(SuccessResponse::new(
        res.into_iter().map(|p| PostOutput::from(p, &to)).collect(),
    )))
}

/// Latest snapshot from the live trending feed, refreshed in the
/// background.
pub async fn live(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<Vec<PostOutput>>>, HTTPError> {
    valid_user(ctx.user)?;
    ctx.set_kvs(vec![("action", "live_trending".into())]).await;

    let snapshot = app.trending.latest();
    Ok(to.with(SuccessResponse::new(
        snapshot
            .iter()
            .map(|p| PostOutput::from(p.to_owned(), &to))
            .collect(),
    )))
}
