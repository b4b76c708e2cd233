use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use axum_web::context::ReqContext;
use axum_web::erring::{valid_user, HTTPError, SuccessResponse};
use axum_web::object::PackObject;
use scylla_orm::ColumnsMap;

use crate::db;

use super::AppState;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SettingsOutput {
    pub show_daily_counter: bool,
    pub enable_upvotes: bool,
    pub enable_comments: bool,
    pub confirm_before_posting: bool,
    pub upvote_audience: i8,
    pub comment_audience: i8,
    pub notify_upvoted: bool,
    pub notify_spotlight: bool,
    pub notify_trending: bool,
    pub hide_low_engagement: bool,
    pub updated_at: i64,
}

impl From<db::UserSettings> for SettingsOutput {
    fn from(val: db::UserSettings) -> Self {
        Self {
            show_daily_counter: val.show_daily_counter,
            enable_upvotes: val.enable_upvotes,
            enable_comments: val.enable_comments,
            confirm_before_posting: val.confirm_before_posting,
            upvote_audience: val.upvote_audience,
            comment_audience: val.comment_audience,
            notify_upvoted: val.notify_upvoted,
            notify_spotlight: val.notify_spotlight,
            notify_trending: val.notify_trending,
            hide_low_engagement: val.hide_low_engagement,
            updated_at: val.updated_at,
        }
    }
}

/// Reading settings materializes the defaults for first-time users.
pub async fn get(
    to: PackObject<()>,
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
) -> Result<PackObject<SuccessResponse<SettingsOutput>>, HTTPError> {
    valid_user(ctx.user)?;
    ctx.set_kvs(vec![("action", "get_settings".into())]).await;

    let doc = db::UserSettings::get_or_default(&app.scylla, ctx.user).await?;
    Ok(to.with(SuccessResponse::new(doc.into())))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsInput {
    pub updated_at: i64,
    pub show_daily_counter: Option<bool>,
    pub enable_upvotes: Option<bool>,
    pub enable_comments: Option<bool>,
    pub confirm_before_posting: Option<bool>,
    #[validate(range(min = 0, max = 1))]
    pub upvote_audience: Option<i8>,
    #[validate(range(min = 0, max = 1))]
    pub comment_audience: Option<i8>,
    pub notify_upvoted: Option<bool>,
    pub notify_spotlight: Option<bool>,
    pub notify_trending: Option<bool>,
    pub hide_low_engagement: Option<bool>,
}

impl UpdateSettingsInput {
    fn into(self) -> anyhow::Result<ColumnsMap> {
        let mut cols = ColumnsMap::new();
        if let Some(v) = self.show_daily_counter {
            cols.set_as("show_daily_counter", &v);
        }
        if let Some(v) = self.enable_upvotes {
            cols.set_as("enable_upvotes", &v);
        }
        if let Some(v) = self.enable_comments {
            cols.set_as("enable_comments", &v);
        }
        if let Some(v) = self.confirm_before_posting {
            cols.set_as("confirm_before_posting", &v);
        }
        if let Some(v) = self.upvote_audience {
            cols.set_as("upvote_audience", &v);
        }
        if let Some(v) = self.comment_audience {
            cols.set_as("comment_audience", &v);
        }
        if let Some(v) = self.notify_upvoted {
            cols.set_as("notify_upvoted", &v);
        }
        if let Some(v) = self.notify_spotlight {
            cols.set_as("notify_spotlight", &v);
        }
        if let Some(v) = self.notify_trending {
            cols.set_as("notify_trending", &v);
        }
        if let Some(v) = self.hide_low_engagement {
            cols.set_as("hide_low_engagement", &v);
        }

        if cols.is_empty() {
            return Err(HTTPError::new(400, "No fields to update".to_string()).into());
        }

        Ok(cols)
    }
}

pub async fn update(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<UpdateSettingsInput>,
) -> Result<PackObject<SuccessResponse<SettingsOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let updated_at = input.updated_at;
    let cols = input.into()?;
    ctx.set_kvs(vec![("action", "update_settings".into())]).await;

    // settle the row first so updates work for first-time users too
    let mut doc = db::UserSettings::get_or_default(&app.scylla, ctx.user).await?;
    let ok = doc.update(&app.scylla, cols, updated_at).await?;
    ctx.set("updated", ok.into()).await;

    doc.get_one(&app.scylla).await?;
    Ok(to.with(SuccessResponse::new(doc.into())))
}
