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
use scylla_orm::ColumnsMap;

use crate::db;

use super::{get_fields, AppState, QueryId};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(url)]
    pub photo: Option<String>,
    #[validate(length(min = 0, max = 256))]
    pub bio: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserOutput {
    pub id: PackObject<xid::Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<Vec<PackObject<xid::Id>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<Vec<PackObject<xid::Id>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl UserOutput {
    pub fn from<T>(val: db::User, to: &PackObject<T>) -> Self {
        let mut rt = Self {
            id: to.with(val.id),
            ..Default::default()
        };

        for v in val._fields {
            match v.as_str() {
                "name" => rt.name = Some(val.name.to_owned()),
                "photo" => rt.photo = Some(val.photo.to_owned()),
                "bio" => rt.bio = Some(val.bio.to_owned()),
                "followers" => rt.followers = Some(to.with_set(val.followers.to_owned())),
                "following" => rt.following = Some(to.with_set(val.following.to_owned())),
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
    to: PackObject<CreateUserInput>,
) -> Result<PackObject<SuccessResponse<UserOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let mut doc = db::User::with_pk(ctx.user);
    doc.name = input.name;
    doc.photo = input.photo.unwrap_or_default();
    doc.bio = input.bio.unwrap_or_default();

    ctx.set_kvs(vec![
        ("action", "create_user".into()),
        ("id", doc.id.to_string().into()),
    ])
    .await;

    let ok = doc.save(&app.scylla).await?;
    ctx.set("created", ok.into()).await;
    Ok(to.with(SuccessResponse::new(UserOutput::from(doc, &to))))
}

pub async fn get(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<()>,
    input: Query<QueryId>,
) -> Result<PackObject<SuccessResponse<UserOutput>>, HTTPError> {
    input.validate()?;
    valid_user(ctx.user)?;

    let id = *input.id.to_owned();
    ctx.set_kvs(vec![
        ("action", "get_user".into()),
        ("id", id.to_string().into()),
    ])
    .await;

    let mut doc = db::User::with_pk(id);
    doc.get_one(&app.scylla, get_fields(input.fields.clone()))
        .await?;
    Ok(to.with(SuccessResponse::new(UserOutput::from(doc, &to))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserInput {
    pub updated_at: i64,
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    #[validate(url)]
    pub photo: Option<String>,
    #[validate(length(min = 0, max = 256))]
    pub bio: Option<String>,
}

impl UpdateUserInput {
    fn into(self) -> anyhow::Result<ColumnsMap> {
        let mut cols = ColumnsMap::new();
        if let Some(name) = self.name {
            cols.set_as("name", &name);
        }
        if let Some(photo) = self.photo {
            cols.set_as("photo", &photo);
        }
        if let Some(bio) = self.bio {
            cols.set_as("bio", &bio);
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
    to: PackObject<UpdateUserInput>,
) -> Result<PackObject<SuccessResponse<UserOutput>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let mut doc = db::User::with_pk(ctx.user);
    let updated_at = input.updated_at;
    let cols = input.into()?;
    ctx.set_kvs(vec![
        ("action", "update_user".into()),
        ("id", doc.id.to_string().into()),
    ])
    .await;

    let ok = doc.update_profile(&app.scylla, cols, updated_at).await?;
    ctx.set("updated", ok.into()).await;

    doc._fields = vec!["updated_at".to_string()];
    Ok(to.with(SuccessResponse::new(UserOutput::from(doc, &to))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct FollowInput {
    pub id: PackObject<xid::Id>, // the user to (un)follow
}

pub async fn follow(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<FollowInput>,
) -> Result<PackObject<SuccessResponse<bool>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let target = input.id.unwrap();
    ctx.set_kvs(vec![
        ("action", "follow_user".into()),
        ("id", target.to_string().into()),
    ])
    .await;

    let res = db::User::follow(&app.scylla, ctx.user, target).await?;

    if res {
        let mut actor = db::User::with_pk(ctx.user);
        let _ = actor
            .get_one(&app.scylla, vec!["name".to_string(), "photo".to_string()])
            .await;
        if let Err(err) = db::Notification::emit(
            &app.scylla,
            target,
            db::KIND_FOLLOW,
            ctx.user,
            actor.name,
            actor.photo,
            xid::Id::default(),
            "",
            "",
        )
        .await
        {
            log::warn!(target: "notification",
                rid = ctx.rid,
                action = "follow_user";
                "emit failed: {}", err,
            );
        }
    }

    Ok(to.with(SuccessResponse::new(res)))
}

pub async fn unfollow(
    State(app): State<Arc<AppState>>,
    Extension(ctx): Extension<Arc<ReqContext>>,
    to: PackObject<FollowInput>,
) -> Result<PackObject<SuccessResponse<bool>>, HTTPError> {
    let (to, input) = to.unpack();
    input.validate()?;
    valid_user(ctx.user)?;

    let target = input.id.unwrap();
    ctx.set_kvs(vec![
        ("action", "unfollow_user".into()),
        ("id", target.to_string().into()),
    ])
    .await;

    let res = db::User::unfollow(&app.scylla, ctx.user, target).await?;
    Ok(to.with(SuccessResponse::new(res)))
}
