use axum::{middleware, routing, Router};
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::{predicate::SizeAbove, CompressionLayer},
};

use axum_web::context;
use axum_web::encoding;

use crate::api;
use crate::conf;
use crate::db;
use crate::engagement::{feed, trending, unix_day};

pub async fn new(cfg: conf::Conf) -> anyhow::Result<(Arc<api::AppState>, Router)> {
    let keyspace = if cfg.env == "test" { "pulse_test" } else { "pulse" };
    let scylla = db::scylladb::ScyllaDB::new(cfg.scylla, keyspace).await?;
    let scylla = Arc::new(scylla);

    let trending_feed = feed::Feed::new(Vec::new());
    let spotlight_feed = feed::Feed::new(None);

    let app_state = Arc::new(api::AppState {
        start_at: context::unix_ms(),
        scylla: scylla.clone(),
        engagement: cfg.engagement.clone(),
        trending: trending_feed.clone(),
        spotlight: spotlight_feed.clone(),
    });

    let period = Duration::from_secs(cfg.engagement.feed_refresh_secs);
    {
        let db = scylla.clone();
        let cfg = cfg.engagement.clone();
        feed::spawn_refresher(trending_feed, period, "trending", move || {
            let db = db.clone();
            let cfg = cfg.clone();
            async move {
                trending::trending_posts(
                    &db,
                    &cfg,
                    context::unix_ms() as i64,
                    cfg.trending_limit,
                )
                .await
            }
        });
    }
    {
        let db = scylla.clone();
        feed::spawn_refresher(spotlight_feed, period, "spotlight", move || {
            let db = db.clone();
            async move {
                db::Spotlight::select_for_day(&db, unix_day(context::unix_ms() as i64)).await
            }
        });
    }

    let mds = ServiceBuilder::new()
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn(context::middleware))
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(encoding::MIN_ENCODING_SIZE)));

    let app = Router::new()
        .route("/", routing::get(api::version))
        .route("/healthz", routing::get(api::healthz))
        .nest(
            "/v1/user",
            Router::new()
                .route(
                    "/",
                    routing::post(api::user::create)
                        .get(api::user::get)
                        .patch(api::user::update),
                )
                .route("/follow", routing::post(api::user::follow))
                .route("/unfollow", routing::post(api::user::unfollow)),
        )
        .nest(
            "/v1/post",
            Router::new()
                .route(
                    "/",
                    routing::post(api::post::create)
                        .get(api::post::get)
                        .delete(api::post::delete),
                )
                .route("/list", routing::post(api::post::list))
                .route("/feed", routing::get(api::post::feed))
                .route("/like", routing::patch(api::post::like))
                .route("/quota", routing::get(api::post::today_quota)),
        )
        .nest(
            "/v1/upvote",
            Router::new()
                .route(
                    "/",
                    routing::post(api::upvote::create).delete(api::upvote::delete),
                )
                .route("/list_by_user", routing::post(api::upvote::list_by_user)),
        )
        .nest(
            "/v1/comment",
            Router::new()
                .route(
                    "/",
                    routing::post(api::comment::create).delete(api::comment::delete),
                )
                .route("/list", routing::post(api::comment::list)),
        )
        .nest(
            "/v1/trending",
            Router::new()
                .route("/", routing::get(api::trending::list))
                .route("/live", routing::get(api::trending::live)),
        )
        .nest(
            "/v1/spotlight",
            Router::new()
                .route("/", routing::get(api::spotlight::get))
                .route("/live", routing::get(api::spotlight::live)),
        )
        .nest(
            "/v1/notification",
            Router::new()
                .route("/list", routing::post(api::notification::list))
                .route("/read", routing::patch(api::notification::read))
                .route("/read_all", routing::patch(api::notification::read_all)),
        )
        .nest(
            "/v1/settings",
            Router::new().route(
                "/",
                routing::get(api::settings::get).patch(api::settings::update),
            ),
        )
        .route_layer(mds)
        .with_state(app_state.clone());

    Ok((app_state, app))
}

#[cfg(test)]
mod tests {
    use axum::http::{self, header::HeaderValue, StatusCode};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::net::TcpListener;
    use tokio::sync::OnceCell;
    use tokio::time;

    use crate::conf;
    use axum_web::erring;

    use super::*;

    static SERVER: OnceCell<(SocketAddr, reqwest::Client)> = OnceCell::const_new();

    async fn get_server() -> &'static (SocketAddr, reqwest::Client) {
        SERVER
            .get_or_init(|| async {
                let cfg = conf::Conf::new().unwrap_or_else(|err| panic!("config error: {}", err));
                let listener = TcpListener::bind("0.0.0.0:0").unwrap();
                let addr = listener.local_addr().unwrap();
                let (_, app) = new(cfg).await.unwrap();

                tokio::spawn(async move {
                    let _ = axum::Server::from_tcp(listener)
                        .unwrap()
                        .serve(app.into_make_service())
                        .await;
                });

                time::sleep(time::Duration::from_millis(100)).await;
                (
                    addr,
                    reqwest::ClientBuilder::new().gzip(true).build().unwrap(),
                )
            })
            .await
    }

    #[tokio::test(flavor = "current_thread")]
    #[ignore]
    async fn test_all() -> anyhow::Result<()> {
        healthz_api_works().await?;
        engagement_flow_works().await?;

        Ok(())
    }

    async fn healthz_api_works() -> anyhow::Result<()> {
        let (addr, client) = get_server().await;

        let res = client
            .get(format!("http://{}/healthz", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = res.bytes().await?;
        let json_obj: crate::api::AppInfo = serde_json::from_slice(&body).unwrap();

        let res = client
            .get(format!("http://{}/healthz", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/cbor"),
            )
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/cbor"
        );
        let body = res.bytes().await?;
        let cbor_obj: crate::api::AppInfo = ciborium::from_reader(&body[..]).unwrap();

        assert_eq!(json_obj.start_at, cbor_obj.start_at);

        Ok(())
    }

    async fn engagement_flow_works() -> anyhow::Result<()> {
        let (addr, client) = get_server().await;
        let author = xid::new().to_string();
        let fan = xid::new().to_string();

        // both users register a profile
        for (user, name) in [(&author, "Author"), (&fan, "Fan")] {
            let res = client
                .post(format!("http://{}/v1/user", addr))
                .header(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )
                .header("x-user-id", user.as_str())
                .json(&json!({ "name": name }))
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::OK);
        }

        // the author posts
        let res = client
            .post(format!("http://{}/v1/post", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("x-user-id", author.as_str())
            .json(&json!({ "kind": 0, "content": "hello pulse" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.bytes().await?;
        let created: erring::SuccessResponse<crate::api::post::PostOutput> =
            serde_json::from_slice(&body).unwrap();
        let post_id = created.result.id;
        assert_eq!(created.result.daily_index, Some(1));

        // the fan upvotes it
        let res = client
            .post(format!("http://{}/v1/upvote", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("x-user-id", fan.as_str())
            .json(&json!({ "uid": author, "id": post_id }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);

        // upvoting again is a conflict
        let res = client
            .post(format!("http://{}/v1/upvote", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("x-user-id", fan.as_str())
            .json(&json!({ "uid": author, "id": post_id }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        // the author cannot upvote their own post
        let res = client
            .post(format!("http://{}/v1/upvote", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("x-user-id", author.as_str())
            .json(&json!({ "uid": author, "id": post_id }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        // the upvote produced a notification for the author
        let res = client
            .post(format!("http://{}/v1/notification/list", addr))
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("x-user-id", author.as_str())
            .json(&json!({}))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);

        Ok(())
    }
}
