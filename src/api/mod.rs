use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use axum_web::object::{cbor_from_slice, cbor_to_vec, PackObject};

use crate::conf;
use crate::db;
use crate::engagement::feed::Feed;

pub mod comment;
pub mod notification;
pub mod post;
pub mod settings;
pub mod spotlight;
pub mod trending;
pub mod upvote;
pub mod user;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub start_at: u64,
    pub scylla: Arc<db::scylladb::ScyllaDB>,
    pub engagement: conf::Engagement,
    pub trending: Arc<Feed<Vec<db::Post>>>,
    pub spotlight: Arc<Feed<Option<db::Post>>>,
}

#[derive(Serialize, Deserialize)]
pub struct AppVersion {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AppInfo {
    pub start_at: u64,
    // https://docs.rs/scylla/latest/scylla/struct.Metrics.html
    pub scylla_latency_avg_ms: u64,
    pub scylla_latency_p99_ms: u64,
    pub scylla_latency_p90_ms: u64,
    pub scylla_errors_num: u64,
    pub scylla_queries_num: u64,
    pub scylla_errors_iter_num: u64,
    pub scylla_queries_iter_num: u64,
    pub scylla_retries_num: u64,
}

pub async fn version(to: PackObject<()>, State(_): State<Arc<AppState>>) -> PackObject<AppVersion> {
    to.with(AppVersion {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
    })
}

pub async fn healthz(to: PackObject<()>, State(app): State<Arc<AppState>>) -> PackObject<AppInfo> {
    let m = app.scylla.metrics();
    to.with(AppInfo {
        start_at: app.start_at,
        scylla_latency_avg_ms: m.get_latency_avg_ms().unwrap_or(0),
        scylla_latency_p99_ms: m.get_latency_percentile_ms(99.0f64).unwrap_or(0),
        scylla_latency_p90_ms: m.get_latency_percentile_ms(90.0f64).unwrap_or(0),
        scylla_errors_num: m.get_errors_num(),
        scylla_queries_num: m.get_queries_num(),
        scylla_errors_iter_num: m.get_errors_iter_num(),
        scylla_queries_iter_num: m.get_queries_iter_num(),
        scylla_retries_num: m.get_retries_num(),
    })
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryId {
    pub id: PackObject<xid::Id>,
    pub fields: Option<String>,
}

// posts are addressed by (author, id), the author id being the partition key
#[derive(Debug, Deserialize, Validate)]
pub struct QueryPostId {
    pub uid: PackObject<xid::Id>,
    pub id: PackObject<xid::Id>,
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct Pagination {
    pub page_token: Option<PackObject<Vec<u8>>>,
    #[validate(range(min = 2, max = 1000))]
    pub page_size: Option<u16>,
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UidPagination {
    pub uid: PackObject<xid::Id>,
    pub page_token: Option<PackObject<Vec<u8>>>,
    #[validate(range(min = 2, max = 1000))]
    pub page_size: Option<u16>,
    pub fields: Option<Vec<String>>,
}

pub fn token_to_xid(page_token: &Option<PackObject<Vec<u8>>>) -> Option<xid::Id> {
    match page_token.as_ref().map(|v| v.unwrap_ref()) {
        Some(v) => cbor_from_slice::<PackObject<xid::Id>>(v)
            .ok()
            .map(|v| v.unwrap()),
        _ => None,
    }
}

pub fn token_from_xid(id: Option<xid::Id>) -> Option<Vec<u8>> {
    match id {
        Some(id) => cbor_to_vec(&PackObject::Cbor(id)).ok(),
        _ => None,
    }
}

pub fn get_fields(fields: Option<String>) -> Vec<String> {
    if fields.is_none() {
        return vec![];
    }
    let fields = fields.unwrap();
    let fields = fields.trim();
    if fields.is_empty() {
        return vec![];
    }
    fields.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use faster_hex::hex_string;

    #[test]
    fn get_fields_works() {
        assert_eq!(get_fields(None), Vec::<String>::new());
        assert_eq!(get_fields(Some("".to_string())), Vec::<String>::new());
        assert_eq!(get_fields(Some(" ".to_string())), Vec::<String>::new());
        assert_eq!(get_fields(Some(" id".to_string())), vec!["id".to_string()]);
        assert_eq!(
            get_fields(Some("id, uid".to_string())),
            vec!["id".to_string(), "uid".to_string()]
        );
        assert_eq!(
            get_fields(Some("id,uid,likes".to_string())),
            vec!["id".to_string(), "uid".to_string(), "likes".to_string()]
        );
    }

    #[test]
    fn token_to_xid_works() {
        let input = xid::new();
        let v = token_from_xid(Some(input)).unwrap();
        assert_eq!(hex_string(&v).len(), 26);
        let rt = token_to_xid(&Some(PackObject::Cbor(v)));
        assert_eq!(rt, Some(input));
        let rt = token_to_xid(&Some(PackObject::Cbor(vec![0x41, 0x02])));
        assert_eq!(rt, None);
        let rt = token_to_xid(&None);
        assert_eq!(rt, None);
    }
}
