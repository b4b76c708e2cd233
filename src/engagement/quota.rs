use serde::Serialize;

use crate::db::{scylladb, Post};
use crate::engagement::unix_day;

/// Fail-open view of a user's posting allowance for today, for display
/// next to the composer. Enforcement happens in PostQuota::reserve, not
/// here.
#[derive(Debug, Default, Clone, Serialize)]
pub struct QuotaStatus {
    pub count: i32,
    pub limit: i16,
    pub next_index: i16, // daily index the next post would take
    pub can_post: bool,
    pub level: String, // success | warning | error
    pub message: String,
}

/// Number of posts the user created today (UTC). A failed read degrades
/// to 0 so a transient store error never blocks the composer.
pub async fn count_posts_today(db: &scylladb::ScyllaDB, uid: xid::Id, now_ms: i64) -> i32 {
    match Post::list_by_uid_in_day(db, uid, unix_day(now_ms)).await {
        Ok(posts) => posts.len() as i32,
        Err(err) => {
            log::warn!(target: "quota",
                user = uid.to_string();
                "count_posts_today failed: {}", err,
            );
            0
        }
    }
}

/// Next per-day sequence number for the user's posts: max today + 1, or 1
/// for the first post of the day. Fails open to 1.
pub async fn next_daily_index(db: &scylladb::ScyllaDB, uid: xid::Id, now_ms: i64) -> i16 {
    match Post::list_by_uid_in_day(db, uid, unix_day(now_ms)).await {
        Ok(posts) => posts.iter().map(|p| p.daily_index).max().unwrap_or(0) + 1,
        Err(err) => {
            log::warn!(target: "quota",
                user = uid.to_string();
                "next_daily_index failed: {}", err,
            );
            1
        }
    }
}

pub fn status(count: i32, limit: i16) -> QuotaStatus {
    let limit_i32 = limit as i32;
    let (level, message) = if count >= limit_i32 {
        (
            "error",
            format!(
                "Daily post limit reached ({}/{}). Try again tomorrow.",
                count, limit
            ),
        )
    } else if count >= limit_i32 - 1 {
        (
            "warning",
            format!(
                "You have {} post remaining today ({}/{}).",
                limit_i32 - count,
                count,
                limit
            ),
        )
    } else {
        (
            "success",
            format!(
                "You can post {} more times today ({}/{}).",
                limit_i32 - count,
                count,
                limit
            ),
        )
    };

    QuotaStatus {
        count,
        limit,
        next_index: 0,
        can_post: count < limit_i32,
        level: level.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf;
    use crate::db;
    use axum_web::context::unix_ms;
    use tokio::sync::OnceCell;

    static DB: OnceCell<db::scylladb::ScyllaDB> = OnceCell::const_new();

    async fn get_db() -> &'static db::scylladb::ScyllaDB {
        DB.get_or_init(|| async {
            let cfg = conf::Conf::new().unwrap_or_else(|err| panic!("config error: {}", err));
            let res = db::scylladb::ScyllaDB::new(cfg.scylla, "pulse_test").await;
            res.unwrap()
        })
        .await
    }

    #[tokio::test(flavor = "current_thread")]
    #[ignore]
    async fn test_all() {
        daily_index_counts_up().await;
    }

    async fn daily_index_counts_up() {
        let db = get_db().await;
        let uid = xid::new();
        let now = unix_ms() as i64;

        assert_eq!(count_posts_today(db, uid, now).await, 0);
        assert_eq!(next_daily_index(db, uid, now).await, 1);

        let mut doc = db::Post::with_pk(uid, xid::new());
        doc.content = "first of the day".to_string();
        doc.daily_index = 1;
        assert!(doc.save(db).await.unwrap());

        assert_eq!(count_posts_today(db, uid, now).await, 1);
        assert_eq!(next_daily_index(db, uid, now).await, 2);
    }

    #[test]
    fn status_works() {
        let st = status(0, 2);
        assert!(st.can_post);
        assert_eq!(st.level, "success");
        assert_eq!(st.message, "You can post 2 more times today (0/2).");

        let st = status(1, 2);
        assert!(st.can_post);
        assert_eq!(st.level, "warning");
        assert_eq!(st.message, "You have 1 post remaining today (1/2).");

        let st = status(2, 2);
        assert!(!st.can_post);
        assert_eq!(st.level, "error");
        assert_eq!(
            st.message,
            "Daily post limit reached (2/2). Try again tomorrow."
        );

        // drifted counters past the ceiling still read as exhausted
        let st = status(3, 2);
        assert!(!st.can_post);
        assert_eq!(st.level, "error");
    }
}
