use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied};

/// One row per (author, UTC day). Posting reserves a slot through a
/// conditional write on this row, so the daily ceiling holds even when the
/// same user submits concurrently, and the returned count doubles as the
/// post's daily_index. Rows are never decremented: a deleted post does not
/// give the day's slot back.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct PostQuota {
    pub uid: xid::Id,
    pub day: i32,
    pub n: i16,
    pub updated_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl PostQuota {
    pub fn with_pk(uid: xid::Id, day: i32) -> Self {
        Self {
            uid,
            day,
            ..Default::default()
        }
    }

    pub async fn get_one(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<()> {
        let fields = Self::fields();
        self._fields = fields.clone();

        let query = format!(
            "SELECT {} FROM post_quota WHERE uid=? AND day=? LIMIT 1",
            fields.join(",")
        );
        let params = (self.uid.to_cql(), self.day);
        let res = db.execute(query, params).await?.single_row()?;

        let mut cols = ColumnsMap::with_capacity(fields.len());
        cols.fill(res, &fields)?;
        self.fill(&cols);

        Ok(())
    }

    /// Claims one posting slot for (uid, day) and returns the new count,
    /// which the caller assigns as the post's daily_index.
    pub async fn reserve(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        day: i32,
        limit: i16,
    ) -> anyhow::Result<i16> {
        let mut doc = Self::with_pk(uid, day);
        if doc.get_one(db).await.is_err() {
            // first post of the day
            let now = unix_ms() as i64;
            let query =
                "INSERT INTO post_quota (uid,day,n,updated_at) VALUES (?,?,1,?) IF NOT EXISTS";
            let params = (uid.to_cql(), day, now);
            let res = db.execute(query, params).await?;
            if extract_applied(res) {
                return Ok(1);
            }
            // another submission won the insert, re-read and fall through
            doc.get_one(db).await?;
        }

        if doc.n >= limit {
            return Err(HTTPError::new(
                429,
                format!("Daily post limit reached ({}/{})", doc.n, limit),
            )
            .into());
        }

        let n = doc.n + 1;
        let now = unix_ms() as i64;
        let query = "UPDATE post_quota SET n=?,updated_at=? WHERE uid=? AND day=? IF n=?";
        let params = (n, now, uid.to_cql(), day, doc.n);
        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(
                409,
                "Post quota conflict, please try again".to_string(),
            )
            .into());
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use crate::conf;
    use crate::db;
    use axum_web::erring;
    use tokio::sync::OnceCell;

    use super::*;

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
        quota_reserve_works().await;
    }

    async fn quota_reserve_works() {
        let db = get_db().await;
        let uid = xid::new();
        let day = 19900;

        assert_eq!(PostQuota::reserve(db, uid, day, 2).await.unwrap(), 1);
        assert_eq!(PostQuota::reserve(db, uid, day, 2).await.unwrap(), 2);

        let res = PostQuota::reserve(db, uid, day, 2).await;
        assert!(res.is_err());
        let err: erring::HTTPError = res.unwrap_err().into();
        assert_eq!(err.code, 429);

        // the next day starts fresh
        assert_eq!(PostQuota::reserve(db, uid, day + 1, 2).await.unwrap(), 1);

        let mut doc = PostQuota::with_pk(uid, day);
        doc.get_one(db).await.unwrap();
        assert_eq!(doc.n, 2);
    }
}
