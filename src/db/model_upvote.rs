use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied, MAX_ID};

/// Join row recording one user's upvote on one post. The conditional
/// insert is the duplicate guard; the row is also what an un-upvote
/// reverses. post_uid is denormalized so reversal and reconciliation can
/// reach the post partition without a lookup.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct Upvote {
    pub post_id: xid::Id,
    pub uid: xid::Id, // voter
    pub post_uid: xid::Id,
    pub created_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl Upvote {
    pub fn with_pk(post_id: xid::Id, uid: xid::Id) -> Self {
        Self {
            post_id,
            uid,
            ..Default::default()
        }
    }

    pub async fn get_one(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<()> {
        let fields = Self::fields();
        self._fields = fields.clone();

        let query = format!(
            "SELECT {} FROM upvote WHERE post_id=? AND uid=? LIMIT 1",
            fields.join(",")
        );
        let params = (self.post_id.to_cql(), self.uid.to_cql());
        let res = db.execute(query, params).await?.single_row()?;

        let mut cols = ColumnsMap::with_capacity(fields.len());
        cols.fill(res, &fields)?;
        self.fill(&cols);

        Ok(())
    }

    pub async fn save(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        self.created_at = unix_ms() as i64;

        let fields = Self::fields();
        self._fields = fields.clone();

        let mut cols_name: Vec<&str> = Vec::with_capacity(fields.len());
        let mut vals_name: Vec<&str> = Vec::with_capacity(fields.len());
        let mut params: Vec<&CqlValue> = Vec::with_capacity(fields.len());
        let cols = self.to();

        for field in &fields {
            cols_name.push(field);
            vals_name.push("?");
            params.push(cols.get(field).unwrap());
        }

        let query = format!(
            "INSERT INTO upvote ({}) VALUES ({}) IF NOT EXISTS",
            cols_name.join(","),
            vals_name.join(",")
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(
                409,
                "User has already upvoted this post".to_string(),
            )
            .into());
        }

        Ok(true)
    }

    pub async fn delete(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        let res = self.get_one(db).await;
        if res.is_err() {
            return Err(HTTPError::new(404, "Upvote not found".to_string()).into());
        }

        let query = "DELETE FROM upvote WHERE post_id=? AND uid=?";
        let params = (self.post_id.to_cql(), self.uid.to_cql());
        let _ = db.execute(query, params).await?;

        Ok(true)
    }

    pub async fn list_by_post(
        db: &scylladb::ScyllaDB,
        post_id: xid::Id,
    ) -> anyhow::Result<Vec<Self>> {
        let fields = Self::fields();

        let query = format!(
            "SELECT {} FROM upvote WHERE post_id=? USING TIMEOUT 3s",
            fields.clone().join(",")
        );
        let params = (post_id.to_cql(),);
        let rows = db.execute_iter(query, params).await?;

        let mut res: Vec<Self> = Vec::with_capacity(rows.len());
        for row in rows {
            let mut doc = Self::default();
            let mut cols = ColumnsMap::with_capacity(fields.len());
            cols.fill(row, &fields)?;
            doc.fill(&cols);
            doc._fields = fields.clone();
            res.push(doc);
        }

        res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(res)
    }

    /// Ids of posts the user has upvoted, for hydrating the client's
    /// upvoted state. Served by the secondary index on uid.
    pub async fn list_post_ids_by_uid(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        page_size: u16,
        page_token: Option<xid::Id>,
    ) -> anyhow::Result<Vec<xid::Id>> {
        let token = match page_token {
            Some(id) => id,
            None => MAX_ID,
        };

        let query =
            "SELECT post_id FROM upvote WHERE uid=? AND post_id<? LIMIT ? ALLOW FILTERING";
        let params = (uid.to_cql(), token.to_cql(), page_size as i32);
        let rows = db.execute_iter(query, params).await?;

        let fields = vec!["post_id".to_string()];
        let mut res: Vec<xid::Id> = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cols = ColumnsMap::with_capacity(1);
            cols.fill(row, &fields)?;
            res.push(cols.get_as("post_id")?);
        }

        Ok(res)
    }

    pub async fn count_by_post(db: &scylladb::ScyllaDB, post_id: xid::Id) -> anyhow::Result<i64> {
        let query = "SELECT COUNT(*) FROM upvote WHERE post_id=?";
        let params = (post_id.to_cql(),);
        let res = db.execute(query, params).await?.single_row()?;
        let count = res.columns[0].as_ref().and_then(|v| v.as_bigint());
        Ok(count.unwrap_or(0))
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
        upvote_model_works().await;
    }

    async fn upvote_model_works() {
        let db = get_db().await;
        let post_id = xid::new();
        let post_uid = xid::new();
        let voter = xid::new();

        // create
        {
            let mut doc = Upvote::with_pk(post_id, voter);
            doc.post_uid = post_uid;

            let res = doc.get_one(db).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 404);

            assert!(doc.save(db).await.unwrap());
            let res = doc.save(db).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into(); // one per (post, user)
            assert_eq!(err.code, 409);

            let votes = Upvote::list_by_post(db, post_id).await.unwrap();
            assert_eq!(votes.len(), 1);
            assert_eq!(votes[0].uid, voter);
            assert_eq!(votes[0].post_uid, post_uid);

            assert_eq!(Upvote::count_by_post(db, post_id).await.unwrap(), 1);

            let ids = Upvote::list_post_ids_by_uid(db, voter, 10, None)
                .await
                .unwrap();
            assert!(ids.contains(&post_id));
        }

        // delete
        {
            let mut doc = Upvote::with_pk(post_id, voter);
            assert!(doc.delete(db).await.unwrap());

            let res = doc.delete(db).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 404); // already removed

            assert_eq!(Upvote::count_by_post(db, post_id).await.unwrap(), 0);
        }
    }
}
