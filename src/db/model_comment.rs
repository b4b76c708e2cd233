use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied, MAX_ID};

#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct Comment {
    pub post_id: xid::Id,
    pub id: xid::Id,
    pub uid: xid::Id, // comment author
    pub author_name: String,
    pub author_photo: String,
    pub content: String,
    pub created_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl Comment {
    pub fn with_pk(post_id: xid::Id, id: xid::Id) -> Self {
        Self {
            post_id,
            id,
            ..Default::default()
        }
    }

    pub fn select_fields(select_fields: Vec<String>, with_pk: bool) -> anyhow::Result<Vec<String>> {
        if select_fields.is_empty() {
            return Ok(Self::fields());
        }

        let fields = Self::fields();
        for field in &select_fields {
            if !fields.contains(field) {
                return Err(HTTPError::new(400, format!("Invalid field: {}", field)).into());
            }
        }

        let mut select_fields = select_fields;
        let field = "uid".to_string();
        if !select_fields.contains(&field) {
            select_fields.push(field);
        }

        if with_pk {
            let field = "post_id".to_string();
            if !select_fields.contains(&field) {
                select_fields.push(field);
            }
            let field = "id".to_string();
            if !select_fields.contains(&field) {
                select_fields.push(field);
            }
        }

        Ok(select_fields)
    }

    pub async fn get_one(
        &mut self,
        db: &scylladb::ScyllaDB,
        select_fields: Vec<String>,
    ) -> anyhow::Result<()> {
        let fields = Self::select_fields(select_fields, false)?;
        self._fields = fields.clone();

        let query = format!(
            "SELECT {} FROM comment WHERE post_id=? AND id=? LIMIT 1",
            fields.join(",")
        );
        let params = (self.post_id.to_cql(), self.id.to_cql());
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
            "INSERT INTO comment ({}) VALUES ({}) IF NOT EXISTS",
            cols_name.join(","),
            vals_name.join(",")
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(
                HTTPError::new(409, "Comment save failed, please try again".to_string()).into(),
            );
        }

        Ok(true)
    }

    pub async fn delete(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        let res = self.get_one(db, Vec::new()).await;
        if res.is_err() {
            return Ok(false); // already deleted
        }

        let query = "DELETE FROM comment WHERE post_id=? AND id=?";
        let params = (self.post_id.to_cql(), self.id.to_cql());
        let _ = db.execute(query, params).await?;

        Ok(true)
    }

    pub async fn list_by_post(
        db: &scylladb::ScyllaDB,
        post_id: xid::Id,
        select_fields: Vec<String>,
        page_size: u16,
        page_token: Option<xid::Id>,
    ) -> anyhow::Result<Vec<Self>> {
        let fields = Self::select_fields(select_fields, true)?;

        let token = match page_token {
            Some(id) => id,
            None => MAX_ID,
        };

        let query = format!(
            "SELECT {} FROM comment WHERE post_id=? AND id<? LIMIT ? USING TIMEOUT 3s",
            fields.clone().join(",")
        );
        let params = (post_id.to_cql(), token.to_cql(), page_size as i32);
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

        Ok(res)
    }

    /// Live count of a post's comments, the source of truth the delete
    /// path writes back to comments_count.
    pub async fn count_by_post(db: &scylladb::ScyllaDB, post_id: xid::Id) -> anyhow::Result<i64> {
        let query = "SELECT COUNT(*) FROM comment WHERE post_id=?";
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
        comment_model_works().await;
    }

    async fn comment_model_works() {
        let db = get_db().await;
        let post_id = xid::new();
        let uid = xid::new();
        let id = xid::new();

        // create
        {
            let mut doc = Comment::with_pk(post_id, id);
            doc.uid = uid;
            doc.author_name = "Ana".to_string();
            doc.content = "Nice shot!".to_string();

            let res = doc.get_one(db, vec![]).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 404);

            assert!(doc.save(db).await.unwrap());

            let mut doc2 = Comment::with_pk(post_id, id);
            doc2.get_one(db, vec![]).await.unwrap();
            assert_eq!(doc2.content.as_str(), "Nice shot!");
            assert_eq!(doc2.uid, uid);

            assert_eq!(Comment::count_by_post(db, post_id).await.unwrap(), 1);

            let res = Comment::list_by_post(db, post_id, Vec::new(), 10, None)
                .await
                .unwrap();
            assert_eq!(res.len(), 1);
        }

        // delete recount
        {
            let mut doc = Comment::with_pk(post_id, id);
            assert!(doc.delete(db).await.unwrap());
            assert!(!doc.delete(db).await.unwrap()); // already deleted
            assert_eq!(Comment::count_by_post(db, post_id).await.unwrap(), 0);
        }
    }
}
