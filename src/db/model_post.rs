use std::collections::HashSet;

use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied, xid_at, MAX_ID};
use crate::engagement::{day_start_ms, day_start_secs, unix_day};

pub const KIND_TEXT: i8 = 0;
pub const KIND_IMAGE: i8 = 1;
pub const KIND_THREAD: i8 = 2;

/// A post document. The author id is the partition key, so every posting
/// and quota query stays inside one partition; cross-cutting reads go
/// through the per-day PostDay index.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct Post {
    pub uid: xid::Id, // author
    pub id: xid::Id,
    pub kind: i8, // KIND_*
    pub author_name: String,
    pub author_photo: String,
    pub content: String,
    pub image_url: String,
    pub thread_id: xid::Id, // zero unless the post belongs to a thread
    pub day: i32,           // UTC day of creation
    pub daily_index: i16,   // per-(author, day) sequence, 0 for thread replies
    pub likes: i32,
    pub liked_by: HashSet<xid::Id>,
    pub upvotes_count: i32,
    pub upvoted_by: HashSet<xid::Id>,
    pub comments_count: i32,
    pub is_spotlight: bool,
    pub spotlight_day: i32,
    pub is_post_of_week: bool,
    pub post_of_week_at: i64,
    pub created_at: i64,
    pub updated_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

/// Per-day index row, written alongside every post so the trending ranker
/// and the spotlight selector can scan a calendar day without touching
/// author partitions.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct PostDay {
    pub day: i32,
    pub id: xid::Id,
    pub uid: xid::Id,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl Post {
    pub fn with_pk(uid: xid::Id, id: xid::Id) -> Self {
        Self {
            uid,
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
        let field = "kind".to_string();
        if !select_fields.contains(&field) {
            select_fields.push(field);
        }
        let field = "created_at".to_string();
        if !select_fields.contains(&field) {
            select_fields.push(field);
        }

        if with_pk {
            let field = "uid".to_string();
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
            "SELECT {} FROM post WHERE uid=? AND id=? LIMIT 1",
            fields.join(",")
        );
        let params = (self.uid.to_cql(), self.id.to_cql());
        let res = db.execute(query, params).await?.single_row()?;

        let mut cols = ColumnsMap::with_capacity(fields.len());
        cols.fill(res, &fields)?;
        self.fill(&cols);

        Ok(())
    }

    pub async fn save(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        let now = unix_ms() as i64;
        self.created_at = now;
        self.updated_at = now;
        self.day = unix_day(now);

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
            "INSERT INTO post ({}) VALUES ({}) IF NOT EXISTS",
            cols_name.join(","),
            vals_name.join(",")
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(409, "Post save failed, please try again".to_string()).into());
        }

        let mut index = PostDay {
            day: self.day,
            id: self.id,
            uid: self.uid,
            ..Default::default()
        };
        index.upsert(db).await?;

        Ok(true)
    }

    pub async fn delete(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        let res = self.get_one(db, vec!["day".to_string()]).await;
        if res.is_err() {
            return Ok(false); // already deleted
        }

        let query = "DELETE FROM post WHERE uid=? AND id=?";
        let params = (self.uid.to_cql(), self.id.to_cql());
        let _ = db.execute(query, params).await?;

        let query = "DELETE FROM post_day WHERE day=? AND id=?";
        let params = (self.day, self.id.to_cql());
        let _ = db.execute(query, params).await?;

        Ok(true)
    }

    pub async fn list_by_uid(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
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
            "SELECT {} FROM post WHERE uid=? AND id<? LIMIT ? USING TIMEOUT 3s",
            fields.clone().join(",")
        );
        let params = (uid.to_cql(), token.to_cql(), page_size as i32);
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

    /// Posts the author created within the given UTC day, oldest first.
    /// The id range narrows the scan to the day's partition slice; the
    /// created_at filter is the authoritative boundary.
    pub async fn list_by_uid_in_day(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        day: i32,
    ) -> anyhow::Result<Vec<Self>> {
        let fields = vec![
            "id".to_string(),
            "daily_index".to_string(),
            "thread_id".to_string(),
            "created_at".to_string(),
        ];

        let query = format!(
            "SELECT {} FROM post WHERE uid=? AND id>=? AND id<? USING TIMEOUT 3s",
            fields.clone().join(",")
        );
        let params = (
            uid.to_cql(),
            xid_at(day_start_secs(day)).to_cql(),
            xid_at(day_start_secs(day + 1)).to_cql(),
        );
        let rows = db.execute_iter(query, params).await?;

        let start_ms = day_start_ms(day);
        let end_ms = day_start_ms(day + 1);
        let mut res: Vec<Self> = Vec::with_capacity(rows.len());
        for row in rows {
            let mut doc = Self::with_pk(uid, xid::Id::default());
            let mut cols = ColumnsMap::with_capacity(fields.len());
            cols.fill(row, &fields)?;
            doc.fill(&cols);
            doc._fields = fields.clone();
            if doc.created_at >= start_ms && doc.created_at < end_ms {
                res.push(doc);
            }
        }

        res.sort_by_key(|doc| doc.created_at);
        Ok(res)
    }

    pub async fn batch_get(
        db: &scylladb::ScyllaDB,
        ids: Vec<(xid::Id, xid::Id)>,
        select_fields: Vec<String>,
    ) -> anyhow::Result<Vec<Self>> {
        let mut res: Vec<Self> = Vec::with_capacity(ids.len());
        for (uid, id) in ids {
            let mut doc = Self::with_pk(uid, id);
            // the day index may lag a deleted post, skip the hole
            if doc.get_one(db, select_fields.clone()).await.is_ok() {
                res.push(doc);
            }
        }
        Ok(res)
    }

    /// Adds or removes the user from liked_by, moving the counter with the
    /// set in one conditional write. Returns true when the post ends up
    /// liked by the user.
    pub async fn toggle_like(
        &mut self,
        db: &scylladb::ScyllaDB,
        user: xid::Id,
    ) -> anyhow::Result<bool> {
        self.get_one(
            db,
            vec![
                "likes".to_string(),
                "liked_by".to_string(),
                "updated_at".to_string(),
            ],
        )
        .await?;

        let mut liked_by = self.liked_by.clone();
        let liked = if liked_by.contains(&user) {
            liked_by.remove(&user);
            false
        } else {
            liked_by.insert(user);
            true
        };
        let likes = liked_by.len() as i32;

        let new_updated_at = unix_ms() as i64;
        let query =
            "UPDATE post SET likes=?,liked_by=?,updated_at=? WHERE uid=? AND id=? IF updated_at=?";
        let params = (
            likes,
            liked_by.to_cql(),
            new_updated_at,
            self.uid.to_cql(),
            self.id.to_cql(),
            self.updated_at,
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(409, "Like failed, please try again".to_string()).into());
        }

        self.likes = likes;
        self.liked_by = liked_by;
        self.updated_at = new_updated_at;
        Ok(liked)
    }

    /// Applies an upvote (or its reversal) to the loaded post. The caller
    /// must have fetched the document first; the stored updated_at guards
    /// the write.
    pub async fn apply_upvote(
        &mut self,
        db: &scylladb::ScyllaDB,
        voter: xid::Id,
        add: bool,
    ) -> anyhow::Result<()> {
        let mut upvoted_by = self.upvoted_by.clone();
        if add {
            if self.uid == voter {
                return Err(
                    HTTPError::new(400, "Cannot upvote your own post".to_string()).into(),
                );
            }
            if !upvoted_by.insert(voter) {
                return Err(HTTPError::new(
                    409,
                    "User has already upvoted this post".to_string(),
                )
                .into());
            }
        } else if !upvoted_by.remove(&voter) {
            return Err(HTTPError::new(404, "Upvote not found".to_string()).into());
        }
        let upvotes_count = upvoted_by.len() as i32;

        let new_updated_at = unix_ms() as i64;
        let query = "UPDATE post SET upvotes_count=?,upvoted_by=?,updated_at=? WHERE uid=? AND id=? IF updated_at=?";
        let params = (
            upvotes_count,
            upvoted_by.to_cql(),
            new_updated_at,
            self.uid.to_cql(),
            self.id.to_cql(),
            self.updated_at,
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(409, "Upvote failed, please try again".to_string()).into());
        }

        self.upvotes_count = upvotes_count;
        self.upvoted_by = upvoted_by;
        self.updated_at = new_updated_at;
        Ok(())
    }

    pub async fn incr_comments_count(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<()> {
        let count = self.comments_count.saturating_add(1);
        self.set_comments_count(db, count).await
    }

    /// Writes an absolute comments_count; the delete path recounts from
    /// the comment table and calls this, repairing any drift.
    pub async fn set_comments_count(
        &mut self,
        db: &scylladb::ScyllaDB,
        count: i32,
    ) -> anyhow::Result<()> {
        let new_updated_at = unix_ms() as i64;
        let query =
            "UPDATE post SET comments_count=?,updated_at=? WHERE uid=? AND id=? IF updated_at=?";
        let params = (
            count,
            new_updated_at,
            self.uid.to_cql(),
            self.id.to_cql(),
            self.updated_at,
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(
                HTTPError::new(409, "Comment count update failed, please try again".to_string())
                    .into(),
            );
        }

        self.comments_count = count;
        self.updated_at = new_updated_at;
        Ok(())
    }

    pub async fn mark_spotlight(
        &mut self,
        db: &scylladb::ScyllaDB,
        day: i32,
    ) -> anyhow::Result<bool> {
        self.get_one(db, vec!["updated_at".to_string()]).await?;

        let new_updated_at = unix_ms() as i64;
        let query = "UPDATE post SET is_spotlight=?,spotlight_day=?,updated_at=? WHERE uid=? AND id=? IF updated_at=?";
        let params = (
            true,
            day,
            new_updated_at,
            self.uid.to_cql(),
            self.id.to_cql(),
            self.updated_at,
        );

        let res = db.execute(query, params).await?;
        let applied = extract_applied(res);
        if applied {
            self.is_spotlight = true;
            self.spotlight_day = day;
            self.updated_at = new_updated_at;
        }
        Ok(applied)
    }
}

impl PostDay {
    pub async fn upsert(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        self._fields = Self::fields();

        let query = "INSERT INTO post_day (day,id,uid) VALUES (?,?,?) IF NOT EXISTS";
        let params = (self.day, self.id.to_cql(), self.uid.to_cql());
        let res = db.execute(query, params).await?;
        Ok(extract_applied(res))
    }

    pub async fn list_by_day(db: &scylladb::ScyllaDB, day: i32) -> anyhow::Result<Vec<Self>> {
        let fields = Self::fields();

        let query = format!(
            "SELECT {} FROM post_day WHERE day=? USING TIMEOUT 3s",
            fields.clone().join(",")
        );
        let params = (day,);
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
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

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
        post_model_works().await;
        like_and_upvote_counters_work().await;
    }

    async fn post_model_works() {
        let db = get_db().await;
        let uid = xid::Id::from_str("jarvis00000000000000").unwrap();
        let id = xid::new();

        // create
        {
            let mut doc = Post::with_pk(uid, id);
            doc.kind = KIND_TEXT;
            doc.author_name = "Jarvis".to_string();
            doc.content = "Hello World".to_string();
            doc.daily_index = 1;

            let res = doc.get_one(db, vec![]).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 404);

            assert!(doc.save(db).await.unwrap());
            let res = doc.save(db).await;
            assert!(res.is_err());
            let err: erring::HTTPError = res.unwrap_err().into(); // can not insert twice
            assert_eq!(err.code, 409);

            assert_eq!(doc.day, unix_day(doc.created_at));

            let mut doc2 = Post::with_pk(uid, id);
            doc2.get_one(db, vec![]).await.unwrap();
            assert_eq!(doc2.content.as_str(), "Hello World");
            assert_eq!(doc2.daily_index, 1);
            assert_eq!(doc2.likes, 0);
            assert!(!doc2.is_spotlight);

            let days = PostDay::list_by_day(db, doc.day).await.unwrap();
            assert!(days.iter().any(|d| d.id == id && d.uid == uid));

            let today = Post::list_by_uid_in_day(db, uid, doc.day).await.unwrap();
            assert!(today.iter().any(|p| p.id == id));
        }

        // list
        {
            let res = Post::list_by_uid(db, uid, Vec::new(), 10, None).await.unwrap();
            assert!(!res.is_empty());
            assert!(res.iter().any(|p| p.id == id));
        }

        // delete
        {
            let mut doc = Post::with_pk(uid, id);
            let res = doc.delete(db).await.unwrap();
            assert!(res);

            let res = doc.delete(db).await.unwrap();
            assert!(!res); // already deleted
        }
    }

    async fn like_and_upvote_counters_work() {
        let db = get_db().await;
        let author = xid::new();
        let fan1 = xid::new();
        let fan2 = xid::new();
        let id = xid::new();

        let mut doc = Post::with_pk(author, id);
        doc.kind = KIND_TEXT;
        doc.content = "counters".to_string();
        doc.daily_index = 1;
        assert!(doc.save(db).await.unwrap());

        // like toggle: on, on (other user), off
        {
            let mut doc = Post::with_pk(author, id);
            assert!(doc.toggle_like(db, fan1).await.unwrap());
            assert_eq!(doc.likes, 1);

            let mut doc = Post::with_pk(author, id);
            assert!(doc.toggle_like(db, fan2).await.unwrap());
            assert_eq!(doc.likes, 2);
            assert_eq!(doc.likes as usize, doc.liked_by.len());

            let mut doc = Post::with_pk(author, id);
            assert!(!doc.toggle_like(db, fan1).await.unwrap());
            assert_eq!(doc.likes, 1);
            assert!(!doc.liked_by.contains(&fan1));
        }

        // upvotes: add two, self-upvote and duplicate rejected, remove one
        {
            let mut doc = Post::with_pk(author, id);
            doc.get_one(db, vec![]).await.unwrap();
            doc.apply_upvote(db, fan1, true).await.unwrap();
            assert_eq!(doc.upvotes_count, 1);

            let res = doc.apply_upvote(db, author, true).await;
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 400); // self-upvote

            let res = doc.apply_upvote(db, fan1, true).await;
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 409); // duplicate

            doc.apply_upvote(db, fan2, true).await.unwrap();
            assert_eq!(doc.upvotes_count, 2);

            doc.apply_upvote(db, fan1, false).await.unwrap();
            assert_eq!(doc.upvotes_count, 1);
            assert!(!doc.upvoted_by.contains(&fan1));

            let res = doc.apply_upvote(db, fan1, false).await;
            let err: erring::HTTPError = res.unwrap_err().into();
            assert_eq!(err.code, 404); // nothing to remove
        }

        // comments count: bump then absolute rewrite
        {
            let mut doc = Post::with_pk(author, id);
            doc.get_one(db, vec![]).await.unwrap();
            doc.incr_comments_count(db).await.unwrap();
            assert_eq!(doc.comments_count, 1);
            doc.set_comments_count(db, 0).await.unwrap();
            assert_eq!(doc.comments_count, 0);
        }

        let mut doc = Post::with_pk(author, id);
        doc.delete(db).await.unwrap();
    }
}
