use axum_web::context::unix_ms;
use scylla_orm::{ColumnsMap, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied, Post, PostDay};
use crate::engagement::{day_start_ms, spotlight::pick_winner};

/// One row per UTC day naming the community-spotlight post. The day is the
/// whole primary key, so the conditional insert is the idempotency and
/// race guard: repeated or concurrent selections for the same day all
/// converge on the first written row.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct Spotlight {
    pub day: i32,
    pub post_id: xid::Id,
    pub uid: xid::Id, // post author
    pub selected_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl Spotlight {
    pub fn with_pk(day: i32) -> Self {
        Self {
            day,
            ..Default::default()
        }
    }

    pub async fn get_one(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<()> {
        let fields = Self::fields();
        self._fields = fields.clone();

        let query = format!(
            "SELECT {} FROM spotlight WHERE day=? LIMIT 1",
            fields.join(",")
        );
        let params = (self.day,);
        let res = db.execute(query, params).await?.single_row()?;

        let mut cols = ColumnsMap::with_capacity(fields.len());
        cols.fill(res, &fields)?;
        self.fill(&cols);

        Ok(())
    }

    pub async fn save(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        self.selected_at = unix_ms() as i64;
        self._fields = Self::fields();

        let query =
            "INSERT INTO spotlight (day,post_id,uid,selected_at) VALUES (?,?,?,?) IF NOT EXISTS";
        let params = (
            self.day,
            self.post_id.to_cql(),
            self.uid.to_cql(),
            self.selected_at,
        );
        let res = db.execute(query, params).await?;
        Ok(extract_applied(res))
    }

    /// Returns today's spotlight post, electing one from yesterday's posts
    /// if no selection exists yet. Absence of eligible posts is not an
    /// error: the day simply has no spotlight.
    pub async fn select_for_day(
        db: &scylladb::ScyllaDB,
        today: i32,
    ) -> anyhow::Result<Option<Post>> {
        let mut doc = Self::with_pk(today);
        if doc.get_one(db).await.is_ok() {
            let mut post = Post::with_pk(doc.uid, doc.post_id);
            post.get_one(db, Vec::new()).await?;
            return Ok(Some(post));
        }

        let yesterday = today - 1;
        let index = PostDay::list_by_day(db, yesterday).await?;
        let candidates = Post::batch_get(
            db,
            index.iter().map(|d| (d.uid, d.id)).collect(),
            Vec::new(),
        )
        .await?;

        let start_ms = day_start_ms(yesterday);
        let end_ms = day_start_ms(today);
        let candidates: Vec<Post> = candidates
            .into_iter()
            .filter(|p| p.created_at >= start_ms && p.created_at < end_ms)
            .collect();

        let winner = match pick_winner(&candidates) {
            Some(winner) => winner.clone(),
            None => return Ok(None),
        };

        doc.post_id = winner.id;
        doc.uid = winner.uid;
        if !doc.save(db).await? {
            // a concurrent selection won, return its pick
            doc.get_one(db).await?;
            let mut post = Post::with_pk(doc.uid, doc.post_id);
            post.get_one(db, Vec::new()).await?;
            return Ok(Some(post));
        }

        let mut post = Post::with_pk(winner.uid, winner.id);
        if !post.mark_spotlight(db, today).await.unwrap_or(false) {
            // the spotlight row is authoritative, a stale flag only
            // affects the denormalized post document
            log::warn!(target: "spotlight",
                post = winner.id.to_string(),
                day = today;
                "failed to flag spotlight post",
            );
        }
        post.get_one(db, Vec::new()).await?;
        Ok(Some(post))
    }
}

#[cfg(test)]
mod tests {
    use crate::conf;
    use crate::db;
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
        spotlight_model_works().await;
    }

    async fn spotlight_model_works() {
        let db = get_db().await;
        let day = 19901;
        let post_id = xid::new();
        let uid = xid::new();

        let mut doc = Spotlight::with_pk(day);
        let res = doc.get_one(db).await;
        assert!(res.is_err());

        doc.post_id = post_id;
        doc.uid = uid;
        assert!(doc.save(db).await.unwrap());

        // the day is taken, a second claim is not applied
        let mut doc2 = Spotlight::with_pk(day);
        doc2.post_id = xid::new();
        doc2.uid = xid::new();
        assert!(!doc2.save(db).await.unwrap());

        doc2.get_one(db).await.unwrap();
        assert_eq!(doc2.post_id, post_id);
        assert_eq!(doc2.uid, uid);
    }
}
