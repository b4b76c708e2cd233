use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied, MAX_ID};

pub const KIND_LIKE: i8 = 0;
pub const KIND_COMMENT: i8 = 1;
pub const KIND_UPVOTE: i8 = 2;
pub const KIND_FOLLOW: i8 = 3;
pub const KIND_SPOTLIGHT: i8 = 4;
pub const KIND_TRENDING: i8 = 5;

const PREVIEW_LEN: usize = 50;

#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct Notification {
    pub uid: xid::Id, // recipient
    pub id: xid::Id,
    pub kind: i8, // KIND_*
    pub actor_id: xid::Id,
    pub actor_name: String,
    pub actor_photo: String,
    pub post_id: xid::Id, // zero for follow notifications
    pub post_content: String,
    pub comment_content: String,
    pub read: bool,
    pub created_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

/// First PREVIEW_LEN characters of the referenced content, the rest
/// replaced with an ellipsis.
pub fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_LEN {
        let cut: String = content.chars().take(PREVIEW_LEN).collect();
        return cut + "...";
    }
    content.to_string()
}

impl Notification {
    pub fn with_pk(uid: xid::Id, id: xid::Id) -> Self {
        Self {
            uid,
            id,
            ..Default::default()
        }
    }

    pub async fn get_one(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<()> {
        let fields = Self::fields();
        self._fields = fields.clone();

        let query = format!(
            "SELECT {} FROM notification WHERE uid=? AND id=? LIMIT 1",
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
            "INSERT INTO notification ({}) VALUES ({}) IF NOT EXISTS",
            cols_name.join(","),
            vals_name.join(",")
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(
                409,
                "Notification save failed, please try again".to_string(),
            )
            .into());
        }

        Ok(true)
    }

    /// Fire-and-forget emitter used after successful engagement writes.
    /// Self-notifications are silently skipped; emit failures are the
    /// caller's to log, never to propagate.
    #[allow(clippy::too_many_arguments)]
    pub async fn emit(
        db: &scylladb::ScyllaDB,
        target: xid::Id,
        kind: i8,
        actor: xid::Id,
        actor_name: String,
        actor_photo: String,
        post_id: xid::Id,
        post_content: &str,
        comment_content: &str,
    ) -> anyhow::Result<()> {
        if target == actor {
            return Ok(());
        }

        let mut doc = Self::with_pk(target, xid::new());
        doc.kind = kind;
        doc.actor_id = actor;
        doc.actor_name = actor_name;
        doc.actor_photo = actor_photo;
        doc.post_id = post_id;
        doc.post_content = preview(post_content);
        doc.comment_content = preview(comment_content);
        doc.save(db).await?;
        Ok(())
    }

    pub async fn list_by_uid(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        page_size: u16,
        page_token: Option<xid::Id>,
    ) -> anyhow::Result<Vec<Self>> {
        let fields = Self::fields();

        let token = match page_token {
            Some(id) => id,
            None => MAX_ID,
        };

        let query = format!(
            "SELECT {} FROM notification WHERE uid=? AND id<? LIMIT ? USING TIMEOUT 3s",
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

    pub async fn mark_read(&mut self, db: &scylladb::ScyllaDB) -> anyhow::Result<bool> {
        self.get_one(db).await?;
        if self.read {
            return Ok(false);
        }

        let query = "UPDATE notification SET read=? WHERE uid=? AND id=?";
        let params = (true, self.uid.to_cql(), self.id.to_cql());
        let _ = db.execute(query, params).await?;
        self.read = true;
        Ok(true)
    }

    /// Marks every unread notification for the user, returning how many
    /// were flipped.
    pub async fn mark_all_read(db: &scylladb::ScyllaDB, uid: xid::Id) -> anyhow::Result<usize> {
        let query = "SELECT id FROM notification WHERE uid=? AND read=? ALLOW FILTERING";
        let params = (uid.to_cql(), false);
        let rows = db.execute_iter(query, params).await?;

        let fields = vec!["id".to_string()];
        let mut flipped = 0usize;
        for row in rows {
            let mut cols = ColumnsMap::with_capacity(1);
            cols.fill(row, &fields)?;
            let id: xid::Id = cols.get_as("id")?;

            let query = "UPDATE notification SET read=? WHERE uid=? AND id=?";
            let params = (true, uid.to_cql(), id.to_cql());
            let _ = db.execute(query, params).await?;
            flipped += 1;
        }

        Ok(flipped)
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

    #[test]
    fn preview_works() {
        assert_eq!(preview(""), "");
        assert_eq!(preview("short"), "short");

        let long = "x".repeat(80);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), 53);
        assert!(cut.ends_with("..."));

        // multi-byte content must not split a character
        let emoji = "🦀".repeat(60);
        let cut = preview(&emoji);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 53);
    }

    #[tokio::test(flavor = "current_thread")]
    #[ignore]
    async fn test_all() {
        notification_model_works().await;
    }

    async fn notification_model_works() {
        let db = get_db().await;
        let target = xid::new();
        let actor = xid::new();
        let post_id = xid::new();

        // self-notifications are skipped
        Notification::emit(
            db,
            target,
            KIND_UPVOTE,
            target,
            "Me".to_string(),
            "".to_string(),
            post_id,
            "my own post",
            "",
        )
        .await
        .unwrap();
        let res = Notification::list_by_uid(db, target, 10, None).await.unwrap();
        assert!(res.is_empty());

        Notification::emit(
            db,
            target,
            KIND_UPVOTE,
            actor,
            "Ana".to_string(),
            "".to_string(),
            post_id,
            "a post worth shouting about, with a caption long enough to be cut",
            "",
        )
        .await
        .unwrap();

        let res = Notification::list_by_uid(db, target, 10, None).await.unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].kind, KIND_UPVOTE);
        assert_eq!(res[0].actor_id, actor);
        assert!(!res[0].read);
        assert!(res[0].post_content.ends_with("..."));

        let mut doc = Notification::with_pk(target, res[0].id);
        assert!(doc.mark_read(db).await.unwrap());
        assert!(!doc.mark_read(db).await.unwrap()); // already read

        Notification::emit(
            db,
            target,
            KIND_FOLLOW,
            actor,
            "Ana".to_string(),
            "".to_string(),
            xid::Id::default(),
            "",
            "",
        )
        .await
        .unwrap();
        assert_eq!(Notification::mark_all_read(db, target).await.unwrap(), 1);
    }
}
