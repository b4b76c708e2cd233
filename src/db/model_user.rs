use std::collections::HashSet;

use axum_web::context::unix_ms;
use axum_web::erring::HTTPError;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use scylla_orm_macros::CqlOrm;

use crate::db::{scylladb, scylladb::extract_applied};

/// Profile document. name and photo are the snapshot denormalized onto
/// posts and comments at creation time; followers/following are id sets
/// maintained from both sides of a follow.
#[derive(Debug, Default, Clone, CqlOrm, PartialEq)]
pub struct User {
    pub id: xid::Id,
    pub name: String,
    pub photo: String,
    pub bio: String,
    pub followers: HashSet<xid::Id>,
    pub following: HashSet<xid::Id>,
    pub created_at: i64,
    pub updated_at: i64,

    pub _fields: Vec<String>, // selected fields, ignored by CqlOrm
}

impl User {
    pub fn with_pk(id: xid::Id) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub async fn get_one(
        &mut self,
        db: &scylladb::ScyllaDB,
        select_fields: Vec<String>,
    ) -> anyhow::Result<()> {
        let fields = if select_fields.is_empty() {
            Self::fields()
        } else {
            let all = Self::fields();
            for field in &select_fields {
                if !all.contains(field) {
                    return Err(HTTPError::new(400, format!("Invalid field: {}", field)).into());
                }
            }
            select_fields
        };
        self._fields = fields.clone();

        let query = format!("SELECT {} FROM user WHERE id=? LIMIT 1", fields.join(","));
        let params = (self.id.to_cql(),);
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
            "INSERT INTO user ({}) VALUES ({}) IF NOT EXISTS",
            cols_name.join(","),
            vals_name.join(",")
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(409, format!("User {} already exists", self.id)).into());
        }

        Ok(true)
    }

    pub async fn update_profile(
        &mut self,
        db: &scylladb::ScyllaDB,
        cols: ColumnsMap,
        updated_at: i64,
    ) -> anyhow::Result<bool> {
        let valid_fields = ["name", "photo", "bio"];
        let update_fields = cols.keys();
        for field in &update_fields {
            if !valid_fields.contains(&field.as_str()) {
                return Err(HTTPError::new(400, format!("Invalid field: {}", field)).into());
            }
        }

        let mut set_fields: Vec<String> = Vec::with_capacity(update_fields.len() + 1);
        let mut params: Vec<CqlValue> = Vec::with_capacity(update_fields.len() + 1 + 2);

        let new_updated_at = unix_ms() as i64;
        set_fields.push("updated_at=?".to_string());
        params.push(new_updated_at.to_cql());
        for field in &update_fields {
            set_fields.push(format!("{}=?", field));
            params.push(cols.get(field).unwrap().to_owned());
        }

        let query = format!(
            "UPDATE user SET {} WHERE id=? IF updated_at=?",
            set_fields.join(",")
        );
        params.push(self.id.to_cql());
        params.push(updated_at.to_cql());

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(
                409,
                "User update failed, please try again".to_string(),
            )
            .into());
        }

        self.updated_at = new_updated_at;
        Ok(true)
    }

    /// Records uid following target on both documents. Idempotent: an
    /// existing follow is a no-op. The two writes are independent, the
    /// sets can disagree transiently.
    pub async fn follow(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        target: xid::Id,
    ) -> anyhow::Result<bool> {
        if uid == target {
            return Err(HTTPError::new(400, "Cannot follow yourself".to_string()).into());
        }

        let mut actor = User::with_pk(uid);
        actor.get_one(db, Vec::new()).await?;
        let mut other = User::with_pk(target);
        other.get_one(db, Vec::new()).await?;

        if actor.following.contains(&target) {
            return Ok(false);
        }

        let mut following = actor.following.clone();
        following.insert(target);
        actor.set_edges(db, "following", &following).await?;

        let mut followers = other.followers.clone();
        followers.insert(uid);
        other.set_edges(db, "followers", &followers).await?;

        Ok(true)
    }

    pub async fn unfollow(
        db: &scylladb::ScyllaDB,
        uid: xid::Id,
        target: xid::Id,
    ) -> anyhow::Result<bool> {
        let mut actor = User::with_pk(uid);
        actor.get_one(db, Vec::new()).await?;
        let mut other = User::with_pk(target);
        other.get_one(db, Vec::new()).await?;

        if !actor.following.contains(&target) {
            return Ok(false);
        }

        let mut following = actor.following.clone();
        following.remove(&target);
        actor.set_edges(db, "following", &following).await?;

        let mut followers = other.followers.clone();
        followers.remove(&uid);
        other.set_edges(db, "followers", &followers).await?;

        Ok(true)
    }

    async fn set_edges(
        &mut self,
        db: &scylladb::ScyllaDB,
        field: &str,
        edges: &HashSet<xid::Id>,
    ) -> anyhow::Result<()> {
        let new_updated_at = unix_ms() as i64;
        let query = format!(
            "UPDATE user SET {}=?,updated_at=? WHERE id=? IF updated_at=?",
            field
        );
        let params = (
            edges.to_cql(),
            new_updated_at,
            self.id.to_cql(),
            self.updated_at,
        );

        let res = db.execute(query, params).await?;
        if !extract_applied(res) {
            return Err(HTTPError::new(
                409,
                "Follow update failed, please try again".to_string(),
            )
            .into());
        }

        self.updated_at = new_updated_at;
        Ok(())
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
        user_model_works().await;
        follow_works().await;
    }

    async fn user_model_works() {
        let db = get_db().await;
        let id = xid::new();

        let mut doc = User::with_pk(id);
        doc.name = "Jarvis".to_string();

        let res = doc.get_one(db, vec![]).await;
        assert!(res.is_err());

        assert!(doc.save(db).await.unwrap());
        let res = doc.save(db).await;
        let err: erring::HTTPError = res.unwrap_err().into();
        assert_eq!(err.code, 409);

        let mut cols = ColumnsMap::new();
        cols.set_as("bio", &"builder of things".to_string());
        assert!(doc.update_profile(db, cols, doc.updated_at).await.unwrap());

        let mut doc2 = User::with_pk(id);
        doc2.get_one(db, vec![]).await.unwrap();
        assert_eq!(doc2.bio.as_str(), "builder of things");

        let mut cols = ColumnsMap::new();
        cols.set_as("followers", &HashSet::<xid::Id>::new());
        let res = doc.update_profile(db, cols, doc.updated_at).await;
        let err: erring::HTTPError = res.unwrap_err().into();
        assert_eq!(err.code, 400); // follower edges are not profile fields
    }

    async fn follow_works() {
        let db = get_db().await;
        let a = xid::new();
        let b = xid::new();

        let mut doc = User::with_pk(a);
        doc.name = "A".to_string();
        doc.save(db).await.unwrap();
        let mut doc = User::with_pk(b);
        doc.name = "B".to_string();
        doc.save(db).await.unwrap();

        let res = User::follow(db, a, a).await;
        let err: erring::HTTPError = res.unwrap_err().into();
        assert_eq!(err.code, 400); // self-follow

        assert!(User::follow(db, a, b).await.unwrap());
        assert!(!User::follow(db, a, b).await.unwrap()); // idempotent

        let mut doc = User::with_pk(b);
        doc.get_one(db, vec![]).await.unwrap();
        assert!(doc.followers.contains(&a));

        assert!(User::unfollow(db, a, b).await.unwrap());
        assert!(!User::unfollow(db, a, b).await.unwrap());

        let mut doc = User::with_pk(b);
        doc.get_one(db, vec![]).await.unwrap();
        assert!(!doc.followers.contains(&a));
    }
}
