use std::collections::HashSet;

use futures::stream::StreamExt;
use scylla_orm::{ColumnsMap, ToCqlVal};
use structured_logger::{async_json::new_writer, unix_ms, Builder};
use tokio::io;

use pulse::{conf, db};

/// Walks every post and rewrites denormalized state that has drifted from
/// its source of truth: upvote counters and voter sets from the upvote
/// table, comment counters from the comment table, the like counter from
/// its own liked_by set, and a missing daily_index from the pre-index era.
/// This is the corrective mechanism for the non-atomic write pairs in the
/// engagement paths; it runs out-of-band and writes unconditionally.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();

    let nodes = std::env::var("SCYLLA_NODES")
        .expect("env SCYLLA_NODES required:\nSCYLLA_NODES=127.0.0.1:9042 ./reconcile-counters");

    let cfg = conf::ScyllaDB {
        nodes: nodes.split(',').map(|s| s.to_string()).collect(),
        username: "".to_string(),
        password: "".to_string(),
    };

    let sess = db::scylladb::ScyllaDB::new(cfg, "pulse").await?;
    let post_fields = vec![
        "uid".to_string(),
        "id".to_string(),
        "thread_id".to_string(),
        "daily_index".to_string(),
        "likes".to_string(),
        "liked_by".to_string(),
        "upvotes_count".to_string(),
        "upvoted_by".to_string(),
        "comments_count".to_string(),
    ];
    let query = format!("SELECT {} FROM post", post_fields.join(","));
    let mut stream = sess.stream(query, ()).await?;

    let mut total: usize = 0;
    let mut fixed: usize = 0;
    while let Some(row) = stream.next().await {
        let mut cols = ColumnsMap::with_capacity(post_fields.len());
        cols.fill(row?, &post_fields)?;
        let mut doc = db::Post::default();
        doc.fill(&cols);
        total += 1;

        let votes = db::Upvote::list_by_post(&sess, doc.id).await?;
        let voters: HashSet<xid::Id> = votes.iter().map(|v| v.uid).collect();
        let comments = db::Comment::count_by_post(&sess, doc.id).await? as i32;

        let mut set_fields: Vec<&str> = Vec::new();
        let mut params: Vec<scylla_orm::CqlValue> = Vec::new();

        if doc.upvotes_count != voters.len() as i32 || doc.upvoted_by != voters {
            set_fields.push("upvotes_count=?");
            params.push((voters.len() as i32).to_cql());
            set_fields.push("upvoted_by=?");
            params.push(voters.to_cql());
        }
        if doc.comments_count != comments {
            set_fields.push("comments_count=?");
            params.push(comments.to_cql());
        }
        if doc.likes != doc.liked_by.len() as i32 {
            set_fields.push("likes=?");
            params.push((doc.liked_by.len() as i32).to_cql());
        }
        if doc.daily_index == 0 && doc.thread_id.is_zero() {
            // posts predating the daily index, as the old migration did
            set_fields.push("daily_index=?");
            params.push(1i16.to_cql());
        }

        if set_fields.is_empty() {
            continue;
        }

        set_fields.push("updated_at=?");
        params.push((unix_ms() as i64).to_cql());
        let query = format!(
            "UPDATE post SET {} WHERE uid=? AND id=?",
            set_fields.join(",")
        );
        params.push(doc.uid.to_cql());
        params.push(doc.id.to_cql());
        sess.execute(query, params).await?;
        fixed += 1;
        log::info!(target: "reconcile",
            post = doc.id.to_string(),
            upvotes = voters.len() as u64,
            comments = comments as u64;
            "repaired counters",
        );
    }

    println!("total: {}, fixed: {}", total, fixed);

    Ok(())
}
