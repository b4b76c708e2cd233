use futures::stream::StreamExt;
use scylla_orm::{ColumnsMap, CqlValue, ToCqlVal};
use structured_logger::{async_json::new_writer, unix_ms, Builder};
use tokio::io;

use pulse::{conf, db};

/// Picks the post with the most all-time likes and flags it as the post
/// of the week, clearing any previously flagged posts. Clearing and
/// setting happen in one batch so readers never observe two winners.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();

    let nodes = std::env::var("SCYLLA_NODES")
        .expect("env SCYLLA_NODES required:\nSCYLLA_NODES=127.0.0.1:9042 ./post-of-week");

    let cfg = conf::ScyllaDB {
        nodes: nodes.split(',').map(|s| s.to_string()).collect(),
        username: "".to_string(),
        password: "".to_string(),
    };

    let sess = db::scylladb::ScyllaDB::new(cfg, "pulse").await?;
    let post_fields = vec![
        "uid".to_string(),
        "id".to_string(),
        "likes".to_string(),
        "is_post_of_week".to_string(),
        "created_at".to_string(),
    ];
    let query = format!("SELECT {} FROM post", post_fields.join(","));
    let mut stream = sess.stream(query, ()).await?;

    let mut total: usize = 0;
    let mut flagged: Vec<db::Post> = Vec::new();
    let mut winner: Option<db::Post> = None;
    while let Some(row) = stream.next().await {
        let mut cols = ColumnsMap::with_capacity(post_fields.len());
        cols.fill(row?, &post_fields)?;
        let mut doc = db::Post::default();
        doc.fill(&cols);
        total += 1;

        if doc.is_post_of_week {
            flagged.push(doc.clone());
        }

        winner = match winner {
            None => Some(doc),
            Some(best)
                if doc.likes > best.likes
                    || (doc.likes == best.likes && doc.created_at < best.created_at) =>
            {
                Some(doc)
            }
            keep => keep,
        };
    }

    let winner = match winner {
        Some(winner) => winner,
        None => {
            println!("no posts found to select from");
            return Ok(());
        }
    };

    let clear_query = "UPDATE post SET is_post_of_week=false WHERE uid=? AND id=?";
    let set_query = "UPDATE post SET is_post_of_week=true,post_of_week_at=? WHERE uid=? AND id=?";

    let mut statements: Vec<&str> = Vec::with_capacity(flagged.len() + 1);
    let mut values: Vec<Vec<CqlValue>> = Vec::with_capacity(flagged.len() + 1);
    let mut cleared: usize = 0;
    for doc in &flagged {
        if doc.uid == winner.uid && doc.id == winner.id {
            continue;
        }
        statements.push(clear_query);
        values.push(vec![doc.uid.to_cql(), doc.id.to_cql()]);
        cleared += 1;
    }
    statements.push(set_query);
    values.push(vec![
        (unix_ms() as i64).to_cql(),
        winner.uid.to_cql(),
        winner.id.to_cql(),
    ]);

    sess.batch(statements, values).await?;

    println!(
        "total: {}, cleared: {}, winner: {} ({} likes)",
        total, cleared, winner.id, winner.likes
    );

    Ok(())
}
