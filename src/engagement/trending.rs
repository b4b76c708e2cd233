use crate::conf;
use crate::db::{scylladb, Post, PostDay};
use crate::engagement::unix_day;

/// Composite engagement score; weights come from config, the observed
/// policy being upvotes doubled, likes and comments at face value.
pub fn trending_score(post: &Post, w: &conf::TrendingWeights) -> i64 {
    post.upvotes_count as i64 * w.upvote
        + post.likes as i64 * w.like
        + post.comments_count as i64 * w.comment
}

/// Start of the sliding candidate window, trailing `hours` from now. This
/// is not calendar-aligned: a post from 23:30 yesterday is still trending
/// at 00:30 today.
pub fn window_start_ms(now_ms: i64, hours: i64) -> i64 {
    now_ms - hours * 3600 * 1000
}

/// UTC days the window can touch, for gathering candidates from the
/// per-day index.
pub fn candidate_days(now_ms: i64, hours: i64) -> Vec<i32> {
    (unix_day(window_start_ms(now_ms, hours))..=unix_day(now_ms)).collect()
}

/// Sorts by descending score and truncates. The sort is stable, so equal
/// scores keep candidate order; the tie order is not part of the contract.
pub fn rank(mut posts: Vec<Post>, w: &conf::TrendingWeights, limit: usize) -> Vec<Post> {
    posts.sort_by_key(|p| std::cmp::Reverse(trending_score(p, w)));
    posts.truncate(limit);
    posts
}

/// One-shot trending computation over the trailing window.
pub async fn trending_posts(
    db: &scylladb::ScyllaDB,
    cfg: &conf::Engagement,
    now_ms: i64,
    limit: usize,
) -> anyhow::Result<Vec<Post>> {
    let mut ids: Vec<(xid::Id, xid::Id)> = Vec::new();
    for day in candidate_days(now_ms, cfg.trending_window_hours) {
        let index = PostDay::list_by_day(db, day).await?;
        ids.extend(index.iter().map(|d| (d.uid, d.id)));
    }

    let start_ms = window_start_ms(now_ms, cfg.trending_window_hours);
    let candidates: Vec<Post> = Post::batch_get(db, ids, Vec::new())
        .await?
        .into_iter()
        .filter(|p| p.created_at >= start_ms && p.created_at <= now_ms)
        .collect();

    Ok(rank(candidates, &cfg.trending_weights, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::MS_PER_DAY;

    fn weights() -> conf::TrendingWeights {
        conf::TrendingWeights {
            upvote: 2,
            like: 1,
            comment: 1,
        }
    }

    fn post(upvotes: i32, likes: i32, comments: i32, created_at: i64) -> Post {
        Post {
            uid: xid::new(),
            id: xid::new(),
            upvotes_count: upvotes,
            likes,
            comments_count: comments,
            created_at,
            ..Default::default()
        }
    }

    #[test]
    fn trending_score_works() {
        let w = weights();
        assert_eq!(trending_score(&post(3, 4, 2, 0), &w), 12);
        assert_eq!(trending_score(&post(0, 0, 0, 0), &w), 0);
        assert_eq!(trending_score(&post(1, 0, 0, 0), &w), 2);
    }

    #[test]
    fn window_works() {
        let now = 40 * MS_PER_DAY + 1000;
        assert_eq!(window_start_ms(now, 24), now - MS_PER_DAY);
        assert_eq!(candidate_days(now, 24), vec![39, 40]);

        // a window inside one day touches only that day
        let noon = 40 * MS_PER_DAY + 12 * 3600 * 1000;
        assert_eq!(candidate_days(noon, 6), vec![40]);
    }

    #[test]
    fn rank_works() {
        let w = weights();
        let posts = vec![
            post(0, 1, 0, 1), // 1
            post(3, 4, 2, 2), // 12
            post(1, 0, 0, 3), // 2
            post(2, 2, 1, 4), // 7
            post(0, 0, 0, 5), // 0
            post(5, 0, 0, 6), // 10
        ];

        let ranked = rank(posts, &w, 5);
        assert_eq!(ranked.len(), 5);
        let scores: Vec<i64> = ranked.iter().map(|p| trending_score(p, &w)).collect();
        assert_eq!(scores, vec![12, 10, 7, 2, 1]);

        // non-increasing by construction
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn rank_keeps_tie_order() {
        let w = weights();
        let a = post(1, 0, 0, 1);
        let b = post(0, 2, 0, 2);
        let a_id = a.id;
        let b_id = b.id;

        let ranked = rank(vec![a, b], &w, 5);
        assert_eq!(ranked[0].id, a_id);
        assert_eq!(ranked[1].id, b_id);
    }
}
