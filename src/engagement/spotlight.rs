use crate::db::Post;

/// Winner among a day's candidates: highest upvotes_count, ties broken by
/// earliest created_at. None when there are no candidates.
pub fn pick_winner(posts: &[Post]) -> Option<&Post> {
    let mut winner: Option<&Post> = None;
    for post in posts {
        winner = match winner {
            None => Some(post),
            Some(best)
                if post.upvotes_count > best.upvotes_count
                    || (post.upvotes_count == best.upvotes_count
                        && post.created_at < best.created_at) =>
            {
                Some(post)
            }
            keep => keep,
        };
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(upvotes: i32, created_at: i64) -> Post {
        Post {
            uid: xid::new(),
            id: xid::new(),
            upvotes_count: upvotes,
            created_at,
            ..Default::default()
        }
    }

    #[test]
    fn pick_winner_works() {
        assert!(pick_winner(&[]).is_none());

        let posts = vec![post(3, 10)];
        assert_eq!(pick_winner(&posts).unwrap().id, posts[0].id);

        let posts = vec![post(1, 10), post(4, 20), post(2, 30)];
        assert_eq!(pick_winner(&posts).unwrap().id, posts[1].id);
    }

    #[test]
    fn pick_winner_breaks_ties_by_earliest() {
        // two posts tied at 5 upvotes, the earliest must win
        let t1 = post(5, 100);
        let t2 = post(5, 200);
        let t3 = post(3, 50);

        let posts = vec![t2.clone(), t3.clone(), t1.clone()];
        assert_eq!(pick_winner(&posts).unwrap().id, t1.id);

        // order of candidates must not matter
        let posts = vec![t1.clone(), t2, t3];
        assert_eq!(pick_winner(&posts).unwrap().id, t1.id);
    }
}
