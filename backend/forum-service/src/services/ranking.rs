//! Ranking engine
//!
//! Pure functions over a snapshot: visibility filtering happens first, then
//! ordering. Pinned items always precede unpinned ones; within each group the
//! selected strategy decides, and ties fall back to recency then id so the
//! output is deterministic.

use crate::domain::{Moderated, Rankable, Viewer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_HOT_GRAVITY: f64 = 1.5;
pub const DEFAULT_HOT_AGE_OFFSET_HOURS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortStrategy {
    /// Newest first
    New,
    /// Highest net score first
    Top,
    /// Highest time-decayed score first
    #[default]
    Hot,
}

impl SortStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortStrategy::New => "new",
            SortStrategy::Top => "top",
            SortStrategy::Hot => "hot",
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SortStrategy::New),
            "top" => Ok(SortStrategy::Top),
            "hot" => Ok(SortStrategy::Hot),
            other => Err(format!("unknown sort strategy: {}", other)),
        }
    }
}

/// `hot = net / (age_hours + offset) ^ gravity`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranker {
    gravity: f64,
    age_offset_hours: f64,
}

impl Default for Ranker {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_HOT_GRAVITY,
            age_offset_hours: DEFAULT_HOT_AGE_OFFSET_HOURS,
        }
    }
}

impl Ranker {
    pub fn new(gravity: f64, age_offset_hours: f64) -> Self {
        Self {
            gravity,
            age_offset_hours,
        }
    }

    /// Items stamped in the future (clock skew) count as brand new.
    ///
    /// Decay pulls every score toward zero, so newer wins at equal net only
    /// for non-negative nets; among equally downvoted items the older ranks
    /// higher.
    pub fn hot_score(&self, net_score: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - created_at).num_milliseconds().max(0);
        let age_hours = age_ms as f64 / 3_600_000.0;
        net_score as f64 / (age_hours + self.age_offset_hours).powf(self.gravity)
    }

    pub fn rank<T: Rankable>(&self, items: Vec<T>, strategy: SortStrategy, now: DateTime<Utc>) -> Vec<T> {
        let mut keyed: Vec<(f64, T)> = items
            .into_iter()
            .map(|item| {
                let hot = match strategy {
                    SortStrategy::Hot => self.hot_score(item.net_score(), item.created_at(), now),
                    _ => 0.0,
                };
                (hot, item)
            })
            .collect();

        keyed.sort_by(|(hot_a, a), (hot_b, b)| {
            b.is_pinned()
                .cmp(&a.is_pinned())
                .then_with(|| match strategy {
                    SortStrategy::New => b.created_at().cmp(&a.created_at()),
                    SortStrategy::Top => b.net_score().cmp(&a.net_score()),
                    SortStrategy::Hot => hot_b.total_cmp(hot_a),
                })
                .then_with(|| tie_break(a, b))
        });

        keyed.into_iter().map(|(_, item)| item).collect()
    }
}

fn tie_break<T: Rankable>(a: &T, b: &T) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| b.target_id().cmp(&a.target_id()))
}

/// Whether `viewer` may see `item`. Deleted, shadowbanned, unapproved items
/// and anything by a shadowbanned author are visible only to their author
/// and moderators.
pub fn is_visible<T: Moderated + ?Sized>(
    item: &T,
    viewer: &Viewer,
    shadowbanned_authors: &HashSet<Uuid>,
) -> bool {
    if viewer.sees_hidden_of(item.author_id()) {
        return true;
    }
    let author_shadowbanned = item
        .author_id()
        .map_or(false, |author| shadowbanned_authors.contains(&author));
    !item.is_hidden() && !author_shadowbanned
}

pub fn visible_to<T: Moderated>(
    items: Vec<T>,
    viewer: &Viewer,
    shadowbanned_authors: &HashSet<Uuid>,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| is_visible(item, viewer, shadowbanned_authors))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Post;
    use chrono::Duration;

    fn post(net: i64, age_hours: i64, pinned: bool, now: DateTime<Utc>) -> Post {
        Post {
            id: Uuid::new_v4(),
            community_id: Uuid::nil(),
            author_id: Some(Uuid::new_v4()),
            is_anonymous: false,
            title: format!("{}@{}h", net, age_hours),
            body: String::new(),
            deleted: false,
            approved: true,
            pinned,
            locked: false,
            shadowbanned: false,
            upvotes: net.max(0),
            downvotes: (-net).max(0),
            comment_count: 0,
            created_at: now - Duration::hours(age_hours),
        }
    }

    fn titles(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_hot_score_formula() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let score = ranker.hot_score(10, now - Duration::hours(2), now);
        assert!((score - 10.0 / 4f64.powf(1.5)).abs() < 1e-9);
        assert_eq!(ranker.hot_score(0, now, now), 0.0);
    }

    #[test]
    fn test_hot_decays_with_age_for_equal_score() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let ranked = ranker.rank(
            vec![post(5, 30, false, now), post(5, 1, false, now), post(5, 10, false, now)],
            SortStrategy::Hot,
            now,
        );
        assert_eq!(titles(&ranked), vec!["5@1h", "5@10h", "5@30h"]);
    }

    #[test]
    fn test_negative_scores_decay_toward_zero() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let older = ranker.hot_score(-5, now - Duration::hours(30), now);
        let newer = ranker.hot_score(-5, now - Duration::hours(1), now);
        assert!(older > newer);
        assert!(older < 0.0);

        let ranked = ranker.rank(
            vec![
                post(-5, 1, false, now),
                post(-5, 30, false, now),
                post(0, 5, false, now),
                post(0, 2, false, now),
            ],
            SortStrategy::Hot,
            now,
        );
        assert_eq!(titles(&ranked), vec!["0@2h", "0@5h", "-5@30h", "-5@1h"]);
    }

    #[test]
    fn test_top_and_new() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let items = vec![post(1, 1, false, now), post(9, 5, false, now), post(-3, 0, false, now)];

        let top = ranker.rank(items.clone(), SortStrategy::Top, now);
        assert_eq!(titles(&top), vec!["9@5h", "1@1h", "-3@0h"]);

        let new = ranker.rank(items, SortStrategy::New, now);
        assert_eq!(titles(&new), vec!["-3@0h", "1@1h", "9@5h"]);
    }

    #[test]
    fn test_pinned_first_under_every_strategy() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let items = vec![
            post(100, 0, false, now),
            post(-5, 48, true, now),
            post(3, 2, false, now),
        ];
        for strategy in [SortStrategy::New, SortStrategy::Top, SortStrategy::Hot] {
            let ranked = ranker.rank(items.clone(), strategy, now);
            assert!(ranked[0].pinned, "{} did not put the pinned post first", strategy);
            assert!(ranked[1..].iter().all(|p| !p.pinned));
        }
    }

    #[test]
    fn test_ranking_is_deterministic_on_ties() {
        let ranker = Ranker::default();
        let now = Utc::now();
        let mut a = post(2, 3, false, now);
        let mut b = post(2, 3, false, now);
        a.created_at = b.created_at;
        b.title = "b".into();
        a.title = "a".into();

        let first = ranker.rank(vec![a.clone(), b.clone()], SortStrategy::Hot, now);
        let second = ranker.rank(vec![b, a], SortStrategy::Hot, now);
        assert_eq!(titles(&first), titles(&second));
    }

    #[test]
    fn test_hidden_items_filtered_per_viewer() {
        let now = Utc::now();
        let mut deleted = post(1, 1, false, now);
        deleted.deleted = true;
        let by_shadowbanned = post(1, 1, false, now);
        let shadowbanned: HashSet<Uuid> = by_shadowbanned.author_id.into_iter().collect();
        let items = vec![deleted.clone(), by_shadowbanned.clone(), post(1, 1, false, now)];

        let stranger = Viewer::user(Uuid::new_v4());
        assert_eq!(visible_to(items.clone(), &stranger, &shadowbanned).len(), 1);

        let author = Viewer::user(by_shadowbanned.author_id.unwrap());
        assert_eq!(visible_to(items.clone(), &author, &shadowbanned).len(), 2);

        let moderator = Viewer::moderator(Uuid::new_v4());
        assert_eq!(visible_to(items, &moderator, &shadowbanned).len(), 3);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("top".parse::<SortStrategy>().unwrap(), SortStrategy::Top);
        assert!("best".parse::<SortStrategy>().is_err());
        assert_eq!(SortStrategy::default(), SortStrategy::Hot);
    }
}
