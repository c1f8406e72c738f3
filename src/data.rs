//! Rating records and the in-memory rating store.
use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::iter::FromIterator;

use rand::Rng;

use siphasher::sip::SipHasher;

use super::{ItemId, Score, UserId};

/// A single `(item, user, score)` observation.
///
/// Fields are declared in on-disk record order so that headerless CSV
/// rows deserialize positionally.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Rating {
    item_id: String,
    user_id: String,
    score: Score,
}

impl Rating {
    /// Build a new rating.
    pub fn new<I: Into<String>, U: Into<String>>(item_id: I, user_id: U, score: Score) -> Self {
        Rating {
            item_id: item_id.into(),
            user_id: user_id.into(),
            score,
        }
    }

    /// Id of the rated item.
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Id of the rating user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The score given.
    pub fn score(&self) -> Score {
        self.score
    }
}

/// Split ratings into `(train, test)` partitions.
///
/// Assignment hashes the `(user, item)` identity with keys drawn from
/// `rng`, so a rating always lands in the same partition for a given
/// set of keys regardless of its position in `ratings`.
pub fn train_test_split<R: Rng>(
    ratings: &[Rating],
    rng: &mut R,
    test_fraction: f64,
) -> (Vec<Rating>, Vec<Rating>) {
    let denominator = 100_000;
    let test_cutoff = (test_fraction * denominator as f64) as u64;

    let (key_0, key_1) = (rng.gen::<u64>(), rng.gen::<u64>());

    let is_test = |x: &Rating| {
        let mut hasher = SipHasher::new_with_keys(key_0, key_1);
        hasher.write(x.user_id.as_bytes());
        hasher.write_u8(0xff);
        hasher.write(x.item_id.as_bytes());
        hasher.finish() % denominator < test_cutoff
    };

    ratings.iter().cloned().partition(|x| !is_test(x))
}

/// Bidirectional mapping between external string ids and dense indices.
#[derive(Clone, Debug, Default)]
struct Vocabulary {
    indices: HashMap<String, usize>,
    names: Vec<String>,
}

impl Vocabulary {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.indices.get(name) {
            return idx;
        }

        let idx = self.names.len();
        self.names.push(name.to_owned());
        self.indices.insert(name.to_owned(), idx);

        idx
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.indices.get(name).cloned()
    }

    fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(|x| x.as_str())
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct RunningMean {
    sum: Score,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, score: Score) {
        self.sum += score;
        self.count += 1;
    }

    fn mean(&self) -> Option<Score> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as Score)
        }
    }
}

/// Owner of the rating corpus.
///
/// Holds every user's ratings, keyed by item, and a running mean of
/// all scores recorded for each item. User and item ids are interned
/// into dense indices in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct RatingStore {
    users: Vocabulary,
    items: Vocabulary,
    user_ratings: Vec<BTreeMap<ItemId, Score>>,
    item_means: Vec<RunningMean>,
    num_ratings: usize,
}

impl RatingStore {
    /// Build an empty store.
    pub fn new() -> Self {
        RatingStore::default()
    }

    /// Record a rating.
    ///
    /// A repeated `(user, item)` pair replaces the user's stored score,
    /// but both scores still count towards the item's average.
    pub fn record(&mut self, user: &str, item: &str, score: Score) {
        let user_id = self.users.intern(user);
        let item_id = self.items.intern(item);

        if user_id == self.user_ratings.len() {
            self.user_ratings.push(BTreeMap::new());
        }
        if item_id == self.item_means.len() {
            self.item_means.push(RunningMean::default());
        }

        self.user_ratings[user_id].insert(item_id, score);
        self.item_means[item_id].push(score);
        self.num_ratings += 1;
    }

    /// The score `user` gave `item`, if any.
    pub fn rating_of(&self, user: &str, item: &str) -> Option<Score> {
        let user_id = self.user_id(user)?;
        let item_id = self.item_id(item)?;

        self.user_ratings[user_id].get(&item_id).cloned()
    }

    /// Items rated by `user` with their scores, in item index order.
    /// Empty for an unknown user.
    pub fn items_rated_by<'a>(&'a self, user: &str) -> impl Iterator<Item = (&'a str, Score)> + 'a {
        self.user_id(user)
            .map(|user_id| &self.user_ratings[user_id])
            .into_iter()
            .flat_map(|ratings| ratings.iter())
            .map(move |(&item_id, &score)| (self.items.names[item_id].as_str(), score))
    }

    /// Mean of every score recorded for `item`.
    pub fn average_of(&self, item: &str) -> Option<Score> {
        self.item_id(item).and_then(|item_id| self.item_average(item_id))
    }

    /// Ids of all users, in index order.
    pub fn known_users(&self) -> impl Iterator<Item = &str> {
        self.users.names.iter().map(|x| x.as_str())
    }

    /// Ids of all items, in index order.
    pub fn known_items(&self) -> impl Iterator<Item = &str> {
        self.items.names.iter().map(|x| x.as_str())
    }

    /// Index of a user.
    pub fn user_id(&self, user: &str) -> Option<UserId> {
        self.users.get(user)
    }

    /// Index of an item.
    pub fn item_id(&self, item: &str) -> Option<ItemId> {
        self.items.get(item)
    }

    /// External id of a user index.
    pub fn user_name(&self, user_id: UserId) -> Option<&str> {
        self.users.name(user_id)
    }

    /// External id of an item index.
    pub fn item_name(&self, item_id: ItemId) -> Option<&str> {
        self.items.name(item_id)
    }

    /// All ratings of a user, keyed by item index.
    pub fn user_ratings(&self, user_id: UserId) -> Option<&BTreeMap<ItemId, Score>> {
        self.user_ratings.get(user_id)
    }

    /// Mean score of an item index.
    pub fn item_average(&self, item_id: ItemId) -> Option<Score> {
        self.item_means.get(item_id).and_then(|x| x.mean())
    }

    /// Inverted index: for every item, the users who rated it and their
    /// scores, sorted by user index.
    pub fn raters_by_item(&self) -> Vec<Vec<(UserId, Score)>> {
        let mut raters = vec![Vec::new(); self.num_items()];

        // Walking users in index order keeps every list sorted.
        for (user_id, ratings) in self.user_ratings.iter().enumerate() {
            for (&item_id, &score) in ratings {
                raters[item_id].push((user_id, score));
            }
        }

        raters
    }

    /// Number of distinct users.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Number of distinct items.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Number of ratings recorded, duplicates included.
    pub fn len(&self) -> usize {
        self.num_ratings
    }

    /// Whether no rating has been recorded.
    pub fn is_empty(&self) -> bool {
        self.num_ratings == 0
    }
}

impl Extend<Rating> for RatingStore {
    fn extend<T: IntoIterator<Item = Rating>>(&mut self, iter: T) {
        for rating in iter {
            self.record(&rating.user_id, &rating.item_id, rating.score);
        }
    }
}

impl FromIterator<Rating> for RatingStore {
    fn from_iter<T: IntoIterator<Item = Rating>>(iter: T) -> Self {
        let mut store = RatingStore::new();
        store.extend(iter);

        store
    }
}
