//! Loading rating corpora from delimited text.
//!
//! Records are headerless, one per line, with fields in the order
//! `item,user,score`:
//!
//! ```text
//! 8,1744889,1.0
//! 8,1395430,2.0
//! ```
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv;
use failure;

use crate::data::{Rating, RatingStore};

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false).trim(csv::Trim::All);

    builder
}

/// Lazily parse rating records from `reader`.
pub fn read_ratings<R: Read>(reader: R) -> impl Iterator<Item = Result<Rating, failure::Error>> {
    reader_builder()
        .from_reader(reader)
        .into_deserialize()
        .map(|x| x.map_err(failure::Error::from))
}

fn open(path: &Path) -> Result<File, failure::Error> {
    File::open(path).map_err(|err| format_err!("Cannot open {}: {}", path.display(), err))
}

/// Read every record in the rating file at `path`.
pub fn read_ratings_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Rating>, failure::Error> {
    read_ratings(open(path.as_ref())?).collect()
}

/// Read every record from `reader` into a new store.
pub fn load_ratings_from<R: Read>(reader: R) -> Result<RatingStore, failure::Error> {
    let mut store = RatingStore::new();

    for rating in read_ratings(reader) {
        let rating = rating?;
        store.record(rating.user_id(), rating.item_id(), rating.score());
    }

    Ok(store)
}

/// Read the rating file at `path` into a new store.
pub fn load_ratings<P: AsRef<Path>>(path: P) -> Result<RatingStore, failure::Error> {
    let start = Instant::now();
    let path = path.as_ref();

    let store = load_ratings_from(open(path)?)?;

    info!(
        path = %path.display(),
        num_ratings = store.len(),
        num_users = store.num_users(),
        num_items = store.num_items(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded ratings."
    );

    Ok(store)
}
