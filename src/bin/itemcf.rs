//! Command-line front end: load a rating file, build item similarities
//! and answer prediction queries.
extern crate clap;
extern crate failure;
extern crate itemcf;
extern crate rand;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;
extern crate tracing_subscriber;

use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use itemcf::data::{train_test_split, RatingStore};
use itemcf::datasets::{load_ratings, read_ratings_from_path};
use itemcf::evaluation::rating_scores;
use itemcf::models::knn::{Neighbour, Predictor};
use itemcf::similarity::SimilarityMatrix;
use itemcf::PredictionError;

const EXIT_ANSWERS: &[&str] = &[
    "n",
    "no",
    "nope",
    "nah",
    "q",
    "quit",
    "exit",
    "stop",
    "probably not",
];

#[derive(Parser)]
#[command(name = "itemcf")]
#[command(about = "Item-based collaborative filtering rating predictions")]
#[command(version)]
struct Cli {
    /// Rating file: headerless `item,user,score` records
    #[arg(short, long, global = true, default_value = "data/data-full.txt")]
    data: PathBuf,

    /// Number of most similar rated items used per prediction
    #[arg(
        short = 'k',
        long,
        global = true,
        default_value = "3",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    neighbours: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prompt for item and user ids until told to stop
    Interactive,

    /// Predict a single rating
    Predict {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Item id
        #[arg(short, long)]
        item: String,

        /// Print the prediction and its neighbours as JSON
        #[arg(long)]
        json: bool,
    },

    /// Hold out a fraction of the ratings and report prediction error on them
    Evaluate {
        /// Fraction of ratings held out, strictly between 0 and 1
        #[arg(long, default_value = "0.2", value_parser = parse_fraction)]
        test_fraction: f64,

        /// Random seed for the split
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print the scores as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_fraction(value: &str) -> Result<f64, String> {
    let fraction: f64 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;

    if fraction > 0.0 && fraction < 1.0 {
        Ok(fraction)
    } else {
        Err(format!("{} is not strictly between 0 and 1", fraction))
    }
}

#[derive(Serialize)]
struct PredictionReport<'a> {
    user: &'a str,
    item: &'a str,
    prediction: f64,
    neighbours: Vec<NamedNeighbour<'a>>,
}

#[derive(Serialize)]
struct NamedNeighbour<'a> {
    item: &'a str,
    score: f64,
    weight: f64,
}

fn neighbours_by_name<'a>(
    store: &'a RatingStore,
    neighbours: &[Neighbour],
) -> Vec<NamedNeighbour<'a>> {
    neighbours
        .iter()
        .map(|x| NamedNeighbour {
            item: store.item_name(x.item_id).unwrap_or("?"),
            score: x.score,
            weight: x.weight,
        })
        .collect()
}

fn describe(err: &PredictionError) -> String {
    match err {
        PredictionError::UserNotFound => "ERROR: invalid user id".to_owned(),
        PredictionError::ItemNotFound => "ERROR: invalid item id".to_owned(),
        PredictionError::AlreadyRated { score } => {
            format!("ERROR: user has already given this item a rating of {}", score)
        }
        other => format!("ERROR: {}", other),
    }
}

fn prompt(input: &mut impl BufRead, question: &str) -> Result<Option<String>, failure::Error> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    Ok(Some(line.trim().to_owned()))
}

fn interactive(predictor: &Predictor) -> Result<(), failure::Error> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    println!("\nPreprocessing steps complete. You can now make predictions");
    println!("-----------------------------------------------------------");

    loop {
        println!();

        let item = match prompt(&mut input, "Please enter in an item ID: ")? {
            Some(item) => item,
            None => break,
        };
        let user = match prompt(&mut input, "Please enter in a user ID: ")? {
            Some(user) => user,
            None => break,
        };

        match predictor.predict(&user, &item) {
            Ok(prediction) => println!("Predicted rating: {}", prediction),
            Err(err) => println!("{}", describe(&err)),
        }

        let answer = prompt(&mut input, "Want to make another prediction?(y/n): ")?
            .unwrap_or_default()
            .to_lowercase();

        if answer.is_empty() || EXIT_ANSWERS.contains(&answer.as_str()) {
            println!("Goodbye.");
            break;
        }
    }

    Ok(())
}

fn predict(
    predictor: &Predictor,
    user: &str,
    item: &str,
    json: bool,
) -> Result<(), failure::Error> {
    let outcome = predictor
        .predict(user, item)
        .and_then(|prediction| Ok((prediction, predictor.neighbours(user, item)?)));

    match outcome {
        Ok((prediction, neighbours)) => {
            if json {
                let report = PredictionReport {
                    user,
                    item,
                    prediction,
                    neighbours: neighbours_by_name(predictor.store(), &neighbours),
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Predicted rating: {}", prediction);
            }

            Ok(())
        }
        Err(err) => Err(failure::format_err!("{}", describe(&err))),
    }
}

fn evaluate(
    path: &Path,
    num_neighbours: NonZeroUsize,
    test_fraction: f64,
    seed: u64,
    json: bool,
) -> Result<(), failure::Error> {
    let ratings = read_ratings_from_path(path)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let (train, test) = train_test_split(&ratings, &mut rng, test_fraction);

    let store: RatingStore = train.into_iter().collect();
    let similarities = SimilarityMatrix::build(&store);
    let predictor = Predictor::new(&store, &similarities).num_neighbours(num_neighbours);

    let scores = rating_scores(&predictor, &test)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else {
        println!(
            "RMSE {:.4}, MAE {:.4} over {} predicted ratings ({} failed)",
            scores.rmse, scores.mae, scores.predicted, scores.failed
        );
    }

    Ok(())
}

fn build_similarities(store: &RatingStore) -> SimilarityMatrix {
    let start = Instant::now();
    let similarities = SimilarityMatrix::build_with_progress(store, |done, total| {
        if done % 100 == 0 || done == total {
            tracing::debug!(done, total, "Similarity rows computed.");
        }
    });
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Similarity matrix ready."
    );

    similarities
}

fn main() -> Result<(), failure::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let num_neighbours = NonZeroUsize::new(cli.neighbours as usize)
        .ok_or_else(|| failure::format_err!("k must be greater than 0"))?;

    match cli.command {
        Commands::Evaluate {
            test_fraction,
            seed,
            json,
        } => evaluate(&cli.data, num_neighbours, test_fraction, seed, json),
        Commands::Interactive => {
            let store = load_ratings(&cli.data)?;
            let similarities = build_similarities(&store);

            interactive(&Predictor::new(&store, &similarities).num_neighbours(num_neighbours))
        }
        Commands::Predict { user, item, json } => {
            let store = load_ratings(&cli.data)?;
            let similarities = build_similarities(&store);
            let predictor = Predictor::new(&store, &similarities).num_neighbours(num_neighbours);

            predict(&predictor, &user, &item, json)
        }
    }
}
