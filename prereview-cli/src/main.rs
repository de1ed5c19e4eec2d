//! Preprint review engine CLI
//!
//! Usage:
//!   prereview demo                 - seed an in-memory engine and print the index
//!   prereview validate --file a.json - validate a submitted action payload
//!   prereview score --file c.json  - score a compacted action list
//!
//! The demo runs against an in-memory store; the library crates are the
//! product, this binary is for poking at them.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use prereview_core::score::{score, ScoreConfig};
use prereview_core::types::{
    ActionInput, AnswerType, IndexedAction, PreprintIdentifier, QuestionId, RapidReview,
    RegisterInput, RequestInput, ResolvedMeta, ReviewAnswer, ReviewInput,
};
use prereview_core::validate::validate;
use prereview_db::{
    ActionService, Context, Database, PostOutcome, PreprintQuery, Rescorer, SearchService,
    StaticResolver,
};

#[derive(Parser)]
#[command(name = "prereview")]
#[command(about = "Preprint review engine CLI")]
#[command(version)]
struct Cli {
    /// Score half-life in days
    #[arg(long, default_value_t = prereview_core::constants::DEFAULT_HALF_LIFE_DAYS)]
    half_life_days: f64,

    /// Relevance floor for the rescore sweep
    #[arg(long, default_value_t = prereview_core::constants::SCORE_THRESHOLD)]
    threshold: f64,

    /// Log filter (tracing env-filter syntax)
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed an in-memory engine with a user, a request and a review, then
    /// print the resulting index document and a search page
    Demo {
        /// Also run a rescore sweep this many days after the review
        #[arg(long)]
        sweep_after_days: Option<f64>,
    },

    /// Validate an action payload from a JSON file
    Validate {
        /// Path to a JSON-encoded action input
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score a JSON file of compacted index actions at a reference time
    Score {
        /// Path to a JSON array of compacted actions
        #[arg(short, long)]
        file: PathBuf,
        /// Reference time (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
}

fn score_config(cli: &Cli) -> ScoreConfig {
    ScoreConfig {
        half_life_days: cli.half_life_days,
        threshold: cli.threshold,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log.clone()))
        .init();

    let config = score_config(&cli);
    config.validate()?;

    match &cli.command {
        Commands::Demo { sweep_after_days } => run_demo(config, *sweep_after_days).await?,
        Commands::Validate { file } => {
            let raw = std::fs::read_to_string(file)?;
            let input: ActionInput = serde_json::from_str(&raw)?;
            match validate(&input) {
                Ok(()) => println!("ok: {}", input.action_type()),
                Err(err) => {
                    println!("rejected: {}", err);
                    std::process::exit(1);
                }
            }
        }
        Commands::Score { file, now } => {
            let raw = std::fs::read_to_string(file)?;
            let actions: Vec<IndexedAction> = serde_json::from_str(&raw)?;
            let now = now.unwrap_or_else(Utc::now);
            println!("{}", score(&actions, now, &config));
        }
    }

    Ok(())
}

async fn run_demo(
    config: ScoreConfig,
    sweep_after_days: Option<f64>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let doi = "doi:10.1101/19001834";
    let resolver = StaticResolver::new().with(
        doi,
        ResolvedMeta {
            name: Some("Epidemiological characteristics of a novel outbreak".to_string()),
            preprint_server: Some("medRxiv".to_string()),
            ..Default::default()
        },
    );

    let db = Database::in_memory();
    let service =
        ActionService::new(db.clone(), Arc::new(resolver), config.clone()).with_inline_folds(true);

    let now = Utc::now();
    let outcome = service
        .post(
            ActionInput::Register(RegisterInput {
                orcid: "0000-0002-1825-0097".to_string(),
                name: "Josiah Carberry".to_string(),
            }),
            &Context::anonymous(now),
        )
        .await?;
    let PostOutcome::Registered { user, .. } = outcome else {
        return Err("registration returned an unexpected outcome".into());
    };
    println!("registered {} with {} roles", user.id, user.roles.len());

    let agent = user.default_role.clone();
    service
        .post(
            ActionInput::Request(RequestInput {
                agent: agent.clone(),
                preprint: PreprintIdentifier::new(doi),
                metadata: ResolvedMeta::default(),
            }),
            &Context::authenticated(user.id.clone(), now),
        )
        .await?;

    let review_time = now + Duration::hours(1);
    service
        .post(
            ActionInput::Review(ReviewInput {
                agent,
                preprint: PreprintIdentifier::new(doi),
                metadata: ResolvedMeta::default(),
                review: RapidReview {
                    subjects: vec!["zika".to_string()],
                    answers: vec![ReviewAnswer {
                        answer_type: AnswerType::YesNo,
                        question: QuestionId::new("question:has-data"),
                        text: "yes".to_string(),
                    }],
                },
            }),
            &Context::authenticated(user.id.clone(), review_time),
        )
        .await?;

    let preprint_id = PreprintIdentifier::new(doi).preprint_id();
    if let Some(sweep_days) = sweep_after_days {
        let sweep_at = review_time + Duration::seconds((sweep_days * 86_400.0) as i64);
        let rescorer = Rescorer::new(db.index.clone(), config);
        let outcome = rescorer.run_once(sweep_at).await?;
        println!(
            "sweep at {}: {} swept, {} updated",
            sweep_at, outcome.swept, outcome.updated
        );
    }

    let doc = db
        .index
        .get(&preprint_id)
        .await?
        .ok_or("index document missing after folds")?;
    println!("{}", serde_json::to_string_pretty(&doc)?);

    let search = SearchService::new(db.index.clone(), db.actions.clone());
    let page = search
        .search_preprints(&PreprintQuery::default())
        .await?;
    println!(
        "search: {} result(s), {} with reviews, {} with requests",
        page.total, page.counts.has_reviews, page.counts.has_requests
    );

    Ok(())
}
