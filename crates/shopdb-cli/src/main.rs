mod ask;
mod index;

use clap::{Parser, Subcommand};
use shopdb_core::EntityKind;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shopdb-cli")]
#[command(about = "shopdb command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Embed catalog entities and sync them into the vector store
    Index {
        /// Restrict the run to one entity kind (products, categories, orders)
        #[arg(long)]
        kind: Option<EntityKind>,

        /// Report what would be indexed without calling TEI or Qdrant
        #[arg(long)]
        dry_run: bool,
    },
    /// Ask the assistant a question from the terminal
    Ask {
        question: String,

        /// Include this user's orders in retrieval
        #[arg(long)]
        user_id: Option<i64>,

        /// Answer language (ISO 639-1); detected from the question when omitted
        #[arg(long)]
        language: Option<String>,
    },
    /// List recent index runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("shopdb-cli: use --help to list commands");
        return Ok(());
    };

    let config = shopdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = shopdb_db::PoolConfig::from_app_config(&config);
    let pool = shopdb_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = shopdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Index { kind, dry_run } => {
            let kinds = kind.map_or_else(|| EntityKind::ALL.to_vec(), |k| vec![k]);
            index::run_index_command(&pool, &config, &kinds, dry_run).await?;
        }
        Commands::Ask {
            question,
            user_id,
            language,
        } => {
            ask::run_ask(&pool, &config, &question, user_id, language).await?;
        }
        Commands::Runs { limit } => {
            index::run_list_runs(&pool, limit).await?;
        }
    }

    Ok(())
}
