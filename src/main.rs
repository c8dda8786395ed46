use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use postsync::config::AppConfig;
use postsync::db::models::{NewPost, NewUser, UpdatePost};
use postsync::db::repository::{MongoPostRepository, MongoUserRepository, UserRepository};
use postsync::pagination::PaginationParams;
use postsync::posts::service::PostsService;
use postsync::search::client::MeilisearchService;
use postsync::search::indexer::PostIndexer;

#[derive(Parser)]
#[command(name = "postsync", version, about = "Manage posts kept in sync between MongoDB and Meilisearch")]
struct Cli {
    /// Configuration file (TOML). Missing files are ignored.
    #[arg(long, default_value = "postsync.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the search index and its mapping if missing.
    EnsureIndex,
    /// Register a user that can author posts.
    AddUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Create a post.
    Create {
        #[arg(long)]
        author: i64,
        #[arg(long)]
        title: String,
        /// May be repeated, one per paragraph.
        #[arg(long = "paragraph")]
        paragraphs: Vec<String>,
    },
    /// Show a post.
    Get { id: i64 },
    /// Change the title and/or paragraphs of a post.
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        /// Replaces all paragraphs. May be repeated.
        #[arg(long = "paragraph")]
        paragraphs: Vec<String>,
    },
    /// Delete a post.
    Delete { id: i64 },
    /// List posts in ascending id order.
    List(PageArgs),
    /// Phrase search over titles and paragraphs.
    Search {
        text: String,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Args)]
struct PageArgs {
    #[arg(long)]
    offset: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
    /// Only return posts with an id greater than this; overrides --offset.
    #[arg(long)]
    start_id: Option<i64>,
}

impl From<PageArgs> for PaginationParams {
    fn from(args: PageArgs) -> Self {
        Self {
            offset: args.offset,
            limit: args.limit,
            start_id: args.start_id,
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postsync=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    // Connect to MongoDB
    let mongo_client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
    let mongo_db = mongo_client.database(&config.mongodb.database);
    let users = Arc::new(MongoUserRepository::new(&mongo_db));
    let posts = Arc::new(MongoPostRepository::new(&mongo_db));

    tracing::info!("Connected to MongoDB at {}", config.mongodb.uri);

    // The index must exist with its mapping before anything touches it.
    let search = Arc::new(MeilisearchService::new(&config.search)?);
    let indexer = PostIndexer::new(search);
    indexer.ensure_index().await?;

    let service = PostsService::new(
        posts,
        users.clone(),
        indexer,
        config.pagination.count_policy,
    );

    match cli.command {
        Command::EnsureIndex => {
            tracing::info!("Index [{}] is ready", config.search.index);
        }
        Command::AddUser { email, name } => {
            let user = users.create(NewUser { email, name }).await?;
            print_json(&user)?;
        }
        Command::Create {
            author,
            title,
            paragraphs,
        } => {
            let post = service
                .create_as(NewPost { title, paragraphs }, author)
                .await?;
            print_json(&post)?;
        }
        Command::Get { id } => print_json(&service.find_by_id(id).await?)?,
        Command::Update {
            id,
            title,
            paragraphs,
        } => {
            let patch = UpdatePost {
                title,
                paragraphs: (!paragraphs.is_empty()).then_some(paragraphs),
            };
            print_json(&service.update(id, patch).await?)?;
        }
        Command::Delete { id } => {
            service.delete(id).await?;
            tracing::info!("Deleted post {id}");
        }
        Command::List(page) => {
            print_json(&service.list_all(&page.into()).await?)?;
        }
        Command::Search { text, page } => {
            print_json(&service.search_posts(&text, &page.into()).await?)?;
        }
    }

    Ok(())
}
