use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use social_server::application::auth_service::AuthService;
use social_server::application::group_service::GroupService;
use social_server::application::post_service::PostService;
use social_server::data::Repositories;
use social_server::domain::group::NewGroup;
use social_server::infrastructure::config::AppConfig;
use social_server::infrastructure::database::{create_pool, run_migrations};
use social_server::infrastructure::media::MediaStorage;
use social_server::infrastructure::security::JwtKeys;
use tracing::info;

/// Administration for the social blog database. Reads the same environment
/// as the server.
#[derive(Parser, Debug)]
struct Cli {
    /// PostgreSQL URL; falls back to `DATABASE_URL`.
    #[clap(long)]
    database_url: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    CreateGroup {
        #[clap(long)]
        title: String,
        #[clap(long)]
        slug: String,
        #[clap(long, default_value = "")]
        description: String,
    },
    ListGroups,
    /// Delete a group; its posts stay, without a group.
    DeleteGroup { slug: String },
    /// Delete a user with their posts and follow edges.
    DeleteUser { username: String },
    /// Delete a post; its comments stay, detached.
    DeletePost { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    social_server::infrastructure::logging::init_logging();
    let args = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let url = args
        .database_url
        .or(config.database_url)
        .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&url)
        .await
        .context("failed to connect to database")?;

    if let Command::Migrate = args.command {
        run_migrations(&pool).await?;
        println!("Migrations applied.");
        return Ok(());
    }

    let repos = Repositories::postgres(pool);
    let groups = GroupService::new(Arc::clone(&repos.groups));
    let auth = AuthService::new(
        Arc::clone(&repos.users),
        JwtKeys::new(config.jwt_secret, config.session_ttl_hours),
    );

    match args.command {
        Command::Migrate => {}
        Command::CreateGroup {
            title,
            slug,
            description,
        } => {
            let group = groups
                .create_group(NewGroup {
                    title,
                    slug,
                    description,
                })
                .await?;
            println!("Group created: {} (/group/{}/)", group.id, group.slug);
        }
        Command::ListGroups => {
            let all = groups.list_groups().await?;
            println!("Groups ({})", all.len());
            for group in all {
                println!("- [{}] {} /group/{}/", group.id, group.title, group.slug);
            }
        }
        Command::DeleteGroup { slug } => {
            groups.delete_group(&slug).await?;
            println!("Group deleted!");
        }
        Command::DeleteUser { username } => {
            auth.delete_user(&username).await?;
            info!(username = %username, "user deleted from cli");
            println!("User deleted!");
        }
        Command::DeletePost { id } => {
            let posts = PostService::new(&repos, MediaStorage::new(config.media_root));
            posts.delete_post(id).await?;
            println!("Post deleted!");
        }
    }

    Ok(())
}
