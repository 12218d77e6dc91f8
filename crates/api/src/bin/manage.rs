//! Administrative commands: schema migration and demo data.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use domain::identity::DEFAULT_ITERATIONS;
use domain::{DomainError, Fixtures, PasswordHasher};
use store::{PostgresStore, StoreError};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "manage", version, about = "Food ordering backend administration")]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// SHA-256 rounds for the test user's password hash.
    #[arg(long, env = "PASSWORD_HASH_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    password_hash_iterations: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Create the test user, two restaurants with menus and one order.
    PopulateDb,
    /// Delete all restaurants, menu items, orders and the test user.
    ClearDb,
}

#[derive(Debug, Error)]
enum ManageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

async fn run(cli: Cli) -> Result<(), ManageError> {
    let store = PostgresStore::connect(&cli.database_url, 1).await?;
    let hasher = PasswordHasher::new(cli.password_hash_iterations);
    let fixtures = Fixtures::new(store.clone(), hasher);

    match cli.command {
        Command::Migrate => {
            store.run_migrations().await?;
            println!("Migrations applied.");
        }
        Command::PopulateDb => {
            println!("Creating test data...");
            let report = fixtures.populate().await?;
            if report.user_created {
                println!("Test user created.");
            }
            println!(
                "Created {} restaurants, {} menu items and order {}.",
                report.restaurants.len(),
                report.menu_items,
                report.order_id
            );
            println!("Test data successfully created!");
        }
        Command::ClearDb => {
            let report = fixtures.clear().await?;
            println!("{} restaurants deleted.", report.catalog.restaurants);
            println!("{} menu items deleted.", report.catalog.menu_items);
            println!("{} orders deleted.", report.catalog.orders);
            println!("{} order items deleted.", report.catalog.order_items);
            match report.user {
                Some(_) => println!("Test user deleted."),
                None => println!("Test user does not exist."),
            }
            println!("Test data successfully deleted!");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
