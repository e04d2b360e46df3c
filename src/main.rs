use agents::Credentials;
use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL};
use configuration::{Config, init_tracing, load_config};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use web_server::{AppError, AppState, bootstrap, handle_raw, run_server};

/// The main entry point for the Arena competition orchestrator.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; credentials may come from the environment or the request.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Runs trading competitions between LLM agents, one command at a time.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults to ./arena.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one JSON command and print the JSON response on stdout.
    Exec(ExecArgs),
    /// Serve the command surface over HTTP.
    Serve(ServeArgs),
    /// Print the current leaderboard of a competition.
    Leaderboard(LeaderboardArgs),
}

#[derive(Parser)]
struct ExecArgs {
    /// The request as a JSON string. Read from stdin when omitted.
    #[arg(long)]
    request: Option<String>,
}

#[derive(Parser)]
struct ServeArgs {
    /// Overrides `server.bind_address`.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Parser)]
struct LeaderboardArgs {
    competition_id: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail_early(&cli.command, e.into()),
    };
    // Held until exit so the file writer flushes.
    let _guard = init_tracing(&config.logging)?;

    let state = match bootstrap(&config).await {
        Ok(state) => state,
        Err(e) => return fail_early(&cli.command, e),
    };

    match cli.command {
        Commands::Exec(args) => handle_exec(&state, args).await,
        Commands::Serve(args) => {
            handle_serve(state, args, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Leaderboard(args) => {
            handle_leaderboard(&state, args).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `exec` callers always get a JSON body, even when the process could not start.
fn fail_early(command: &Commands, error: AppError) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Exec(_) => {
            print_json(&error.to_body())?;
            Ok(ExitCode::FAILURE)
        }
        _ => Err(error.into()),
    }
}

async fn handle_exec(state: &AppState, args: ExecArgs) -> anyhow::Result<ExitCode> {
    let raw = match args.request {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("failed to read the request from stdin")?;
            raw
        }
    };

    let response = handle_raw(state, &raw).await;
    print_json(&response)?;

    if response["success"] == true {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn handle_serve(state: AppState, args: ServeArgs, config: &Config) -> anyhow::Result<()> {
    let addr = match args.bind {
        Some(addr) => addr,
        None => config
            .server
            .bind_address
            .parse()
            .with_context(|| format!("invalid server.bind_address '{}'", config.server.bind_address))?,
    };
    run_server(state, addr).await
}

async fn handle_leaderboard(state: &AppState, args: LeaderboardArgs) -> anyhow::Result<()> {
    let runtime = state
        .registry
        .get_or_restore(&args.competition_id, &Credentials::new())
        .await?;
    let runtime = runtime.lock().await;
    let competition = runtime.competition();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Rank", "Agent", "Portfolio Value", "Return %"]);
    for entry in runtime.leaderboard() {
        table.add_row(vec![
            entry.rank.to_string(),
            entry.agent_name,
            format!("{:.2}", entry.portfolio_value),
            format!("{:.2}", entry.return_pct),
        ]);
    }

    println!(
        "{} ({}) - {}, cycle {}",
        competition.config.name,
        competition.id(),
        competition.status,
        competition.cycle_count
    );
    println!("{table}");
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
