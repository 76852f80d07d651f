use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use dailysign::config::AppConfig;
use dailysign::credentials::mask::mask_opt;
use dailysign::credentials::{CredentialPatch, CredentialStore};
use dailysign::storage::Trigger;

#[derive(Parser)]
#[command(
    name = "dailysign",
    about = "Daily check-in automation for reward sites",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides DAILYSIGN_CONFIG and ./dailysign.toml)
    #[arg(long, global = true, env = "DAILYSIGN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduler)
    Serve {
        /// Bind address (defaults to server.bind from the config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the check-in once
    Sign {
        /// Trigger recorded in the log: manual or scheduled
        #[arg(long, default_value = "manual")]
        trigger: Trigger,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Reward step only, nothing logged. With --token, a raw spin using
    /// that bearer token; otherwise the stored token, without redemption.
    Spin {
        #[arg(long)]
        token: Option<String>,
    },

    /// Show check-in status (streak, totals)
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Show the sign log
    Logs {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "10")]
        limit: u32,

        #[arg(long)]
        json: bool,
    },

    /// Manage stored credentials
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage the daily schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Show which credentials are stored (masked)
    Show,

    /// Store the identity token used for refresh
    Set {
        #[arg(long)]
        token: String,
    },

    /// Store the redemption host session cookie and user id
    Newapi {
        #[arg(long)]
        session: String,

        #[arg(long)]
        user_id: String,
    },

    /// Exchange the identity token for a fresh reward-site token
    Refresh,
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Show the schedule
    Show,

    /// Enable (with --time HH:MM) or disable the daily run
    Set {
        #[arg(long)]
        time: Option<String>,

        #[arg(long)]
        disable: bool,
    },

    /// Remove the schedule
    Delete,
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(),
    };
    init_tracing(&config);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting dailysign daemon");
            dailysign::serve(&config).await?;
        }
        Commands::Sign { trigger, json } => {
            let state = dailysign::build_state(&config)?;
            let result = state.workflow.run(trigger).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let verdict = if result.success { "OK" } else { "FAILED" };
                println!("{}: {}", verdict, result.message);
                if let Some(cdk) = result.cdk() {
                    println!("Code: {}", cdk);
                }
            }
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Spin { token } => {
            let state = dailysign::build_state(&config)?;
            match token {
                Some(token) => {
                    let out = dailysign::sign::spin(state.upstream.as_ref(), &token).await;
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                None => {
                    let result = state.workflow.reward_action().await;
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    if !result.success {
                        std::process::exit(1);
                    }
                }
            }
        }
        Commands::Status { json } => {
            let state = dailysign::build_state(&config)?;
            let stats = state.status.status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("\n=== Check-in Status ===");
                println!("Signed today:    {}", if stats.signed_today { "yes" } else { "no" });
                println!(
                    "Last sign:       {}",
                    stats
                        .last_sign_time
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!("Continuous days: {}", stats.continuous_days);
                println!("Total signs:     {}", stats.total_signs);
                println!();
            }
        }
        Commands::Logs { page, limit, json } => {
            let state = dailysign::build_state(&config)?;
            let logs = state.log.list(page, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else if logs.logs.is_empty() {
                println!("No sign logs found.");
            } else {
                println!("{:<20} | {:<8} | {:<9} | Message", "Time", "Status", "Trigger");
                println!("{:-<20}-|-{:-<8}-|-{:-<9}-|-{:-<40}", "", "", "", "");
                for entry in &logs.logs {
                    println!(
                        "{:<20} | {:<8} | {:<9} | {}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.status.as_str(),
                        entry.trigger,
                        entry.message
                    );
                }
                println!("(page {} of {} entries)", logs.page, logs.total);
            }
        }
        Commands::Token { action } => {
            let state = dailysign::build_state(&config)?;
            match action {
                TokenAction::Show => {
                    let record = state.credentials.load();
                    let show = |v: &str| mask_opt(v).unwrap_or_else(|| "(not set)".to_string());
                    println!("{:<24} : {}", "Reward token", show(&record.bohe_sign_token));
                    println!("{:<24} : {}", "Identity token", show(&record.linux_do_token));
                    println!("{:<24} : {}", "Connect token", show(&record.linux_do_connect_token));
                    println!("{:<24} : {}", "Redemption session", show(&record.newapi_session));
                    println!(
                        "{:<24} : {}",
                        "Redemption user id",
                        if record.newapi_user_id.is_empty() {
                            "(not set)"
                        } else {
                            record.newapi_user_id.as_str()
                        }
                    );
                }
                TokenAction::Set { token } => {
                    let token = token.trim();
                    if token.is_empty() {
                        anyhow::bail!("Token must not be empty");
                    }
                    state.credentials.try_save(&CredentialPatch {
                        identity_token: Some(token.to_string()),
                        ..Default::default()
                    })?;
                    println!("Identity token saved.");
                }
                TokenAction::Newapi { session, user_id } => {
                    if !state
                        .credentials
                        .save_redemption_config(session.trim(), user_id.trim())
                    {
                        anyhow::bail!("Failed to save redemption config");
                    }
                    println!("Redemption config saved.");
                }
                TokenAction::Refresh => {
                    let masked = dailysign::refresh::refresh_reward_token(
                        state.credentials.as_ref(),
                        state.exchange.as_ref(),
                    )
                    .await?;
                    println!("Token refreshed: {}", masked);
                }
            }
        }
        Commands::Schedule { action } => {
            let pool = dailysign::storage::open_pool(&config.storage.db_path)?;
            let scheduler = dailysign::scheduler::Scheduler::new(pool);

            match action {
                ScheduleAction::Show => {
                    let status = scheduler.status().await?;
                    if !status.enabled {
                        println!("Schedule disabled.");
                    }
                    if let Some(time) = &status.time {
                        println!("Daily at:  {}", time);
                    }
                    if let Some(next) = status.next_run {
                        println!("Next run:  {}", next.format("%Y-%m-%d %H:%M"));
                    }
                    if let Some(last) = status.last_run {
                        println!("Last run:  {}", last.format("%Y-%m-%d %H:%M"));
                    }
                }
                ScheduleAction::Set { time, disable } => {
                    let status = scheduler.set(!disable, time.as_deref()).await?;
                    if status.enabled {
                        println!(
                            "Schedule enabled at {}.",
                            status.time.as_deref().unwrap_or("-")
                        );
                    } else {
                        println!("Schedule disabled.");
                    }
                }
                ScheduleAction::Delete => {
                    scheduler.delete().await?;
                    println!("Schedule deleted.");
                }
            }
        }
    }

    Ok(())
}
