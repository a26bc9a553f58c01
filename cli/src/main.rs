//! Modmail CLI - Command-line interface for the modmail ticket router

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::Style;
use modmail_core::{
    Channel, Config, DiscordChannel, DiscordPlatform, Dispatcher, EventBus, GatewayServer,
    RouterSettings, TicketRouter, get_config_path, load_config, save_config, types::ChannelId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

const MODMAIL_LOGO: &str = r#"
                 _                 _ _
  _ __ ___   ___| |_ __ ___   __ _(_) |
 | '_ ` _ \ / _ \ | '_ ` _ \ / _` | | |
 | | | | | | (_) | | | | | | | (_| | | |
 |_| |_| |_|\___/|_|_| |_| |_|\__,_|_|_|
"#;

/// How long to wait for queued events after the bot disconnects
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Modmail - relay direct messages into private staff ticket channels
#[derive(Parser, Debug)]
#[command(name = "modmail")]
#[command(version)]
#[command(about = "Modmail - Discord ticket router", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Onboard {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Connect to Discord and route tickets
    Run {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the configuration modmail would run with
    Status,

    /// Verify the bot token and ticket category against Discord
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard { force } => {
            command_onboard(force).await?;
        }
        Commands::Run { verbose } => {
            command_run(verbose).await?;
        }
        Commands::Status => {
            command_status().await?;
        }
        Commands::Check => {
            command_check().await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::builder().parse("debug")?
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Create the default config file
async fn command_onboard(force: bool) -> Result<()> {
    let green = Style::new().green();

    println!("{}{} MODMAIL SETUP", MODMAIL_LOGO, green.apply_to(">>>"));

    let config_path = get_config_path();
    if config_path.exists() && !force {
        println!("\n⚠️  Config already exists at {}", config_path.display());
        println!("Run `modmail onboard --force` to overwrite it.");
        return Ok(());
    }

    let config = Config::default();
    save_config(&config)
        .await
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("\n✅ Created config at {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set discord.token, discord.guild_id and tickets.category_id");
    println!("     (or DISCORD_TOKEN, GUILD_ID and MODMAIL_CATEGORY_ID)");
    println!("  2. Optionally set tickets.staff_role_id (MOD_ROLE_ID)");
    println!("  3. Check the setup: modmail check");
    println!("  4. Start: modmail run");

    Ok(())
}

/// Run the bot until interrupted
async fn command_run(verbose: bool) -> Result<()> {
    init_logging(verbose)?;

    println!("{}", MODMAIL_LOGO);

    let config = load_config().await.context("failed to load config")?;
    config
        .validate()
        .context("configuration incomplete, see `modmail status`")?;

    let (bus, receiver) = EventBus::new();
    let platform = Arc::new(DiscordPlatform::new(&config));
    let router = Arc::new(TicketRouter::new(platform, RouterSettings::from(&config)));

    let dispatcher = tokio::spawn(Dispatcher::new(router.clone(), receiver).run());
    println!("✅ Dispatcher: running");

    if config.gateway.enabled {
        let gateway = GatewayServer::new(
            router.clone(),
            config.gateway.host.clone(),
            config.gateway.port,
        );
        println!(
            "✅ HTTP gateway: http://{}:{}",
            config.gateway.host, config.gateway.port
        );
        tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!("HTTP gateway stopped: {:#}", e);
            }
        });
    }

    let discord = DiscordChannel::new(config.clone(), bus).context("failed to set up discord")?;
    println!("✅ Discord: connecting to guild {}", config.discord.guild_id);

    tokio::select! {
        result = discord.start() => {
            if let Err(e) = result {
                error!("discord connection ended: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
            discord.stop().await?;
        }
    }

    // the dispatcher ends once the last bus sender is gone
    drop(discord);
    match tokio::time::timeout(DRAIN_TIMEOUT, dispatcher).await {
        Ok(Ok(stats)) => info!(
            "handled {} events ({} ignored, {} failed)",
            stats.handled, stats.ignored, stats.failed
        ),
        Ok(Err(e)) => warn!("dispatcher task failed: {}", e),
        Err(_) => warn!("dispatcher did not drain within {:?}", DRAIN_TIMEOUT),
    }

    let open = router.open_ticket_count().await;
    if open > 0 {
        println!("{} ticket(s) were open; their channels remain in the category", open);
    }

    Ok(())
}

fn mark(ok: bool) -> console::StyledObject<&'static str> {
    if ok {
        Style::new().green().apply_to("✅")
    } else {
        console::style("❌").red()
    }
}

fn show_id(id: u64) -> String {
    if id == 0 {
        console::style("not set").dim().to_string()
    } else {
        id.to_string()
    }
}

/// Show the effective configuration
async fn command_status() -> Result<()> {
    println!("{}\nmodmail Status\n", MODMAIL_LOGO);

    let config_path = get_config_path();
    println!("Config: {} {}", config_path.display(), mark(config_path.exists()));

    let config = load_config().await.context("failed to load config")?;

    println!(
        "Bot token: {}",
        if config.discord.token.is_empty() {
            console::style("not set").dim()
        } else {
            Style::new().green().apply_to("set")
        }
    );
    println!("Guild: {}", show_id(config.discord.guild_id));
    println!("Ticket category: {}", show_id(config.tickets.category_id));
    println!(
        "Staff role: {}",
        config
            .tickets
            .staff_role_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| console::style("anyone with channel access").dim().to_string())
    );
    println!("Command prefix: {}", config.discord.command_prefix);
    println!("Channel prefix: {}", config.tickets.channel_prefix);
    println!("Close delay: {}s", config.tickets.close_delay_secs);
    if config.gateway.enabled {
        println!(
            "HTTP gateway: http://{}:{}",
            config.gateway.host, config.gateway.port
        );
    } else {
        println!("HTTP gateway: {}", console::style("disabled").dim());
    }

    match config.validate() {
        Ok(()) => println!("\nReady: {}", mark(true)),
        Err(e) => println!("\nReady: {} {}", mark(false), e),
    }

    Ok(())
}

/// Check the bot token and the ticket category against Discord
async fn command_check() -> Result<()> {
    let config = load_config().await.context("failed to load config")?;
    config.validate().context("configuration incomplete")?;

    let platform = DiscordPlatform::new(&config);

    let bot = platform
        .current_user_name()
        .await
        .context("bot token rejected by discord")?;
    println!("Bot account: {} {}", bot, mark(true));

    let category = ChannelId(config.tickets.category_id);
    let found = platform
        .category_exists(category)
        .await
        .context("could not look up the ticket category")?;
    println!("Ticket category {}: {}", category, mark(found));
    if !found {
        anyhow::bail!("ticket category {} does not exist or is not a category", category);
    }

    Ok(())
}
