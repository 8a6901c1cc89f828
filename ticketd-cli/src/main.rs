mod client;
mod config;
mod handlers;
mod listener;
mod server;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ticketd_core::protocol::Reply;
use ticketd_core::types::{HolderId, Ticket};

use crate::client::TicketClient;
use crate::config::ServeArgs;

#[derive(Parser)]
#[command(
    name = "ticketd",
    about = "ticketd: UDP license server handing out a fixed pool of tickets",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ClientArgs {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:2020", env = "TICKETD_SERVER")]
    server: String,

    /// How long to wait for a reply, in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the license server
    Serve(ServeArgs),

    /// Ask for a ticket
    Hello {
        /// Holder id to claim (defaults to this process id)
        #[arg(long)]
        holder: Option<u32>,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Hand a ticket back
    Goodbye {
        /// Ticket in `<holder>.<slot>` form
        ticket: String,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Check that a ticket is still valid
    Validate {
        /// Ticket in `<holder>.<slot>` form
        ticket: String,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Run a command while holding a ticket
    Run {
        #[command(flatten)]
        client: ClientArgs,

        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            server::run(args.into()).await?;
        }
        Commands::Hello { holder, client } => {
            let raw = holder.unwrap_or_else(std::process::id);
            let holder = HolderId::new(raw)
                .ok_or_else(|| anyhow::anyhow!("holder id must be non-zero"))?;
            let reply = connect(&client).await?.hello(holder).await?;
            finish(reply);
        }
        Commands::Goodbye { ticket, client } => {
            let ticket: Ticket = ticket.parse()?;
            let reply = connect(&client).await?.goodbye(ticket).await?;
            finish(reply);
        }
        Commands::Validate { ticket, client } => {
            let ticket: Ticket = ticket.parse()?;
            let reply = connect(&client).await?.validate(ticket).await?;
            finish(reply);
        }
        Commands::Run { client, command } => {
            let code = connect(&client).await?.run_licensed(&command).await?;
            std::process::exit(code);
        }
        Commands::Version => {
            println!("ticketd {}", env!("CARGO_PKG_VERSION"));
            println!("UDP license ticket server");
        }
    }

    Ok(())
}

async fn connect(args: &ClientArgs) -> anyhow::Result<TicketClient> {
    TicketClient::connect(&args.server, Duration::from_millis(args.timeout_ms)).await
}

/// Print the server's reply; a `FAIL` reply exits non-zero.
fn finish(reply: Reply) {
    println!("{}", reply);
    if !reply.is_success() {
        std::process::exit(1);
    }
}
