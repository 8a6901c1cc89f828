//! One-shot client for the ticket protocol.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tokio::net::{lookup_host, UdpSocket};

use ticketd_core::protocol::{Reply, Request, MAX_MESSAGE_LEN};
use ticketd_core::types::{HolderId, Ticket};

pub struct TicketClient {
    server: SocketAddr,
    timeout: Duration,
}

impl TicketClient {
    pub async fn connect(server: &str, timeout: Duration) -> anyhow::Result<Self> {
        let server = lookup_host(server)
            .await
            .with_context(|| format!("cannot resolve {}", server))?
            .next()
            .ok_or_else(|| anyhow!("{} resolved to no addresses", server))?;
        Ok(Self { server, timeout })
    }

    /// Send one request and wait for its reply.
    pub async fn exchange(&self, request: &Request) -> anyhow::Result<Reply> {
        let local: SocketAddr = if self.server.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .context("failed to bind client socket")?;

        socket
            .send_to(request.to_string().as_bytes(), self.server)
            .await
            .with_context(|| format!("failed to send to {}", self.server))?;

        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| anyhow!("no reply from {} within {:?}", self.server, self.timeout))?
            .context("failed to receive reply")?;

        let text = std::str::from_utf8(&buf[..len]).context("reply is not text")?;
        Ok(text.parse()?)
    }

    pub async fn hello(&self, holder: HolderId) -> anyhow::Result<Reply> {
        self.exchange(&Request::Hello(holder)).await
    }

    pub async fn goodbye(&self, ticket: Ticket) -> anyhow::Result<Reply> {
        self.exchange(&Request::Goodbye(ticket)).await
    }

    pub async fn validate(&self, ticket: Ticket) -> anyhow::Result<Reply> {
        self.exchange(&Request::Validate(ticket)).await
    }

    /// Take a ticket for this process, run `command`, then hand the ticket back.
    ///
    /// Returns the command's exit code.
    pub async fn run_licensed(&self, command: &[String]) -> anyhow::Result<i32> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("no command given"))?;
        let holder = HolderId::new(std::process::id())
            .ok_or_else(|| anyhow!("process id is zero"))?;

        let ticket = match self.hello(holder).await? {
            Reply::Ticket(ticket) => ticket,
            other => bail!("server refused a ticket: {}", other),
        };
        tracing::info!(%ticket, "Got ticket");

        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .with_context(|| format!("failed to run {}", program));

        match self.goodbye(ticket).await {
            Ok(reply) if reply.is_success() => tracing::info!(%ticket, "Returned ticket"),
            Ok(reply) => tracing::warn!(%ticket, %reply, "Server did not take the ticket back"),
            Err(e) => tracing::warn!(%ticket, "Could not return ticket: {:#}", e),
        }

        Ok(status?.code().unwrap_or(1))
    }
}
