//! Built-in bot commands and the simulation console

use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use parley_core::storage::memory::MemoryCredentialStore;
use parley_core::{Address, DisconnectReason, InboundMessage, SessionStatus};
use parley_protocol::handlers::echo;
use parley_protocol::transport::memory::{MemoryNetwork, MemoryTransportFactory};
use parley_protocol::{
    Client, InboundRouter, LogPairingRenderer, Matcher, PairingRenderer, SessionEnd, StaticReply,
    TerminalQrRenderer,
};

use crate::config::CliConfig;

/// Reply to `/help`
pub const HELP_REPLY: &str = "Commands: /help, /ping, /echo <text>";

/// Reply to any message mentioning "hello"
pub const GREETING_REPLY: &str = "Hello! Send /help to see what I can do.";

/// Register the built-in bot commands
pub fn register_bot(router: &InboundRouter) {
    router.register("help", Matcher::exact("/help"), StaticReply::new(HELP_REPLY));
    router.register("ping", Matcher::exact("/ping"), StaticReply::new("pong"));
    router.register("echo", Matcher::prefix("/echo "), echo("/echo "));
    router.register("greeting", Matcher::contains("hello"), StaticReply::new(GREETING_REPLY));
}

/// One console line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Deliver a live message from `from`
    From { from: String, text: String },
    /// Replay a backlog message from `from`
    Backlog { from: String, text: String },
    /// Send a message to `to`
    Send { to: String, text: String },
    /// Simulate a recoverable connection drop
    Drop,
    /// Simulate a logout from the phone
    Logout,
    /// Show session status
    Status,
    /// List outgoing messages
    Outbox,
    /// List console commands
    Help,
    /// Shut down and exit
    Quit,
}

impl ConsoleCommand {
    /// Parse a console line; `Ok(None)` for blank input
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match verb {
            "from" => {
                let (from, text) = addressed(rest)?;
                Self::From { from, text }
            }
            "backlog" => {
                let (from, text) = addressed(rest)?;
                Self::Backlog { from, text }
            }
            "send" => {
                let (to, text) = addressed(rest)?;
                Self::Send { to, text }
            }
            "drop" => Self::Drop,
            "logout" => Self::Logout,
            "status" => Self::Status,
            "outbox" => Self::Outbox,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };

        Ok(Some(command))
    }
}

fn addressed(rest: &str) -> Result<(String, String), String> {
    match rest.split_once(char::is_whitespace) {
        Some((address, text)) if !text.trim().is_empty() => {
            Ok((address.to_string(), text.trim().to_string()))
        }
        _ => Err("expected <address> <text>".to_string()),
    }
}

const CONSOLE_HELP: &str = "\
  from <addr> <text>     deliver a live message
  backlog <addr> <text>  replay a message as history
  send <addr> <text>     send a message
  drop                   drop the connection
  logout                 revoke the session
  status                 show session status
  outbox                 list outgoing messages
  quit                   shut down";

/// Run a client against an in-memory network and drive it from stdin
pub async fn simulate(
    config: &CliConfig,
    account: &str,
    registered: &[String],
) -> anyhow::Result<()> {
    let network = MemoryNetwork::new(account);
    for address in registered {
        let address = Address::parse(address, &config.client.dispatch.user_domain);
        network.register(address.bare());
    }

    let client = simulation_client(config, &network)?;
    register_bot(client.router());

    client.start_session().await?;
    info!(
        "Simulated network up; {} registered destination(s)",
        registered.len()
    );
    println!("{}", style("Type 'help' for console commands.").dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    let clear_on_logout = config.client.credentials.clear_on_logout;

    loop {
        let line = tokio::select! {
            end = client.wait() => {
                report_end(end, clear_on_logout);
                return Ok(());
            }
            line = lines.next_line() => line?,
        };

        // EOF
        let Some(line) = line else { break };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{} {}", style("error:").red(), e);
                continue;
            }
        };
        debug!(?command, "Console command");

        let domain = &config.client.dispatch.user_domain;
        match command {
            ConsoleCommand::From { from, text } => {
                let from = Address::parse(&from, domain);
                // Anyone who can message us is a registered account
                network.register(from.bare());
                network
                    .deliver(vec![InboundMessage::text(from.qualified(), text)])
                    .await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                shown = print_outbox(&network, shown);
            }
            ConsoleCommand::Backlog { from, text } => {
                let from = Address::parse(&from, domain);
                network
                    .replay(vec![InboundMessage::text(from.qualified(), text)])
                    .await;
            }
            ConsoleCommand::Send { to, text } => {
                let outcome = client.send_message(&to, &text).await;
                println!("{}", serde_json::to_string(&outcome.to_record())?);
                shown = network.sent().len();
            }
            ConsoleCommand::Drop => {
                network.disconnect(DisconnectReason::ConnectionLost).await;
            }
            ConsoleCommand::Logout => {
                network.disconnect(DisconnectReason::LoggedOut).await;
            }
            ConsoleCommand::Status => print_status(&client.status()),
            ConsoleCommand::Outbox => {
                print_outbox(&network, 0);
            }
            ConsoleCommand::Help => println!("{}", CONSOLE_HELP),
            ConsoleCommand::Quit => break,
        }
    }

    report_end(client.shutdown().await, clear_on_logout);
    Ok(())
}

fn simulation_client(config: &CliConfig, network: &Arc<MemoryNetwork>) -> anyhow::Result<Client> {
    let renderer: Arc<dyn PairingRenderer> = if config.render_qr {
        Arc::new(TerminalQrRenderer)
    } else {
        Arc::new(LogPairingRenderer)
    };

    // Simulated pairing material stays out of the real credential directory
    let client = Client::builder(Arc::new(MemoryTransportFactory::new(network.clone())))
        .config(config.client.clone())
        .credential_store(MemoryCredentialStore::new())
        .pairing_renderer(renderer)
        .build()?;
    Ok(client)
}

/// Print messages sent since `from`; returns the new count
fn print_outbox(network: &MemoryNetwork, from: usize) -> usize {
    let sent = network.sent();
    for record in sent.iter().skip(from) {
        println!("{} {}: {}", style("->").green(), style(&record.to).cyan(), record.body);
    }
    sent.len()
}

fn print_status(status: &SessionStatus) {
    println!("  State:     {}", style(status.state()).bold());
    if let Some(identity) = status.identity() {
        println!("  Account:   {}", style(identity).cyan());
    }
    if let Some(at) = status.connected_at().and_then(|t| t.as_datetime()) {
        println!("  Connected: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(disconnect) = status.last_disconnect() {
        println!(
            "  Last drop: {}{}",
            style(disconnect.reason).yellow(),
            disconnect
                .message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
    }
}

fn report_end(end: Option<SessionEnd>, clear_on_logout: bool) {
    if let Some(end) = end {
        println!("{}", end_banner(&end, clear_on_logout));
    }
}

fn end_banner(end: &SessionEnd, clear_on_logout: bool) -> String {
    match end {
        SessionEnd::LoggedOut if clear_on_logout => style(
            "Logged out. Stored credentials were discarded; pair again to continue.",
        )
        .yellow()
        .to_string(),
        SessionEnd::LoggedOut => style(
            "Logged out. Stored credentials were kept but the network no longer accepts them.",
        )
        .yellow()
        .to_string(),
        end => format!("Session {}", end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addressed_commands() {
        assert_eq!(
            ConsoleCommand::parse("from 79123456789 /echo hi there").unwrap(),
            Some(ConsoleCommand::From {
                from: "79123456789".to_string(),
                text: "/echo hi there".to_string(),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("  send 79123456789@s.whatsapp.net hello ").unwrap(),
            Some(ConsoleCommand::Send {
                to: "79123456789@s.whatsapp.net".to_string(),
                text: "hello".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(ConsoleCommand::parse("drop").unwrap(), Some(ConsoleCommand::Drop));
        assert_eq!(ConsoleCommand::parse("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("from 79123456789").is_err());
        assert!(ConsoleCommand::parse("teleport").is_err());
    }

    #[test]
    fn test_logout_banner_follows_config() {
        let cleared = end_banner(&SessionEnd::LoggedOut, true);
        let kept = end_banner(&SessionEnd::LoggedOut, false);

        assert!(cleared.contains("discarded"));
        assert!(!kept.contains("discarded"));
        assert!(kept.contains("kept"));
        assert_eq!(
            end_banner(&SessionEnd::Shutdown, true),
            format!("Session {}", SessionEnd::Shutdown)
        );
    }

    #[tokio::test]
    async fn test_simulation_leaves_credential_dir_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::default();
        config.render_qr = false;
        config.client.credentials.dir = dir.path().join("auth_info");

        let network = MemoryNetwork::new("79000000000@s.whatsapp.net");
        let client = simulation_client(&config, &network).unwrap();
        client.start_session().await.unwrap();
        let mut status = client.subscribe();
        status.wait_for(|s| s.is_open()).await.unwrap();
        client.shutdown().await;

        assert!(!config.client.credentials.dir.exists());
    }

    #[test]
    fn test_bot_registration() {
        let router = InboundRouter::new(
            Arc::new(parley_protocol::MessageDispatcher::default()),
            parley_protocol::DispatchPolicy::FirstMatch,
        );
        register_bot(&router);
        assert_eq!(router.len(), 4);
    }
}
