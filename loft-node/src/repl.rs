//! Interactive console: each command maps onto exactly one core operation.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use loft_core::{
    AddressBook, AddressValidity, DirectMessenger, MailboxError, MailboxService, PeerDirectory,
    PeerId, Transport,
};

pub struct Repl {
    pub local_id: PeerId,
    pub address_book: AddressBook,
    pub messenger: DirectMessenger,
    pub mailbox: MailboxService,
    pub directory: Arc<PeerDirectory>,
    pub transport: Arc<dyn Transport>,
}

pub async fn run(repl: Repl) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type 'help' for commands.");
    prompt();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            prompt();
            continue;
        }
        let mut parts = text.splitn(3, ' ');
        let cmd = parts.next().unwrap_or_default();
        let arg = parts.next();
        let rest = parts.next();
        match cmd {
            "help" => print_help(),
            "id" => println!("{}", repl.local_id),
            "peers" => list_peers(&repl),
            "invite" => print_invites(&repl),
            "connect" => match arg {
                None => println!("usage: connect <invite>"),
                Some(invite) => match repl.address_book.connect(invite).await {
                    Ok(peer) => println!("connected to {peer}"),
                    Err(e) => println!("connect error: {e}"),
                },
            },
            "msg" => match (arg.and_then(parse_peer), rest) {
                (Some(peer), Some(body)) => match repl.messenger.send(peer, body).await {
                    Ok(()) => println!("sent"),
                    Err(e) => println!("send error: {e}"),
                },
                _ => println!("usage: msg <peerID> <message>"),
            },
            "store" => match (arg.and_then(parse_peer), rest) {
                (Some(peer), Some(body)) => {
                    match repl.mailbox.store(peer, repl.local_id, body).await {
                        Ok(count) => {
                            println!("stored for offline delivery ({count} in mailbox)")
                        }
                        Err(e) => println!("store error: {e}"),
                    }
                }
                _ => println!("usage: store <peerID> <text>"),
            },
            "fetch" => match arg.and_then(parse_peer) {
                None => println!("usage: fetch <peerID>"),
                Some(peer) => match repl.mailbox.fetch(peer).await {
                    Ok(messages) => {
                        println!("fetched {} messages:", messages.len());
                        for (i, m) in messages.iter().enumerate() {
                            println!("{}) from={} at={}", i + 1, m.from, format_when(m.when));
                            println!("   {}", m.body);
                        }
                    }
                    Err(MailboxError::NotFound(peer)) => {
                        println!("no messages stored for {peer}")
                    }
                    Err(e) => println!("fetch error: {e}"),
                },
            },
            "quit" | "exit" => {
                println!("bye");
                return Ok(());
            }
            _ => println!("unknown command. type 'help'"),
        }
        prompt();
    }
    Ok(())
}

/// Render a message timestamp (epoch millis) as RFC3339 for display, the
/// way the console always has; out-of-range values fall back to the raw
/// number.
pub fn format_when(when: i64) -> String {
    chrono::DateTime::from_timestamp_millis(when)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| when.to_string())
}

fn parse_peer(text: &str) -> Option<PeerId> {
    match text.parse() {
        Ok(peer) => Some(peer),
        Err(e) => {
            println!("{e}");
            None
        }
    }
}

fn list_peers(repl: &Repl) {
    let connected = repl.transport.connected_peers();
    if connected.is_empty() {
        println!("no connected peers");
    } else {
        println!("connected peers:");
        for peer in connected {
            println!(" - {peer}");
        }
    }
    let known = repl.directory.peers();
    if !known.is_empty() {
        println!("known addresses:");
        for (peer, entries) in known {
            for entry in entries {
                let validity = match entry.validity {
                    AddressValidity::Permanent => "permanent",
                    AddressValidity::Transient => "transient",
                };
                println!(" - {peer} {} ({validity})", entry.addr);
            }
        }
    }
}

fn print_invites(repl: &Repl) {
    let invites = repl.address_book.invites();
    if invites.is_empty() {
        println!("no listen addresses available");
        return;
    }
    for invite in &invites {
        println!("{invite}");
    }
    println!("Share one of the lines above with peers. They can 'connect <that-line>'.");
}

fn print_help() {
    println!("commands:");
    println!("  peers                  - list connected peers and known addresses");
    println!("  invite                 - print invite lines");
    println!("  connect <invite>       - connect to a peer using their invite string");
    println!("  msg <peerID> <message> - send immediate message to peer (if online)");
    println!("  store <peerID> <text>  - append message to recipient's offline mailbox");
    println!("  fetch <peerID>         - fetch stored messages for peerID");
    println!("  id                     - print your peer id");
    println!("  help                   - help");
    println!("  quit                   - exit");
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}
