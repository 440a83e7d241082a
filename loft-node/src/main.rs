// Loft node: identity, TCP transport, filesystem mailbox, console loop.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use loft_core::{
    AddressBook, DirectMessenger, MailboxService, Message, MessageSink, PeerDirectory, Transport,
    PROTOCOL_ID,
};
use loft_node::{config, kv_fs, repl};
use loft_node::transport_tcp::TcpTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("loft-node {VERSION}");
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let keypair =
        loft_core::identity::load_or_create(&cfg.identity_path).context("load or create identity")?;
    let local_id = keypair.peer_id();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let directory = Arc::new(PeerDirectory::new());
        let transport = TcpTransport::bind(local_id, directory.clone(), &cfg.listen_addr)
            .await
            .context("start transport")?;

        let sink: MessageSink = Arc::new(|m: Message| {
            println!(
                "\n<msg from={} when={}> {}",
                m.from,
                repl::format_when(m.when),
                m.body
            );
            print!("> ");
            std::io::stdout().flush().ok();
        });
        let chat_handler: loft_node::transport_tcp::InboundHandler =
            Arc::new(move |remote, stream| {
                tokio::spawn(loft_core::run_receive_loop(remote, stream, sink.clone()));
            });
        transport.set_stream_handler(PROTOCOL_ID, chat_handler);

        let kv = Arc::new(
            kv_fs::FsKvStore::open(&cfg.mailbox_dir, cfg.max_value_bytes)
                .context("open mailbox store")?,
        );
        let mailbox = MailboxService::new(kv);
        let transport_dyn: Arc<dyn Transport> = transport.clone();
        let address_book = AddressBook::new(local_id, directory.clone(), transport_dyn.clone());
        let messenger = DirectMessenger::new(local_id, transport_dyn.clone());

        println!("Started host:");
        println!("  Peer ID: {local_id}");
        for invite in address_book.invites() {
            println!("  - {invite}");
        }

        let repl = repl::Repl {
            local_id,
            address_book,
            messenger,
            mailbox,
            directory,
            transport: transport_dyn,
        };
        tokio::select! {
            r = repl::run(repl) => r,
            r = shutdown_signal() => r,
        }
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix). All spawned stream tasks end with the
/// runtime.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
