//! meshfwdd: mesh transport node over the UDP bench link.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use meshfwd_core::config::MeshfwdConfig;
use meshfwd_core::Gid;
use meshfwd_services::{GroupListener, GroupTracker, MessageListener, Priority};
use meshfwdd::link::UdpLink;
use meshfwdd::Transport;

mod command;

use command::{Command, CommandError};

/// Prints transport events to stdout.
struct Console;

impl MessageListener for Console {
    fn on_message_received(&self, sender: Gid, message: &[u8]) {
        println!("<{sender}> {}", String::from_utf8_lossy(message));
    }
}

impl GroupListener for Console {
    fn on_peer_discovered(&self, callsign: &str, gid: Gid, uid: &str) {
        println!("* peer {callsign} (gid {gid}, uid {uid})");
    }

    fn on_group_created(&self, group_id: Gid, member_gids: &[Gid]) {
        println!("* group {group_id}: {member_gids:?}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = MeshfwdConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MeshfwdConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MeshfwdConfig::default()
    });
    tracing::info!(
        gid = config.identity.gid,
        callsign = %config.identity.callsign,
        "meshfwdd starting"
    );

    let (link, events) = UdpLink::bind(&config.bench)
        .await
        .context("failed to bind bench link")?;
    let transport = Transport::new(config, link, events).context("invalid configuration")?;

    let console = Arc::new(Console);
    transport.add_message_listener(console.clone());
    transport.add_group_listener(console);

    transport.start().await.context("failed to start transport")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                let Some(line) = line.context("stdin read failed")? else {
                    break;
                };
                match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(cmd) => run(&transport, cmd).await,
                    Err(CommandError::Empty) => {}
                    Err(e) => eprintln!("! {e}"),
                }
            }
        }
    }

    transport.shutdown().await;
    Ok(())
}

async fn run(transport: &Transport, cmd: Command) {
    let outcome = match cmd {
        Command::CreateGroup(members) => transport.create_group(members).await.map(|_| ()),
        Command::Invite(new_members) => {
            let mut all = transport
                .directory()
                .current_group()
                .map(|g| g.member_gids)
                .unwrap_or_default();
            for gid in &new_members {
                if !all.contains(gid) {
                    all.push(*gid);
                }
            }
            transport
                .add_to_group(all, &new_members)
                .await
                .map(|accepted| println!("* {accepted} invitation(s) sent"))
        }
        Command::Discover => transport.broadcast_discovery(),
        Command::Peers => {
            for peer in transport.directory().peers() {
                println!("* {} gid={} uid={}", peer.callsign, peer.gid, peer.uid);
            }
            Ok(())
        }
        Command::Send { destination, text } => {
            transport.send(text.into_bytes(), destination, Priority::Normal)
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = outcome {
        eprintln!("! {e}");
    }
}
