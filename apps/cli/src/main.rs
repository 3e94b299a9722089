use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use portal_core::{
    GalleryStatus, HttpLedgerClient, PortalClient, PortalEvent, PortalHandle, SignerExtension,
};
use shared::domain::{ProgramId, WalletAddress};
use url::Url;

use crate::signer::DevSigner;

mod config;
mod signer;

#[derive(Parser, Debug)]
struct Args {
    /// Ledger endpoint; overrides portal.toml and environment.
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    program_id: Option<String>,
    #[arg(long)]
    signer_address: Option<String>,
    /// Initialize the record if it is not set up yet.
    #[arg(long)]
    initialize: bool,
    /// Link to append; omit to just list the gallery.
    #[arg(long)]
    link: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(v) = args.endpoint.clone() {
        settings.endpoint = v;
    }
    if let Some(v) = args.program_id.clone() {
        settings.program_id = v;
    }
    if let Some(v) = args.signer_address.clone() {
        settings.signer_address = v;
    }

    let endpoint = Url::parse(&settings.endpoint).context("invalid ledger endpoint")?;
    let signer: Arc<dyn SignerExtension> = Arc::new(DevSigner::new(
        endpoint.clone(),
        WalletAddress::new(settings.signer_address),
    ));
    let ledger = Arc::new(HttpLedgerClient::new(
        endpoint,
        ProgramId::new(settings.program_id),
        Arc::clone(&signer),
    ));
    let portal = PortalClient::new_with_dependencies(signer, ledger);

    run(portal, args).await
}

async fn run(portal: impl PortalHandle, args: Args) -> Result<()> {
    let mut events = portal.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let PortalEvent::Error(message) = event {
                eprintln!("error: {message}");
            }
        }
    });

    let address = match portal.try_auto_connect().await {
        Some(address) => address,
        None => portal.connect_interactive().await?,
    };
    println!("Connected as {address}");

    if args.initialize {
        let action = portal.initialize().await?;
        println!("Initialize: {action:?}");
    }

    if let Some(link) = args.link {
        portal.set_input(&link).await;
        let input = portal.input().await;
        let outcome = portal.submit(&input).await?;
        println!("Submit: {outcome:?}");
    }

    let gallery = portal.gallery_state().await;
    match gallery.status {
        GalleryStatus::Ready => {
            println!("Gallery ({} entries):", gallery.entries.len());
            for entry in &gallery.entries {
                println!("  {} (added by {})", entry.link, entry.submitter);
            }
        }
        GalleryStatus::Uninitialized => {
            println!("Record is not initialized yet; run with --initialize to create it.");
        }
        status => bail!("gallery is unavailable: {status:?}"),
    }

    Ok(())
}
