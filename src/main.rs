mod abi;
mod aggregator;
mod config;
mod contract;
mod error;
mod loader;
mod parse;
mod record;
mod report;
mod rpc;
mod steward;
mod upload;

use crate::abi::Address;
use crate::aggregator::{Aggregator, Enumeration, FetchSettings, enumerate_badges};
use crate::config::Config;
use crate::contract::RpcContract;
use crate::error::{Error, Result};
use crate::loader::LoadState;
use crate::parse::{Args, Command};
use crate::record::{PlantRecord, PlantView, filter, is_adoptable, now_seconds, photo_url, views};
use crate::rpc::RpcClient;
use crate::steward::Steward;
use crate::upload::{ProxyState, UploadClient};
use clap::Parser;
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// How a listing is written out.
struct Output {
    path: Option<PathBuf>,
    json: bool,
    gateway: Option<String>,
}

impl Output {
    fn emit(&self, list: &[PlantView]) -> Result<()> {
        if self.json {
            report::print_json(list, self.gateway.as_deref())?;
        } else {
            report::print_plants(list);
            report::print_summary(list);
        }
        if let Some(path) = &self.path {
            report::save_to_csv(list, self.gateway.as_deref(), path)?;
        }
        Ok(())
    }
}

pub fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn parse_account(account: Option<&str>) -> Result<Option<Address>> {
    match account.map(str::trim).filter(|a| !a.is_empty()) {
        None => Ok(None),
        Some(a) => Address::parse(a).map(Some),
    }
}

fn show_list(records: Vec<PlantRecord>, viewer: Option<&Address>, adoptable_only: bool, out: &Output) -> Result<()> {
    let all = views(records, now_seconds(), viewer);
    let shown = if adoptable_only {
        filter(&all, is_adoptable)
    } else {
        all
    };
    if shown.is_empty() {
        println!("The garden is empty. Be the first to plant a seed: `plantsoul register`.");
        return Ok(());
    }
    out.emit(&shown)
}

fn show_state(state: &LoadState<Vec<PlantRecord>>, viewer: Option<&Address>, adoptable_only: bool, out: &Output) {
    match state {
        LoadState::Ready(records) => {
            if let Err(e) = show_list(records.clone(), viewer, adoptable_only, out) {
                error!("Could not write plant list: {}", e);
            }
        }
        LoadState::Failed(reason) => println!("Plants are unavailable right now: {reason}"),
        LoadState::Idle | LoadState::Loading => {}
    }
}

async fn load_view(aggregator: &Aggregator<'_, RpcContract>, id: u64, account: Option<&Address>) -> Result<PlantView> {
    let record = aggregator.fetch_plant(id).await?;
    Ok(PlantView::new(record, now_seconds(), account))
}

async fn run(command: Command, config: &Config) -> Result<()> {
    // Commands that never touch the chain.
    let command = match command {
        Command::ServeUploads { bind, pinata_jwt } => {
            let jwt = pinata_jwt
                .filter(|j| !j.is_empty())
                .ok_or_else(|| Error::Config("PINATA_JWT is required to run the upload proxy".into()))?;
            return upload::serve(&bind, ProxyState::new(jwt)?).await;
        }
        Command::Upload { file } => {
            let client = UploadClient::new(&config.upload_url, UPLOAD_TIMEOUT)?;
            let cid = client.upload(&file).await?;
            println!("{cid}");
            if let Some(url) = photo_url(config.gateway.as_deref(), &cid) {
                println!("{url}");
            }
            return Ok(());
        }
        other => other,
    };

    let rpc = Arc::new(
        RpcClient::new(&config.rpc_url, config.fetch_timeout)?
            .with_max_retries(config.max_retries)
            .with_delay(config.retry_delay_ms),
    );
    let settings = FetchSettings::from_config(config);

    if let Command::Badges { account } = &command {
        let badges = RpcContract::new(Arc::clone(&rpc), config.badge()?.clone());
        let Some(account) = parse_account(account.as_deref())? else {
            println!("Please connect your wallet to view badges.");
            return Ok(());
        };
        let ids = enumerate_badges(&badges, Some(&account), &settings).await?;
        if ids.is_empty() {
            println!("No Badges Earned Yet. Transfer a plant to a new steward to earn your first badge.");
        }
        for id in ids {
            println!("Steward Badge #{id}");
        }
        return Ok(());
    }

    let registry = RpcContract::new(rpc, config.registry()?.clone());
    debug!("Plant registry at {}", registry.address());
    let aggregator = Aggregator::new(&registry, settings);
    let uploader = UploadClient::new(&config.upload_url, UPLOAD_TIMEOUT)?;

    match command {
        Command::Mine {
            account,
            watch,
            output,
            json,
        } => {
            let out = Output {
                path: output,
                json,
                gateway: config.gateway.clone(),
            };
            let Some(account) = parse_account(account.as_deref())? else {
                println!("Wallet not connected. Pass --account or set WALLET_ACCOUNT to view your garden.");
                return Ok(());
            };
            if let Some(secs) = watch {
                let source = Enumeration::ByOwner(account.clone());
                return loader::watch(&aggregator, &source, Duration::from_secs(secs.max(1)), |state| {
                    show_state(state, Some(&account), false, &out)
                })
                .await;
            }
            let start = Instant::now();
            let records = aggregator.enumerate_by_owner(Some(&account)).await?;
            info!("Fetched {} plants in {}", records.len(), format_hms(start.elapsed()));
            if records.is_empty() {
                println!("Your garden is empty. Register a plant or adopt one from the community.");
                return Ok(());
            }
            show_list(records, Some(&account), false, &out)
        }
        Command::Community {
            adoptable,
            account,
            watch,
            output,
            json,
        } => {
            let out = Output {
                path: output,
                json,
                gateway: config.gateway.clone(),
            };
            let account = parse_account(account.as_deref())?;
            if let Some(secs) = watch {
                return loader::watch(&aggregator, &Enumeration::All, Duration::from_secs(secs.max(1)), |state| {
                    show_state(state, account.as_ref(), adoptable, &out)
                })
                .await;
            }
            let start = Instant::now();
            let records = match aggregator.enumerate_all().await {
                Ok(records) => records,
                Err(e) => {
                    println!("Plants are unavailable right now.");
                    return Err(e);
                }
            };
            info!("Fetched {} plants in {}", records.len(), format_hms(start.elapsed()));
            show_list(records, account.as_ref(), adoptable, &out)
        }
        Command::Plant { id, account } => {
            let account = parse_account(account.as_deref())?;
            let view = load_view(&aggregator, id, account.as_ref()).await?;
            report::print_detail(&view, config.gateway.as_deref());
            Ok(())
        }
        Command::Legacy { id } => {
            let plant = aggregator.fetch_legacy(id).await?;
            println!("#{} {} ({})", plant.id, plant.name, plant.species);
            println!("  Steward:     {}", plant.current_steward);
            println!("  Last proof:  {}", plant.last_proof_time);
            println!("  Photo:       {}", plant.latest_photo_ipfs);
            println!("  Memorial:    {}", plant.is_memorialized);
            Ok(())
        }
        Command::Register {
            account,
            species,
            name,
            photo,
        } => {
            let steward = Steward::new(&registry, &uploader, parse_account(account.as_deref())?);
            let tx = steward
                .register_plant(&species, &name, Some(photo.as_path()))
                .await?;
            println!("Plant registered in transaction {tx}");
            Ok(())
        }
        Command::Transfer { id, account, to } => {
            let account = parse_account(account.as_deref())?;
            let view = load_view(&aggregator, id, account.as_ref()).await?;
            let steward = Steward::new(&registry, &uploader, account);
            let tx = steward.transfer_stewardship(&view, &to).await?;
            println!("Stewardship of #{id} transferred in transaction {tx}");
            Ok(())
        }
        Command::Proof { id, account, photo } => {
            let account = parse_account(account.as_deref())?;
            let view = load_view(&aggregator, id, account.as_ref()).await?;
            let steward = Steward::new(&registry, &uploader, account);
            let tx = steward.photo_proof(&view, Some(photo.as_path())).await?;
            println!("Care proof for #{id} recorded in transaction {tx}");
            Ok(())
        }
        Command::Memorialize { id, account, yes } => {
            let account = parse_account(account.as_deref())?;
            let view = load_view(&aggregator, id, account.as_ref()).await?;
            let steward = Steward::new(&registry, &uploader, account);
            let tx = steward.memorialize(&view, yes).await?;
            println!("#{id} memorialized in transaction {tx}");
            Ok(())
        }
        Command::AdoptList {
            id,
            account,
            location,
        } => {
            let account = parse_account(account.as_deref())?;
            let view = load_view(&aggregator, id, account.as_ref()).await?;
            let steward = Steward::new(&registry, &uploader, account);
            let tx = steward.list_for_adoption(&view, &location).await?;
            println!("#{id} listed for adoption in transaction {tx}");
            Ok(())
        }
        Command::Badges { .. } | Command::Upload { .. } | Command::ServeUploads { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // Initialize logger
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Config::from_args(&args)?;
    run(args.command, &config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::from_secs(5)), "00:00:05");
        assert_eq!(format_hms(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn test_parse_account() {
        assert_eq!(parse_account(None).unwrap(), None);
        assert_eq!(parse_account(Some("  ")).unwrap(), None);
        let parsed = parse_account(Some("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.as_str(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(parse_account(Some("alice")).is_err());
    }
}
