use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, Command};

use syncr_p2p::config::Config;
use syncr_p2p::content_store::ContentStore;
use syncr_p2p::coordinator_client::ReqwestCoordinatorClient;
use syncr_p2p::event_db::EventDb;
use syncr_p2p::event_processor::EventProcessor;
use syncr_p2p::logging;

fn init_syncr_dir(profile: &str) -> Result<PathBuf, Box<dyn Error>> {
	let home = std::env::var("HOME").map_err(|_| "could not determine HOME directory")?;
	let dir = PathBuf::from(home).join(".syncr").join(profile);
	std::fs::create_dir_all(&dir)?;
	Ok(dir)
}

fn load_config(profile: &str) -> Result<Config, Box<dyn Error>> {
	let state_dir = init_syncr_dir(profile)?;
	let config_path = state_dir.join("config.json");
	let mut config = if config_path.exists() {
		let text = std::fs::read_to_string(&config_path)?;
		serde_json::from_str(&text)?
	} else {
		Config::default()
	};
	config.profile = profile.to_string();
	config.syncr_dir = state_dir;
	Ok(config)
}

fn open_stores(config: &Config) -> Result<(EventDb, ContentStore), Box<dyn Error>> {
	let event_db = EventDb::open(&config.syncr_dir.join("events.redb"))?;
	let content_store = ContentStore::open(&config.syncr_dir.join("content.redb"))?;
	Ok((event_db, content_store))
}

async fn cmd_run(config: Config) -> Result<(), Box<dyn Error>> {
	let (event_db, content_store) = open_stores(&config)?;
	let coordinator = Arc::new(ReqwestCoordinatorClient::new(config.p2p.coordinator_url.clone()));
	let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) * config.p2p.worker_pool_multiplier;

	let processor = EventProcessor::new(Arc::new(event_db), Arc::new(content_store), coordinator, worker_count, None);
	let handles = processor.spawn();

	tracing::info!(sync_root = %config.p2p.sync_root.display(), "syncr-p2p started");

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutdown requested, stopping event processor");
	processor.stop();
	for handle in handles {
		let _ = handle.await;
	}
	Ok(())
}

fn cmd_status(config: Config) -> Result<(), Box<dyn Error>> {
	let (event_db, _content_store) = open_stores(&config)?;
	let events = event_db.all_events()?;
	let min_server_event_id = event_db.get_min_server_event_id()?;
	println!("profile: {}", config.profile);
	println!("events in db: {}", events.len());
	println!("min server_event_id seen: {:?}", min_server_event_id);
	Ok(())
}

fn cmd_audit(config: Config) -> Result<(), Box<dyn Error>> {
	let (_event_db, content_store) = open_stores(&config)?;
	let discrepancies = content_store.check_patches();
	if discrepancies.is_empty() {
		println!("no refcount discrepancies found");
	} else {
		println!("{} discrepancies found:", discrepancies.len());
		for patch_id in discrepancies {
			println!("  patch {patch_id} has no matching reverse patch");
		}
	}
	Ok(())
}

fn cmd_set_excluded(config: Config, path: &str, excluded: bool) -> Result<(), Box<dyn Error>> {
	let (event_db, _content_store) = open_stores(&config)?;
	let folder = event_db.find_folder_by_relative_path(path).or_else(|| event_db.find_file_by_relative_path(path));
	let Some(folder) = folder else {
		return Err(format!("no tracked file or folder at path: {path}").into());
	};
	event_db.mark_child_excluded(folder.id, excluded)?;
	println!("{} {}", if excluded { "excluded" } else { "included" }, path);
	Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
	logging::init_tracing();

	let matches = Command::new("syncr")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Peer-to-peer file synchronization engine")
		.subcommand_required(true)
		.arg(Arg::new("profile").short('p').long("profile").value_name("PROFILE").help("Configuration profile").default_value("default"))
		.subcommand(Command::new("run").about("Start the sync daemon against the configured root"))
		.subcommand(Command::new("status").about("Query EventDB counters"))
		.subcommand(Command::new("audit").about("Recompute and report ContentStore refcount discrepancies"))
		.subcommand(Command::new("exclude").about("Add a path to the selective-sync exclusion list").arg(Arg::new("path").required(true)))
		.subcommand(Command::new("include").about("Remove a path from the selective-sync exclusion list").arg(Arg::new("path").required(true)))
		.get_matches();

	let profile = matches.get_one::<String>("profile").map(String::as_str).unwrap_or("default");
	let config = load_config(profile)?;

	match matches.subcommand() {
		Some(("run", _)) => {
			let runtime = tokio::runtime::Runtime::new()?;
			runtime.block_on(cmd_run(config))?;
		}
		Some(("status", _)) => cmd_status(config)?,
		Some(("audit", _)) => cmd_audit(config)?,
		Some(("exclude", sub)) => {
			let path = sub.get_one::<String>("path").expect("required");
			cmd_set_excluded(config, path, true)?;
		}
		Some(("include", sub)) => {
			let path = sub.get_one::<String>("path").expect("required");
			cmd_set_excluded(config, path, false)?;
		}
		_ => unreachable!("subcommand_required(true)"),
	}

	Ok(())
}

// vim: ts=4
