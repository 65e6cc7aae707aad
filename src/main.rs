// Entry point for the node binary
use clap::Parser;
use coubcore::{
    validate_chain, Block, Command, Config, Ledger, Opt, ProofOfWork, Server, ServerConfig,
    GLOBAL_CONFIG,
};
use log::{error, info, warn, LevelFilter};
use std::process;
use std::thread;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &opt.config {
        Some(path) => Config::load(path)?,
        None => GLOBAL_CONFIG.clone(),
    };

    match opt.command {
        Command::Add { data } => {
            let ledger = Ledger::open(&config.db_path)?;
            let block = ledger.append(data)?;
            print_block(&block);
            ledger.close()?;
        }
        Command::Mine { data } => {
            let ledger = Ledger::open(&config.db_path)?;
            match ProofOfWork::mine_next(&ledger, data)? {
                Some(block) => print_block(&block),
                None => println!("No block was mined"),
            }
            ledger.close()?;
        }
        Command::List => {
            let ledger = Ledger::open(&config.db_path)?;
            for block in ledger.snapshot() {
                print_block(&block);
            }
            ledger.close()?;
        }
        Command::Validate => {
            let ledger = Ledger::open(&config.db_path)?;
            match validate_chain(&ledger.snapshot()) {
                Ok(()) => println!("Chain of {} blocks is valid", ledger.length()),
                Err(e) => println!("Chain is invalid: {e}"),
            }
            ledger.close()?;
        }
        Command::Connect { address, mine } => {
            let server = start_server(&config)?;
            server.connect_to_peer(&address)?;
            info!("Connected to {address}");
            serve(&server, mine);
        }
        Command::StartNode { mine } => {
            let server = start_server(&config)?;
            serve(&server, mine);
        }
    }
    Ok(())
}

fn start_server(config: &Config) -> Result<Server, Box<dyn std::error::Error>> {
    let ledger = Ledger::open(&config.db_path)?;
    info!(
        "Opened ledger at {} with {} blocks",
        ledger.get_path().display(),
        ledger.length()
    );
    let server = Server::new(ledger, ServerConfig::from(config));
    server.start()?;
    Ok(server)
}

// Runs until the process is killed
fn serve(server: &Server, mine: bool) {
    if !mine {
        loop {
            thread::park();
        }
    }

    info!("Mining is on");
    loop {
        let token = server.mining_token();
        let miner = server
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let data = format!("Block mined by {miner}");
        match ProofOfWork::mine_next_with_cancel(server.ledger(), data, &token) {
            Ok(Some(block)) => match server.announce_block(&block) {
                Ok(sent) => info!("Announced block #{} to {sent} peers", block.get_index()),
                Err(e) => warn!("Failed to announce block #{}: {e}", block.get_index()),
            },
            // Cancelled by a peer's block or overtaken; start again on the new head
            Ok(None) => {}
            Err(e) => {
                error!("Mining stopped: {e}");
                loop {
                    thread::park();
                }
            }
        }
    }
}

fn print_block(block: &Block) {
    println!("Index: {}", block.get_index());
    println!("Timestamp: {}", block.get_timestamp());
    println!("Previous hash: {}", block.get_previous_hash());
    println!("Hash: {}", block.get_hash());
    println!("Data: {}", block.get_data());
    println!("Nonce: {}", block.get_nonce());
    println!("Difficulty: {}", block.get_difficulty());
    println!();
}
