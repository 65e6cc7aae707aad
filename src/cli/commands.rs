use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "coubcore")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "TOML file with node settings")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "add", about = "Append a block without proof-of-work")]
    Add {
        #[arg(help = "Text payload for the block")]
        data: String,
    },
    #[command(name = "mine", about = "Mine a block on top of the local chain")]
    Mine {
        #[arg(help = "Text payload for the block")]
        data: String,
    },
    #[command(name = "list", about = "Print all blocks in the chain")]
    List,
    #[command(name = "validate", about = "Check the integrity of the local chain")]
    Validate,
    #[command(name = "connect", about = "Start a node and connect to a peer")]
    Connect {
        #[arg(help = "Peer address, e.g. 127.0.0.1:8001")]
        address: String,
        #[arg(long = "mine", help = "Keep mining blocks and broadcast them")]
        mine: bool,
    },
    #[command(name = "startnode", about = "Start a replication node")]
    StartNode {
        #[arg(long = "mine", help = "Keep mining blocks and broadcast them")]
        mine: bool,
    },
}
