use clap::Parser;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[clap(version, about = "Lobby server for the Imposter party game")]
pub struct Args {
    /// Address to listen on.
    #[clap(long, env = "HOST", default_value = "0.0.0.0:3000")]
    pub host: SocketAddr,
}
