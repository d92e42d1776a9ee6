use clap::Parser;
use imposter_server::{args::Args, run, setup_logging};

#[tokio::main]
async fn main() {
    setup_logging();
    let args = Args::parse();
    run(args.host)
        .await
        .expect("Unable to run lobby server, is the address already in use?");
}
