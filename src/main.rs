use clap::Parser;
use resolve_bridge::cli::{self, Args};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match cli::run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
