use clap::Parser;
use silly_hash_index::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{}", e);
    }

    let storage = match setup_db(&cli) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.repl {
        run_repl(storage).await;
    } else {
        process_from_stdin(storage).await;
    }
}
