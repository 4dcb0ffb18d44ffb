use clap::Parser;
use zerofeed::cli::Cli;
use zerofeed::{logging, update};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let workers = cli.worker_count();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        // Extraction, digest walks and downloads-to-disk run on blocking
        // threads so the cooperative scheduler never stalls.
        .max_blocking_threads(5 * workers)
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to build runtime: {error}");
            return std::process::ExitCode::from(1);
        }
    };

    let config = update::RunConfig::from_cli(&cli);
    let code = runtime.block_on(update::run(&config));
    std::process::ExitCode::from(code)
}
