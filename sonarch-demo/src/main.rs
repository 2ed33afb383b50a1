mod backend;
mod cli;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let level = if args.len() > 1 && args[1] == "--verbose" {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    cli::run_scripted_session()
}
