mod commands;
mod report;
mod settings;
mod terminal;

use commands::scan::Mode;
use commands::{CommandLine, Commands, RunArgs, reset, scan, status};
use settings::Settings;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    match commands.command {
        Commands::Scan { list, run } => {
            let settings = load_settings(&run)?;
            let _log = logging::init_logging(commands.verbose, commands.quiet, settings.output.log_dir())?;
            scan::scan(&list, settings, &run, Mode::Classify).await
        }
        Commands::Check { list, run } => {
            let settings = load_settings(&run)?;
            let _log = logging::init_logging(commands.verbose, commands.quiet, settings.output.log_dir())?;
            scan::scan(&list, settings, &run, Mode::Connectivity).await
        }
        Commands::Status { list } => {
            logging::init_logging(commands.verbose, commands.quiet, None)?;
            status::status(&list)
        }
        Commands::Reset { list, only } => {
            logging::init_logging(commands.verbose, commands.quiet, None)?;
            print::banner();
            reset::reset(&list, only)
        }
    }
}

fn load_settings(run: &RunArgs) -> anyhow::Result<Settings> {
    Ok(run.apply(Settings::load(run.config.as_deref())?))
}
