mod app;
mod cli;
mod logging;
mod settings;

use clap::Parser;

pub use app::App;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    logging::init(cli.log_format)?;

    let app = App::new(cli)?;
    app.run()?;

    Ok(())
}
