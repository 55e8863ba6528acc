mod cli;
mod controls;
mod run;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::initialise_tracing();
    run::run(args)
}
