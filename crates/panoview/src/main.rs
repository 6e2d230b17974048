mod bootstrap;
mod cli;
mod input;
mod run;
mod snapshot;
mod source;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
