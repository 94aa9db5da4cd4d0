mod cli;
mod headless;
mod run;
mod sources;
mod window;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
