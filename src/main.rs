#![allow(non_snake_case)]

use clap::Parser;

use tiled_aligner::params::Parameters;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let params = Parameters::parse();
    tiled_aligner::run(&params)
}
