use anyhow::Result;
use clap::Parser;
use sprite_resample::{logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level());

    let summary = cli.run()?;
    println!(
        "{} -> {} ({}x, {:?}) written to {}",
        summary.input_extent,
        summary.output_extent,
        summary.scale,
        summary.format,
        cli.output.display()
    );
    Ok(())
}
