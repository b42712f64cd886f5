use anyhow::Result;
use clap::Args;
use console::style;

use super::DatasetArgs;

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let dataset = args.dataset.open()?;
    let p = &dataset.params;

    println!("Dataset:     {}", dataset.path.display());
    println!("Raw data:    {}", if dataset.has_raw_data { "yes" } else { "no" });
    if let Some(age) = dataset.age_days() {
        println!("Age:         {age} day(s)");
    }
    println!();
    println!("{}", style("Stored parameters").bold());
    println!("{p}");
    println!();
    println!("{}", style("Derived").bold());
    println!("dzFinal:    {:?}", p.dz_final());
    println!("deskew:     {}", p.deskew());
    println!("voxel:      {:?}", p.voxel());
    println!();

    if dataset.is_ready() {
        println!("{}", style("Ready to process").green());
    } else {
        println!("{}", style("Not ready to process").yellow());
    }

    Ok(())
}
