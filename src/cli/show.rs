use clap::Parser;
use miette::IntoDiagnostic;

use zana_lockfile::Lockfile;
use zana_providers::SourceId;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Package identifier to inspect, e.g. `npm:eslint`.
    pub identifier: String,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (home, registry, _dispatcher) = super::boot(global).await?;

    let source_id = SourceId::parse(&args.identifier).into_diagnostic()?;
    let item = registry.get_by_source_id(&source_id.canonical());
    let lockfile = Lockfile::load(home.lockfile_path()).into_diagnostic()?;
    let installed = lockfile.get(&source_id.canonical());

    println!("{}", zana_consts::PROVIDER_STYLE.apply_to(&item.source_id));
    if !item.name.is_empty() {
        println!("  name: {}", item.name);
    }
    if !item.description.is_empty() {
        println!("  description: {}", item.description);
    }
    if !item.version.is_empty() {
        println!("  latest known version: {}", zana_consts::VERSION_STYLE.apply_to(&item.version));
    }
    if !item.bin.is_empty() {
        println!("  exposed executables: {}", item.bin.keys().cloned().collect::<Vec<_>>().join(", "));
    }
    match installed {
        Some(pkg) => println!("  installed: {}", zana_consts::PACKAGE_STYLE.apply_to(&pkg.version)),
        None => println!("  installed: no"),
    }
    Ok(())
}
