use clap::Parser;
use miette::IntoDiagnostic;

use zana_lockfile::Lockfile;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// List every package the registry knows about, not just installed ones.
    #[clap(long)]
    pub all: bool,

    /// Restrict the listing to one provider prefix (npm, pypi, golang, cargo).
    pub prefix: Option<String>,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (home, registry, _dispatcher) = super::boot(global).await?;

    if args.all {
        let items = registry.get_all();
        for item in items {
            if let Some(prefix) = &args.prefix {
                if !item.source_id.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            println!(
                "{} {} — {}",
                zana_consts::PROVIDER_STYLE.apply_to(&item.source_id),
                zana_consts::VERSION_STYLE.apply_to(&item.version),
                item.description
            );
        }
        return Ok(());
    }

    let lockfile = Lockfile::load(home.lockfile_path()).into_diagnostic()?;
    let packages = match &args.prefix {
        Some(prefix) => lockfile.get_by_provider(prefix),
        None => lockfile.get_all(),
    };
    for pkg in packages {
        println!(
            "{} {}",
            zana_consts::PROVIDER_STYLE.apply_to(&pkg.source_id),
            zana_consts::VERSION_STYLE.apply_to(&pkg.version)
        );
    }
    Ok(())
}
