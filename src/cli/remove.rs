use clap::Parser;
use miette::IntoDiagnostic;

use zana_providers::Provider;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Package identifier to remove. Omit when using `--all`.
    pub identifier: Option<String>,

    /// Remove every lockfile entry, optionally restricted to one provider.
    #[clap(long)]
    pub all: bool,

    /// Provider prefix to restrict `--all` to (npm, pypi, golang, cargo).
    #[clap(long, short)]
    pub prefix: Option<String>,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (_home, _registry, dispatcher) = super::boot(global).await?;

    if args.all {
        let provider = args.prefix.map(|p| p.parse::<Provider>()).transpose().into_diagnostic()?;
        let report = dispatcher.remove_all(provider).await;
        println!("{}", report.report());
        if !report.ok() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let Some(identifier) = args.identifier else {
        eprintln!("{} an identifier is required unless --all is given", zana_consts::ERROR_STYLE.apply_to("error:"));
        std::process::exit(2);
    };

    let ok = dispatcher.remove(&identifier).await.into_diagnostic()?;
    if ok {
        println!("{} {}", zana_consts::PACKAGE_STYLE.apply_to("removed"), identifier);
        Ok(())
    } else {
        eprintln!("{} failed to remove {}", zana_consts::ERROR_STYLE.apply_to("error:"), identifier);
        std::process::exit(1);
    }
}
