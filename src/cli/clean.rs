use clap::Parser;
use miette::IntoDiagnostic;

use zana_providers::Provider;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Provider whose install area should be wiped and reconstructed
    /// (npm, pypi, golang, cargo).
    pub provider: String,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (_home, _registry, dispatcher) = super::boot(global).await?;

    let provider: Provider = args.provider.parse().into_diagnostic()?;
    let ok = dispatcher.clean(provider).await.into_diagnostic()?;
    if ok {
        println!("{} {provider}", zana_consts::PACKAGE_STYLE.apply_to("cleaned"));
        Ok(())
    } else {
        eprintln!("{} failed to clean {provider}", zana_consts::ERROR_STYLE.apply_to("error:"));
        std::process::exit(1);
    }
}
