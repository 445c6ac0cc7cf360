use clap::Parser;
use miette::IntoDiagnostic;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Package identifier, e.g. `npm:eslint` or `pkg:npm/eslint`.
    pub identifier: String,

    /// Version to install. Defaults to `latest`.
    #[clap(default_value = "latest")]
    pub version: String,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (_home, _registry, dispatcher) = super::boot(global).await?;

    let ok = dispatcher.install(&args.identifier, &args.version).await.into_diagnostic()?;
    if ok {
        println!("{} {}", zana_consts::PACKAGE_STYLE.apply_to("installed"), args.identifier);
        Ok(())
    } else {
        eprintln!("{} failed to install {}", zana_consts::ERROR_STYLE.apply_to("error:"), args.identifier);
        std::process::exit(1);
    }
}
