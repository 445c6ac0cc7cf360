use clap::Parser;
use miette::IntoDiagnostic;

use zana_providers::Provider;

use super::GlobalOptions;

#[derive(Parser, Debug)]
pub struct Args {
    /// Restrict the sync to one provider (npm, pypi, golang, cargo). Syncs
    /// every provider when omitted.
    pub provider: Option<String>,
}

pub async fn execute(args: Args, global: &GlobalOptions) -> miette::Result<()> {
    let (_home, _registry, dispatcher) = super::boot(global).await?;

    match args.provider {
        Some(raw) => {
            let provider: Provider = raw.parse().into_diagnostic()?;
            let ok = dispatcher.sync_provider(provider).await.into_diagnostic()?;
            if ok {
                println!("{} {provider}", zana_consts::PACKAGE_STYLE.apply_to("synced"));
                Ok(())
            } else {
                eprintln!("{} {provider} did not fully converge", zana_consts::ERROR_STYLE.apply_to("error:"));
                std::process::exit(1);
            }
        }
        None => {
            let report = dispatcher.sync_all().await;
            println!("{}", report.report());
            if !report.ok() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
