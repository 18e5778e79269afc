//! `brokkr upgrade` - move installed mods to newer versions

use anyhow::{bail, Result};
use camino::Utf8Path;

use brokkr_core::{Error, PackageSpec};
use brokkr_install::{Downloader, HttpDownloader, ModInstaller};

use crate::cli::UpgradeArgs;
use crate::commands::{confirm, Context};
use crate::output;

pub async fn run(args: UpgradeArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let mut ctx = Context::load(instance)?;

    let specs: Vec<PackageSpec> = if args.all {
        ctx.registry
            .installed_modules()
            .map(|m| PackageSpec {
                identifier: m.identifier().to_string(),
                version: None,
            })
            .collect()
    } else {
        args.mods
            .iter()
            .map(|m| m.parse())
            .collect::<brokkr_core::Result<_>>()?
    };
    if specs.is_empty() {
        output::info("Nothing to upgrade");
        return Ok(());
    }

    let gate = ctx.gate();
    let mut installer = ModInstaller::new(&ctx.instance, &mut ctx.registry, &ctx.cache, gate);
    let plan = installer.plan_upgrade(&specs)?;

    output::header("Upgrade plan");
    for note in &plan.notes {
        println!(" * {note}");
    }

    if !confirm("Continue?", args.yes)? {
        bail!(Error::Cancelled);
    }

    let to_download: Vec<_> = plan
        .to_install
        .iter()
        .filter(|m| !m.is_metapackage() && !ctx.cache.is_cached(m))
        .cloned()
        .collect();
    if !to_download.is_empty() {
        let spinner = output::spinner(&format!("Downloading {} mod(s)", to_download.len()));
        let downloader = HttpDownloader::new(ctx.settings.owner_token.clone())?;
        let outcome = downloader.fetch_all(&to_download, &ctx.cache).await;
        spinner.finish_and_clear();
        outcome?;
    }

    let outcomes = installer.apply_upgrade(&plan)?;
    for outcome in &outcomes {
        output::info(&outcome.to_string());
    }
    output::success("Upgrade complete");
    Ok(())
}
