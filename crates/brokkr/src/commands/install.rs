//! `brokkr install` - resolve and install mods

use anyhow::{bail, Result};
use camino::Utf8Path;

use brokkr_core::{Error, PackageSpec};
use brokkr_install::{Downloader, HttpDownloader, ModInstaller};
use brokkr_registry::ResolveOptions;

use crate::cli::InstallArgs;
use crate::commands::{confirm, Context};
use crate::output;

pub async fn run(args: InstallArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let mut ctx = Context::load(instance)?;

    let specs: Vec<PackageSpec> = args
        .mods
        .iter()
        .map(|m| m.parse())
        .collect::<brokkr_core::Result<_>>()?;

    let options = ResolveOptions {
        with_recommends: !args.no_recommends,
        with_suggests: args.with_suggests,
        with_all_suggests: args.with_all_suggests,
        ..ResolveOptions::default()
    };

    let gate = ctx.gate();
    let mut installer = ModInstaller::new(&ctx.instance, &mut ctx.registry, &ctx.cache, gate);
    let (plan, reasons) = installer.plan_install(&specs, &options)?;

    if plan.is_empty() {
        output::info("Nothing to install");
        return Ok(());
    }

    output::header("About to install");
    for module in &plan {
        let cached = if ctx.cache.is_cached(module) { " (cached)" } else { "" };
        let reason = reasons
            .iter()
            .find(|(id, _)| id == module.identifier())
            .map(|(_, r)| r.as_str())
            .unwrap_or_default();
        println!(
            " * {} {}{cached} - {reason}",
            module.identifier(),
            module.version()
        );
    }

    if !confirm("Continue?", args.yes)? {
        bail!(Error::Cancelled);
    }

    let to_download: Vec<_> = plan
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

    let outcomes = installer.install_plan(&plan)?;
    for outcome in &outcomes {
        output::info(&outcome.to_string());
    }
    output::success(&format!("Installed {} mod(s)", outcomes.len()));
    Ok(())
}
