//! `brokkr update` - refresh the available-mod index from a repository

use std::path::Path;

use anyhow::Result;
use camino::Utf8Path;

use brokkr_registry::{feed, scan};

use crate::cli::UpdateArgs;
use crate::commands::Context;
use crate::output;

pub async fn run(args: UpdateArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let mut ctx = Context::load(instance)?;

    let repo = args
        .repo
        .clone()
        .unwrap_or_else(|| ctx.settings.repository.clone());

    let spinner = output::spinner(&format!("Refreshing from {repo}"));
    let local = Path::new(&repo);
    let summary = if local.exists() {
        feed::refresh_from_path(&mut ctx.registry, local)
    } else {
        feed::refresh_from_url(&mut ctx.registry, &repo).await
    };
    spinner.finish_and_clear();
    let summary = summary?;

    // Drop-ins may now have matching metadata; rescan so dependency checks
    // see them.
    let dropins = scan::scan_preexisting(&ctx.instance, &mut ctx.registry)?;
    ctx.registry.save()?;

    output::success(&format!(
        "Refreshed {} module release(s), {} drop-in mod(s) detected",
        summary.modules, dropins
    ));
    if summary.skipped > 0 {
        output::warning(&format!(
            "{} record(s) skipped (malformed or newer metadata schema)",
            summary.skipped
        ));
    }

    let gate = ctx.gate();
    let installable = ctx.registry.available(&gate).len();
    output::info(&format!(
        "{installable} mod(s) installable against game version {}",
        ctx.settings.game_version
    ));

    if args.list_changes {
        if summary.new_releases.is_empty() && summary.removed_modules.is_empty() {
            output::info("No changes since the last refresh");
        }
        if !summary.new_releases.is_empty() {
            output::header("New releases");
            for (identifier, version) in &summary.new_releases {
                println!(" + {identifier} {version}");
            }
        }
        if !summary.removed_modules.is_empty() {
            output::header("No longer in the repository");
            for identifier in &summary.removed_modules {
                println!(" - {identifier}");
            }
        }
    }

    Ok(())
}
