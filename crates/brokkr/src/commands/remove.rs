//! `brokkr remove` - uninstall mods and their dependents

use anyhow::Result;
use camino::Utf8Path;

use brokkr_install::ModInstaller;

use crate::cli::RemoveArgs;
use crate::commands::{confirm, Context};
use crate::output;

pub fn run(args: RemoveArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let mut ctx = Context::load(instance)?;

    let targets: Vec<String> = if args.all {
        ctx.registry
            .installed_modules()
            .map(|m| m.identifier().to_string())
            .collect()
    } else {
        args.mods.clone()
    };
    if targets.is_empty() {
        output::info("Nothing to remove");
        return Ok(());
    }

    let gate = ctx.gate();
    let mut installer = ModInstaller::new(&ctx.instance, &mut ctx.registry, &ctx.cache, gate);

    // The closure can be larger than the request; show the user the whole
    // thing before touching anything.
    let goners = installer.plan_uninstall(&targets)?;
    output::header("About to remove");
    for identifier in &goners {
        match installer.registry().installed_module(identifier) {
            Some(module) => println!(" * {} {}", identifier, module.version()),
            None => println!(" * {}", identifier),
        }
    }

    if !confirm("Continue?", args.yes)? {
        output::info("Mod removal aborted at user request");
        return Ok(());
    }

    let removed = installer.uninstall_list(&targets)?;
    output::success(&format!("Removed {} mod(s)", removed.len()));
    Ok(())
}
