//! `brokkr show` - display one mod's metadata

use anyhow::Result;
use camino::Utf8Path;

use brokkr_core::{Error, ModDependency, ModPackage};

use crate::cli::ShowArgs;
use crate::commands::Context;
use crate::output;

pub fn run(args: ShowArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let ctx = Context::load(instance)?;

    // Prefer the installed snapshot: it is what the user actually has.
    let installed = ctx.registry.installed_module(&args.name);
    let package: ModPackage = match installed {
        Some(module) => module.package.clone(),
        None => ctx
            .registry
            .latest_available(&args.name, &ctx.gate(), None)?
            .cloned()
            .ok_or_else(|| Error::module_not_found(args.name.clone()))?,
    };

    output::header(&package.info.title);
    output::kv("identifier", package.identifier());
    output::kv("version", &package.version().to_string());
    output::kv("kind", &package.kind.to_string());
    if let Some(installed) = installed {
        output::kv(
            "installed",
            &installed.installed_at.format("%Y-%m-%d %H:%M").to_string(),
        );
    }
    if !package.authors.is_empty() {
        output::kv("authors", &package.authors.join(", "));
    }
    if let Some(description) = &package.info.description {
        output::kv("description", description);
    }
    if let Some(homepage) = &package.info.homepage {
        output::kv("homepage", homepage);
    }
    if let Some(released) = &package.released_at {
        output::kv("released", &released.format("%Y-%m-%d").to_string());
    }
    if !package.tags.is_empty() {
        output::kv("tags", &package.tags.join(", "));
    }
    if package.download_size > 0 {
        output::kv("download size", &format!("{} bytes", package.download_size));
    }
    for url in &package.download_urls {
        output::kv("download", url);
    }
    if !package.provides.is_empty() {
        output::kv("provides", &package.provides.join(", "));
    }

    print_stanza("depends", package.depends());
    print_stanza("recommends", package.recommends());
    print_stanza("suggests", package.suggests());
    print_stanza("conflicts", package.conflicts());

    Ok(())
}

fn print_stanza<'a>(label: &str, stanza: impl Iterator<Item = &'a ModDependency>) {
    let rendered: Vec<String> = stanza.map(|d| d.to_string()).collect();
    if !rendered.is_empty() {
        output::kv(label, &rendered.join("; "));
    }
}
