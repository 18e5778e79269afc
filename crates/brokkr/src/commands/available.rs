//! `brokkr available` - what could be installed here

use anyhow::Result;
use camino::Utf8Path;
use tabled::{Table, Tabled};

use crate::cli::AvailableArgs;
use crate::commands::Context;
use crate::output;

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Title")]
    title: String,
}

pub fn run(args: AvailableArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let ctx = Context::load(instance)?;
    let gate = ctx.gate();

    let rows: Vec<Row> = if args.all_versions {
        ctx.registry
            .available_releases()
            .into_iter()
            .map(|(name, version)| {
                let title = ctx
                    .registry
                    .get_by_version(&name, version)
                    .map(|p| p.info.title.clone())
                    .unwrap_or_default();
                Row {
                    name,
                    version: version.to_string(),
                    title,
                }
            })
            .collect()
    } else {
        ctx.registry
            .available(&gate)
            .into_iter()
            .map(|p| Row {
                name: p.identifier().to_string(),
                version: p.version().to_string(),
                title: p.info.title.clone(),
            })
            .collect()
    };

    if rows.is_empty() {
        output::info("No compatible mods known; try `brokkr update` first");
        return Ok(());
    }

    println!("{}", Table::new(&rows));
    output::info(&format!(
        "{} mod(s) compatible with game version {}",
        rows.len(),
        ctx.settings.game_version
    ));
    Ok(())
}
