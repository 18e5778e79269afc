//! `brokkr list` - list installed mods

use anyhow::Result;
use camino::Utf8Path;
use serde_json::json;
use tabled::{Table, Tabled};

use crate::cli::{ExportFormat, ListArgs};
use crate::commands::Context;
use crate::output;

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Installed")]
    installed: String,
    #[tabled(rename = "Source")]
    source: String,
}

pub fn run(args: ListArgs, instance: Option<&Utf8Path>) -> Result<()> {
    let ctx = Context::load(instance)?;

    let mut rows: Vec<Row> = ctx
        .registry
        .installed_modules()
        .map(|m| Row {
            name: m.identifier().to_string(),
            version: m.version().to_string(),
            kind: m.package.kind.to_string(),
            installed: m.installed_at.format("%Y-%m-%d").to_string(),
            source: "installed".to_string(),
        })
        .collect();
    rows.extend(ctx.registry.preexisting_modules().map(|m| Row {
        name: m.info.name.clone(),
        version: m.info.version.to_string(),
        kind: "mod".to_string(),
        installed: String::new(),
        source: "autodetected".to_string(),
    }));
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(format) = args.export {
        print!("{}", export(&rows, format)?);
        return Ok(());
    }

    if args.porcelain {
        for row in &rows {
            println!("{} {}", row.name, row.version);
        }
        return Ok(());
    }

    if rows.is_empty() {
        output::info("No mods installed");
        return Ok(());
    }
    println!("{}", Table::new(&rows));
    Ok(())
}

fn export(rows: &[Row], format: ExportFormat) -> Result<String> {
    let rendered = match format {
        ExportFormat::Json => {
            let items: Vec<_> = rows
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "version": r.version,
                        "kind": r.kind,
                        "installed": r.installed,
                        "source": r.source,
                    })
                })
                .collect();
            format!("{}\n", serde_json::to_string_pretty(&items)?)
        }
        ExportFormat::Csv => {
            let mut out = String::from("name,version,kind,installed,source\n");
            for r in rows {
                out.push_str(&format!(
                    "{},{},{},{},{}\n",
                    r.name, r.version, r.kind, r.installed, r.source
                ));
            }
            out
        }
        ExportFormat::Markdown => {
            let mut out = String::from("| Name | Version | Kind | Installed | Source |\n");
            out.push_str("| --- | --- | --- | --- | --- |\n");
            for r in rows {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    r.name, r.version, r.kind, r.installed, r.source
                ));
            }
            out
        }
    };
    Ok(rendered)
}
