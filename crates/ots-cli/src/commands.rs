use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tracing::warn;

use ots_driver::{open_driver, Driver, DriverConfig, FsConfig, FsDriver, StoreConfig};
use ots_tree::Tree;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let driver = open_store(cli.config.as_deref(), cli.store.as_deref())?;
    let tree = Tree::open(Arc::clone(&driver)).context("cannot open tree")?;
    let json = cli.format == OutputFormat::Json;
    match cli.command {
        Command::Init => cmd_init(&tree, json),
        Command::Root => cmd_root(&tree, json),
        Command::List(args) => cmd_list(&tree, args, json),
        Command::Show(args) => cmd_show(&tree, args, json),
        Command::Delete(args) => cmd_delete(&tree, args),
        Command::Rename(args) => cmd_rename(&tree, args),
        Command::Alias(args) => cmd_alias(&tree, args),
        Command::Compact => cmd_compact(&tree, json),
        Command::Migrate(args) => cmd_migrate(&tree, args, json),
        Command::Fsck => cmd_fsck(&tree, json),
    }
}

/// Resolve `--config` / `--store` into a driver.
pub fn open_store(config: Option<&Path>, store: Option<&Path>) -> anyhow::Result<Arc<dyn Driver>> {
    let driver_config = match (config, store) {
        (Some(path), _) => StoreConfig::load(path)?.driver,
        (None, Some(dir)) => DriverConfig::filesystem(dir),
        (None, None) => bail!("no store given: pass --store <dir> or --config <file>"),
    };
    if driver_config == DriverConfig::Memory {
        warn!("memory driver selected; nothing will outlive this process");
    }
    Ok(open_driver(&driver_config)?)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn root_text(tree: &Tree) -> anyhow::Result<String> {
    Ok(tree
        .root_hash()?
        .map(|h| h.to_hex())
        .unwrap_or_else(|| "(empty)".into()))
}

fn cmd_init(tree: &Tree, json: bool) -> anyhow::Result<()> {
    let active = tree.driver().active_bucket();
    if json {
        return print_json(&json!({ "root": tree.root_hash()?, "active": active }));
    }
    println!("{} Store ready", "✓".green().bold());
    println!("  Root: {}", root_text(tree)?.yellow());
    println!("  Active bucket: {}", active.to_string().cyan());
    Ok(())
}

fn cmd_root(tree: &Tree, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "root": tree.root_hash()? }));
    }
    println!("{}", root_text(tree)?);
    Ok(())
}

fn cmd_list(tree: &Tree, args: ListArgs, json: bool) -> anyhow::Result<()> {
    let prefix = args.prefix.unwrap_or_default();
    let entries: Vec<_> = tree
        .index(args.role)
        .entries()?
        .into_iter()
        .filter(|(id, _)| id.starts_with(&prefix))
        .collect();

    if json {
        let rows: Vec<_> = entries
            .iter()
            .map(|(id, m)| json!({ "id": id, "hash": m.hash, "alias": m.alias, "size": m.size }))
            .collect();
        return print_json(&rows);
    }
    if entries.is_empty() {
        println!("No {} entries.", args.role);
        return Ok(());
    }
    for (id, meta) in &entries {
        println!(
            "{}  {}  {}",
            meta.hash.short_hex().dimmed(),
            id.bold(),
            meta.alias.cyan()
        );
    }
    Ok(())
}

fn cmd_show(tree: &Tree, args: EntryArgs, json: bool) -> anyhow::Result<()> {
    let Some((bytes, alias)) = tree.index(args.role).load(&args.id, true)? else {
        bail!("{} {:?} not found", args.role, args.id);
    };
    let record: serde_json::Value =
        serde_json::from_slice(&bytes).context("stored record is not JSON")?;
    if json {
        return print_json(&json!({ "id": args.id, "alias": alias, "record": record }));
    }
    println!("{} {}  {}", args.role.to_string().dimmed(), args.id.bold(), alias.cyan());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_delete(tree: &Tree, args: EntryArgs) -> anyhow::Result<()> {
    if !tree.index(args.role).delete(&args.id)? {
        bail!("{} {:?} not found", args.role, args.id);
    }
    println!("{} Deleted {} {}", "✓".green(), args.role, args.id.yellow());
    Ok(())
}

fn cmd_rename(tree: &Tree, args: RenameArgs) -> anyhow::Result<()> {
    if !tree.index(args.role).rename(&args.old, &args.new)? {
        bail!("{} {:?} not found", args.role, args.old);
    }
    println!("{} Renamed {} → {}", "✓".green(), args.old.yellow(), args.new.yellow());
    Ok(())
}

fn cmd_alias(tree: &Tree, args: AliasArgs) -> anyhow::Result<()> {
    if !tree.index(args.role).set_alias(&args.id, &args.alias)? {
        bail!("{} {:?} not found", args.role, args.id);
    }
    println!("{} {} is now {}", "✓".green(), args.id.yellow(), args.alias.cyan());
    Ok(())
}

fn cmd_compact(tree: &Tree, json: bool) -> anyhow::Result<()> {
    let report = tree.compact()?;
    if json {
        return print_json(&report);
    }
    println!(
        "{} Compacted: bucket {} retired, {} now active",
        "✓".green().bold(),
        report.retired.to_string().yellow(),
        report.active.to_string().cyan()
    );
    println!("  Reachable: {} blobs ({} bytes)", report.reachable, report.bytes);
    println!("  Copied: {}", report.copied);
    println!("  Purged: {}", report.purged);
    Ok(())
}

fn cmd_migrate(tree: &Tree, args: MigrateArgs, json: bool) -> anyhow::Result<()> {
    let target = FsDriver::open(&args.to, FsConfig::default())
        .with_context(|| format!("cannot open target store {}", args.to.display()))?;
    let report = tree.migrate(&target)?;
    if json {
        return print_json(&report);
    }
    match report.root {
        Some(root) => {
            println!("{} Migrated to {}", "✓".green().bold(), args.to.display());
            println!("  Root: {}", root.to_hex().yellow());
            println!("  Blobs: {} ({} bytes)", report.blobs_copied, report.bytes_copied);
        }
        None => println!("Source store is empty; nothing migrated."),
    }
    Ok(())
}

fn cmd_fsck(tree: &Tree, json: bool) -> anyhow::Result<()> {
    let report = tree.verify()?;
    if json {
        print_json(&report)?;
    } else {
        for problem in &report.problems {
            println!(
                "{} {} {:?}: {}",
                "✗".red().bold(),
                problem.hash.short_hex(),
                problem.kind,
                problem.reason
            );
        }
        if report.is_clean() {
            println!(
                "{} {} blobs checked, no issues.",
                "✓".green().bold(),
                report.checked
            );
        }
    }
    if !report.is_clean() {
        bail!("{} problems found", report.problems.len());
    }
    Ok(())
}
