// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Satchel maintenance CLI.
//!
//! Works directly on a vault data directory: mirror it into its backup folder, check it for
//! corrupt files, or print what a single user has stored. Run it while no engine is using the
//! directory. Log verbosity follows `SATCHEL_LOG` (e.g. `SATCHEL_LOG=satchel=debug`).

use std::error::Error;

use satchel::model::UserId;
use satchel::store::WriteDurability;
use satchel::VaultConfig;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SATCHEL_LOG";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--data-dir <dir>] [--fast-writes] backup\n  {program} [--data-dir <dir>] verify\n  {program} [--data-dir <dir>] inspect <user-id>\n\nIf --data-dir is omitted, the current working directory is used.\n`backup` copies every valid vault and overflow file into <dir>/backup.\n`verify` exits with status 1 when corrupt or unreadable files are found.\n\n--fast-writes skips the directory sync after each rename; written files are still synced."
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Backup,
    Verify,
    Inspect { user: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    data_dir: Option<String>,
    fast_writes: bool,
    command: CliCommand,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut data_dir = None;
    let mut fast_writes = false;
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data-dir" => {
                if data_dir.is_some() {
                    return Err(());
                }
                data_dir = Some(args.next().ok_or(())?);
            }
            "--fast-writes" => {
                if fast_writes {
                    return Err(());
                }
                fast_writes = true;
            }
            _ if arg.starts_with('-') => return Err(()),
            _ if command.is_some() => return Err(()),
            "backup" => command = Some(CliCommand::Backup),
            "verify" => command = Some(CliCommand::Verify),
            "inspect" => {
                let user = args.next().filter(|user| !user.starts_with('-')).ok_or(())?;
                command = Some(CliCommand::Inspect { user });
            }
            _ => return Err(()),
        }
    }

    let command = command.ok_or(())?;
    Ok(CliOptions {
        data_dir,
        fast_writes,
        command,
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = (|| -> Result<bool, Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "satchel".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };
        init_logging();

        let mut config = VaultConfig::new(options.data_dir.unwrap_or_else(|| ".".to_owned()));
        if options.fast_writes {
            config = config.with_durability(WriteDurability::BestEffort);
        }
        let folder = config.folder();

        match options.command {
            CliCommand::Backup => {
                let backup_dir = config.backup_dir();
                let report = folder.backup(&backup_dir)?;
                let target = backup_dir.display();
                println!("copied {} file(s) to {target}", report.copied);
                for path in &report.corrupt {
                    println!("skipped corrupt {}", path.display());
                }
                for path in &report.failed {
                    println!("failed {}", path.display());
                }
                Ok(report.is_clean())
            }
            CliCommand::Verify => {
                let report = folder.verify()?;
                println!("checked {} file(s)", report.checked);
                for path in &report.corrupt {
                    println!("corrupt {}", path.display());
                }
                for path in &report.unreadable {
                    println!("unreadable {}", path.display());
                }
                Ok(report.corrupt.is_empty() && report.unreadable.is_empty())
            }
            CliCommand::Inspect { user } => {
                let user = UserId::new(&user)?;
                let Some((path, pages)) = folder.load_user(&user) else {
                    println!("no vault stored for {user}");
                    return Ok(true);
                };
                let shown = path.display();
                let (page_count, item_count) = (pages.page_count(), pages.item_count());
                println!("{shown}: {page_count} page(s), {item_count} item(s)");
                for index in 0..pages.page_count() {
                    let count = pages.page(index).map_or(0, |slots| slots.len());
                    println!("  page {}: {count} item(s)", index + 1);
                }
                let overflow = folder.overflow().peek(&user)?;
                println!("overflow: {} item(s)", overflow.len());
                Ok(true)
            }
        }
    })();

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("satchel: {err}");
            std::process::exit(1);
        }
    }
}
