//! cdl - command-line front-end for the Crystal Description Language

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Parse and validate Crystal Description Language strings
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// List the recognised crystal systems and exit
    #[arg(long)]
    list_systems: bool,

    /// List the point groups per crystal system and exit
    #[arg(long)]
    list_point_groups: bool,

    /// List the named forms per system family and exit
    #[arg(long)]
    list_forms: bool,

    /// List the recognised twin laws and exit
    #[arg(long)]
    list_twins: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CDL string and print the description tree
    Parse {
        /// The CDL string, e.g. "cubic[m3m]:{111}@1.0 + {100}@1.3"
        cdl: String,

        /// Print the tree as JSON instead of the debug rendering
        #[arg(long)]
        json: bool,
    },

    /// Validate a CDL string; exits non-zero when invalid
    Validate {
        /// The CDL string to check
        cdl: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level '{}'", cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if cli.list_systems || cli.list_point_groups || cli.list_forms || cli.list_twins {
        if cli.list_systems {
            print!("{}", render_systems());
        }
        if cli.list_point_groups {
            print!("{}", render_point_groups());
        }
        if cli.list_forms {
            print!("{}", render_forms());
        }
        if cli.list_twins {
            print!("{}", render_twins());
        }
        return Ok(ExitCode::SUCCESS);
    }

    match cli.command {
        Some(Commands::Parse { cdl, json }) => {
            debug!(input = %cdl, "parsing");
            match cdl::parse(&cdl) {
                Ok(desc) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&desc)?);
                    } else {
                        println!("{desc:#?}");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("Parse failed: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Some(Commands::Validate { cdl }) => {
            let (ok, message) = cdl::validate(&cdl);
            if ok {
                println!("Valid CDL string");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Invalid: {}", message.unwrap_or_default());
                Ok(ExitCode::FAILURE)
            }
        }
        None => {
            eprintln!("nothing to do; try 'cdl parse <cdl>' or 'cdl --list-systems'");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn render_systems() -> String {
    let mut out = String::from("Crystal systems:\n");
    for system in cdl::catalog::CRYSTAL_SYSTEMS {
        out.push_str(&format!("  {system}\n"));
    }
    out
}

fn render_point_groups() -> String {
    let mut out = String::from("Point groups:\n");
    for (system, groups) in cdl::catalog::POINT_GROUPS {
        let default = cdl::catalog::default_point_group(system).unwrap_or("?");
        out.push_str(&format!(
            "  {system}: {} (default {default})\n",
            groups.join(", ")
        ));
    }
    out
}

fn render_forms() -> String {
    let mut out = String::from("Named forms:\n  cubic:\n");
    for (name, [h, k, l]) in cdl::catalog::CUBIC_FORMS {
        out.push_str(&format!("    {name} = {{{h}{k}{l}}}\n"));
    }
    out.push_str("  hexagonal/trigonal:\n");
    for (name, [h, k, i, l]) in cdl::catalog::HEXAGONAL_FORMS {
        out.push_str(&format!("    {name} = {{{h}{k}{i}{l}}}\n"));
    }
    out.push_str("  tetragonal:\n");
    for (name, [h, k, l]) in cdl::catalog::TETRAGONAL_FORMS {
        out.push_str(&format!("    {name} = {{{h}{k}{l}}}\n"));
    }
    out
}

fn render_twins() -> String {
    let mut out = String::from("Twin laws:\n");
    for law in cdl::catalog::TWIN_LAWS {
        out.push_str(&format!("  {law}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_systems_lists_all() {
        let out = render_systems();
        for system in cdl::catalog::CRYSTAL_SYSTEMS {
            assert!(out.contains(system));
        }
    }

    #[test]
    fn test_render_point_groups_mentions_defaults() {
        let out = render_point_groups();
        assert!(out.contains("cubic: 23, m3, 432, -43m, m3m (default m3m)"));
    }

    #[test]
    fn test_render_forms_groups_by_family() {
        let out = render_forms();
        assert!(out.contains("octahedron = {111}"));
        assert!(out.contains("rhombohedron = {10-11}"));
    }

    #[test]
    fn test_render_twins_lists_spinel() {
        assert!(render_twins().contains("spinel"));
    }
}
