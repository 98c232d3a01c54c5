//! kfence - deprecate declarations inside compiled JVM archives
//! Command-line interface for the KapiFence transform

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use fence_core::classfile::access;
use fence_core::visitor::read_metadata;
use fence_core::{ClassFile, FenceConfig, MemberKind, TransformPlan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "kfence")]
#[command(author = "KapiFence Contributors")]
#[command(version)]
#[command(about = "Deprecate declarations inside compiled JVM archives", long_about = None)]
struct Cli {
    /// Log every decision and transformed entry
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a jar (or a single .class file)
    Transform {
        /// Input archive or class file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output path
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Configuration file (fence.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Deprecation message, overrides the configuration
        #[arg(short, long)]
        message: Option<String>,

        /// Keep pattern, one pass each; appended after the configured ones
        #[arg(short, long = "pattern", value_name = "PATTERN")]
        patterns: Vec<String>,
    },

    /// Parse keep patterns and print the rules they produce
    Check {
        #[arg(value_name = "PATTERN", required = true)]
        patterns: Vec<String>,
    },

    /// Show the declarations, deprecation state and metadata of a class file
    Inspect {
        #[arg(value_name = "CLASS_FILE")]
        class_file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Transform { input, output, config, message, patterns } => {
            transform_command(&input, &output, config.as_deref(), message, patterns)
        }
        Commands::Check { patterns } => check_command(&patterns),
        Commands::Inspect { class_file } => inspect_command(&class_file),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fence_core=debug,kfence=debug" } else { "fence_core=info,kfence=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ============================================================================
// Transform
// ============================================================================

fn load_config(path: Option<&Path>, message: Option<String>, patterns: Vec<String>) -> Result<FenceConfig> {
    let mut config = match path {
        Some(path) => FenceConfig::from_file(path)?,
        None => FenceConfig::default(),
    };
    if message.is_some() {
        config.message = message;
    }
    config.patterns.extend(patterns);
    Ok(config)
}

fn transform_command(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    message: Option<String>,
    patterns: Vec<String>,
) -> Result<()> {
    let config = load_config(config, message, patterns)?;
    let plan = config.plan()?;
    if plan.is_empty() {
        bail!("no patterns given; use --pattern or a configuration file");
    }

    println!(
        "{} {} ({} pass{})",
        "Transforming".green().bold(),
        input.display().to_string().cyan(),
        plan.passes().len(),
        if plan.passes().len() == 1 { "" } else { "es" }
    );

    if input.extension().is_some_and(|e| e == "class") {
        return transform_single_class(input, output, &plan);
    }

    let report = fence_core::rewrite_archive_file(input, output, &plan)
        .with_context(|| format!("failed to rewrite {}", input.display()))?;

    println!("{} {}", "     Entries".green().bold(), report.entries);
    println!("{} {}", "     Classes".green().bold(), report.classes);
    println!("{} {}", " Transformed".green().bold(), report.transformed);
    if report.metadata_warnings > 0 {
        println!(
            "{} {} class(es) kept their Kotlin metadata untouched",
            "     Warning".yellow().bold(),
            report.metadata_warnings
        );
    }
    if report.skipped_malformed > 0 {
        println!(
            "{} {} malformed class(es) copied unchanged",
            "     Warning".yellow().bold(),
            report.skipped_malformed
        );
    }
    println!("{} {}", "     Written".green().bold(), output.display().to_string().cyan());
    Ok(())
}

fn transform_single_class(input: &Path, output: &Path, plan: &TransformPlan) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let outcome = plan.apply(&bytes)?;
    fs::write(output, &outcome.bytes).with_context(|| format!("failed to write {}", output.display()))?;

    for (index, report) in outcome.reports.iter().enumerate() {
        println!(
            "  pass {}: class {}, {} field(s), {} method(s), {} holder(s), {} metadata symbol(s)",
            index + 1,
            if report.class_deprecated { "deprecated" } else { "unchanged" },
            report.fields_deprecated,
            report.methods_deprecated,
            report.holders,
            report.metadata_symbols_marked
        );
        if let Some(warning) = &report.metadata_warning {
            println!("  {} {}", "warning:".yellow().bold(), warning);
        }
    }
    let status = if outcome.changed() { "Transformed".green().bold() } else { "Unchanged".yellow().bold() };
    println!("{} {}", status, output.display().to_string().cyan());
    Ok(())
}

// ============================================================================
// Check
// ============================================================================

fn check_command(patterns: &[String]) -> Result<()> {
    for (index, pattern) in patterns.iter().enumerate() {
        let specs = fence_core::parse(pattern).with_context(|| format!("pattern {} is invalid", index + 1))?;
        println!("{} pattern {}", "Pass".green().bold(), index + 1);
        for spec in specs {
            let concrete = spec.members.iter().any(|m| m.kind != MemberKind::Unspecified);
            let scope = match (spec.is_class_level(), concrete) {
                (true, true) => "class+members",
                (true, false) => "class-level",
                _ => "members",
            };
            println!("  {} {}", format!("[{}]", scope).dimmed(), spec);
        }
    }
    println!("{}", "All patterns are valid".green().bold());
    Ok(())
}

// ============================================================================
// Inspect
// ============================================================================

fn inspect_command(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let class = ClassFile::from_bytes(&bytes)?;
    let container = class.declaration_container()?;

    println!(
        "{} {} (class file {}.{})",
        kind_label(container.access_flags).bold(),
        container.binary_name.cyan(),
        class.major_version,
        class.minor_version
    );
    if let Some(super_name) = &container.super_name {
        println!("  extends {}", super_name);
    }
    for interface in &container.interfaces {
        println!("  implements {}", interface);
    }
    if container.deprecated {
        println!("  {}", "@kotlin.Deprecated".yellow());
    }

    for member in &container.members {
        let kind = match member.kind {
            MemberKind::Field => "field ",
            _ => "method",
        };
        let marker = if member.deprecated { " @Deprecated".yellow().to_string() } else { String::new() };
        println!("  {} {:#06x} {} {}{}", kind, member.access_flags, member.name, member.descriptor.dimmed(), marker);
    }

    match read_metadata(&class) {
        None => println!("{}", "No Kotlin metadata".dimmed()),
        Some(Err(err)) => println!("{} {}", "Kotlin metadata not decodable:".yellow().bold(), err),
        Some(Ok(table)) => {
            println!(
                "{} version {}, kind {}, module {}{}",
                "Kotlin metadata".bold(),
                table.header.version_string(),
                table.header.kind,
                table.module_name,
                annotated(table.class_has_annotations)
            );
            for function in &table.functions {
                let signature = function
                    .signature
                    .as_ref()
                    .and_then(|s| s.descriptor.clone())
                    .unwrap_or_default();
                let internal = if function.visibility_is_restricted { " internal" } else { "" };
                println!("  fun {}{}{}{}", function.name, signature.dimmed(), internal, annotated(function.has_annotations));
            }
            for property in &table.properties {
                println!("  val {}{}", property.name, annotated(property.has_annotations));
            }
            for constructor in &table.constructors {
                let signature = constructor
                    .signature
                    .as_ref()
                    .and_then(|s| s.descriptor.clone())
                    .unwrap_or_default();
                println!("  constructor{}{}", signature.dimmed(), annotated(constructor.has_annotations));
            }
        }
    }
    Ok(())
}

fn kind_label(flags: u16) -> &'static str {
    if flags & access::ANNOTATION != 0 {
        "@interface"
    } else if flags & access::INTERFACE != 0 {
        "interface"
    } else if flags & access::ENUM != 0 {
        "enum"
    } else {
        "class"
    }
}

fn annotated(flag: bool) -> String {
    if flag { " [annotated]".yellow().to_string() } else { String::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_extend_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fence.toml");
        fs::write(&path, "message = \"file\"\npatterns = [\"class a.B\"]\n").unwrap();

        let config = load_config(Some(&path), Some("flag".to_string()), vec!["class a.C".to_string()]).unwrap();
        assert_eq!(config.message(), "flag");
        assert_eq!(config.patterns, vec!["class a.B", "class a.C"]);

        let config = load_config(Some(&path), None, Vec::new()).unwrap();
        assert_eq!(config.message(), "file");
    }

    #[test]
    fn test_kind_label() {
        assert_eq!(kind_label(access::PUBLIC), "class");
        assert_eq!(kind_label(access::INTERFACE | access::ABSTRACT), "interface");
        assert_eq!(kind_label(access::INTERFACE | access::ANNOTATION), "@interface");
    }
}
