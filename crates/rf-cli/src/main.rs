//! Request Filter CLI
//!
//! CLI tool for compiling filter lists into a rules directory, building
//! its index and running queries against it.

mod rules_dir;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use rf_core::storage::RulesMapType;
use rf_core::utils::is_third_party;
use rf_core::{Origin, ResourceTypes, RuleMatch, UrlInfo};
use rf_manager::ManagerConfig;

use crate::rules_dir::{compile_rules_list, load_manager, remove_source, store_source};

#[derive(Parser)]
#[command(name = "rf-cli")]
#[command(about = "Request filter list compiler and tools")]
struct Cli {
    /// JSON manager config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rules directory, overrides the config file
    #[arg(short, long, global = true)]
    rules_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into the rules list of one source
    Compile {
        /// Source id to store the rules under
        #[arg(short, long)]
        source_id: u32,

        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,
    },

    /// Remove a source from the rules directory
    Remove {
        #[arg(short, long)]
        source_id: u32,
    },

    /// Build the index of the rules directory
    BuildIndex,

    /// Dump rules directory and index info
    Info,

    /// Match a request against the index
    Match {
        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Origin of the document making the request
        #[arg(short, long)]
        origin: String,

        /// Resource type (script, image, stylesheet, xhr, sub_frame, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        resource_type: String,

        /// Ignore rules without domain constraints
        #[arg(long)]
        disable_generic: bool,
    },

    /// Print the stylesheet and scriptlets for a document origin
    Inject {
        #[arg(short, long)]
        origin: String,

        /// Ignore rules without domain constraints
        #[arg(long)]
        disable_generic: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = load_config(&cli).and_then(|config| match cli.command {
        Commands::Compile { source_id, input } => cmd_compile(&config, source_id, &input, cli.verbose),
        Commands::Remove { source_id } => cmd_remove(&config, source_id),
        Commands::BuildIndex => cmd_build_index(&config),
        Commands::Info => cmd_info(&config),
        Commands::Match {
            url,
            origin,
            resource_type,
            disable_generic,
        } => cmd_match(&config, &url, &origin, &resource_type, disable_generic),
        Commands::Inject {
            origin,
            disable_generic,
        } => cmd_inject(&config, &origin, disable_generic),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<ManagerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ManagerConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => ManagerConfig::default(),
    };
    if let Some(rules_dir) = &cli.rules_dir {
        config.rules_dir = rules_dir.clone();
    }
    config.load_public_suffix_list().map_err(|e| e.to_string())?;
    Ok(config)
}

fn cmd_compile(config: &ManagerConfig, source_id: u32, inputs: &[String], verbose: bool) -> Result<(), String> {
    let (compiled, stats) = compile_rules_list(inputs, verbose)?;
    let source = store_source(&config.rules_dir, source_id, &compiled)?;

    println!(
        "Compiled {} filter lists to source {} in '{}'",
        inputs.len(),
        source_id,
        config.rules_dir.display()
    );
    println!("  Lines:     {} ({} skipped)", stats.lines, stats.skipped_lines);
    println!(
        "  Rules:     {} -> {} (dedupe removed {}, badfilter removed {})",
        stats.rules_before, stats.rules_after, stats.rules_deduped, stats.badfiltered_rules
    );
    println!(
        "  Kinds:     {} filter, {} cosmetic, {} scriptlet",
        compiled.list.filter_rules.len(),
        compiled.list.cosmetic_rules.len(),
        compiled.list.scriptlet_rules.len()
    );
    println!("  Size:      {} bytes ({:.1} KB)", compiled.bytes.len(), compiled.bytes.len() as f64 / 1024.0);
    println!("  Checksum:  {}", source.rules_list_checksum);
    println!("  Time:      {:.1}ms", stats.total_ms);

    Ok(())
}

fn cmd_remove(config: &ManagerConfig, source_id: u32) -> Result<(), String> {
    remove_source(&config.rules_dir, source_id)?;
    println!("Removed source {} from '{}'", source_id, config.rules_dir.display());
    Ok(())
}

fn cmd_build_index(config: &ManagerConfig) -> Result<(), String> {
    let start = Instant::now();
    let manager = load_manager(config)?;
    let total_time = start.elapsed();

    let stats = manager.rules_index().map(|index| index.stats()).unwrap_or_default();
    println!("Index of '{}' is up to date", config.rules_dir.display());
    println!("  Sources:   {}", stats.sources);
    println!("  Rebuilds:  {}", manager.rebuild_count());
    println!("  Checksum:  {}", manager.index_checksum());
    println!("  Time:      {:.1}ms", total_time.as_secs_f64() * 1000.0);
    Ok(())
}

fn cmd_info(config: &ManagerConfig) -> Result<(), String> {
    let manager = load_manager(config)?;
    let Some(index) = manager.rules_index() else {
        return Err("No index loaded".to_string());
    };
    let stats = index.stats();

    println!("Rules directory: {}", config.rules_dir.display());
    println!("  Index checksum:   {}", manager.index_checksum());
    println!();

    println!("Sources:");
    for source in manager.sources() {
        let rules = manager
            .buffers()
            .get(&source.id)
            .map(|buffer| buffer.rules_list().rule_count())
            .unwrap_or(0);
        println!(
            "  [{}] {} rules, checksum {}, last fetch {:?}",
            source.id, rules, source.rules_list_checksum, source.last_fetch_result
        );
    }
    println!();

    println!("Rules maps:");
    println!("  Before request:   {}", stats.before_request_rules);
    println!("  Headers received: {}", stats.headers_received_rules);
    println!("  Activation:       {}", stats.activation_rules);
    println!("  Redirect:         {}", stats.modify_blocked_rules);
    println!("  Ad attribution:   {}", stats.modify_allowed_rules);
    println!();

    println!("Content injection:");
    println!("  Cosmetic nodes:   {}", stats.cosmetic_nodes);
    println!("  Scriptlet nodes:  {}", stats.scriptlet_nodes);
    println!("  Default CSS:      {} bytes", stats.default_stylesheet_bytes);

    Ok(())
}

fn describe(found: &RuleMatch<'_>) -> String {
    let rule = found.rule;
    let mut text = format!(
        "source {} rule {}: {:?} {:?} pattern {:?}",
        found.id.source_id, found.id.rule_nr, rule.decision, rule.anchor_type, rule.pattern
    );
    if !rule.modifier_values.is_empty() {
        text.push_str(&format!(" {:?}={}", rule.modifier, rule.modifier_values.join("|")));
    }
    text
}

fn cmd_match(
    config: &ManagerConfig,
    url: &str,
    origin: &str,
    resource_type: &str,
    disable_generic: bool,
) -> Result<(), String> {
    let url = UrlInfo::parse(url).map_err(|e| format!("Invalid URL '{}': {}", url, e))?;
    let origin = Origin::parse(origin);
    let resource_type =
        ResourceTypes::from_request_type(resource_type).ok_or_else(|| format!("Unknown resource type '{}'", resource_type))?;
    let third_party = is_third_party(url.url(), &origin);

    let manager = load_manager(config)?;
    let Some(index) = manager.rules_index() else {
        return Err("No index loaded".to_string());
    };

    println!("Request: {} ({:?}, third party: {})", url.spec(), resource_type, third_party);

    match index.find_matching_before_request_rule(&url, &origin, resource_type, third_party, disable_generic) {
        Some(found) => println!("  Before request:   {}", describe(&found)),
        None => println!("  Before request:   no match"),
    }

    let queries = [
        ("Redirect", RulesMapType::ModifyBlockedRequest),
        ("Ad attribution", RulesMapType::ModifyAllowedRequest),
    ];
    for (label, map_type) in queries {
        for found in index.find_matching_modifier_rules(map_type, &url, &origin, resource_type, third_party, disable_generic) {
            println!("  {:<17} {}", format!("{label}:"), describe(&found));
        }
    }

    if resource_type.intersects(ResourceTypes::SUBDOCUMENT) || resource_type == ResourceTypes::OTHER {
        for found in index.find_matching_headers_received_rules(&url, &origin, third_party, disable_generic) {
            println!("  CSP:              {}", describe(&found));
        }
    }

    Ok(())
}

fn cmd_inject(config: &ManagerConfig, origin: &str, disable_generic: bool) -> Result<(), String> {
    let origin = Origin::parse(origin);
    let manager = load_manager(config)?;
    let Some(index) = manager.rules_index() else {
        return Err("No index loaded".to_string());
    };

    let data = index.get_injection_data_for_origin(&origin, disable_generic);
    if !disable_generic {
        print!("{}", index.get_default_stylesheet());
    }
    print!("{}", data.stylesheet);
    for scriptlet in &data.scriptlets {
        let mut parts = vec![scriptlet.name.as_str()];
        parts.extend(scriptlet.arguments.iter().map(String::as_str));
        println!("+js({})", parts.join(", "));
    }

    Ok(())
}
