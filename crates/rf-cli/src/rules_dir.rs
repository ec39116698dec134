use std::fs;
use std::path::Path;
use std::time::Instant;

use rf_compiler::{CompiledRulesList, RulesListBuilder};
use rf_manager::files::write_rules_list;
use rf_manager::{InlineTaskRunner, ManagerConfig, RuleSource, RuleSourcesFile, RulesIndexManager};

#[derive(Debug, Clone)]
pub struct CompileStats {
    pub lines: usize,
    pub rules_before: usize,
    pub rules_after: usize,
    pub rules_deduped: usize,
    pub badfiltered_rules: usize,
    pub skipped_lines: usize,
    pub total_ms: f64,
}

/// Compile filter list files into one rules list.
pub fn compile_rules_list(inputs: &[String], verbose: bool) -> Result<(CompiledRulesList, CompileStats), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut builder = RulesListBuilder::new();
    let mut lines = 0usize;

    for path in inputs {
        let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let line_count = content.lines().count();
        lines += line_count;

        if verbose {
            println!(
                "  {} - {} lines",
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                line_count
            );
        }

        builder.add_text(&content);
    }

    let compiled = builder.finish();
    let stats = CompileStats {
        lines,
        rules_before: compiled.stats.before,
        rules_after: compiled.stats.after,
        rules_deduped: compiled.stats.deduped,
        badfiltered_rules: compiled.stats.badfiltered_rules,
        skipped_lines: compiled.skipped_lines,
        total_ms: start.elapsed().as_secs_f64() * 1000.0,
    };

    Ok((compiled, stats))
}

/// Store a compiled list as source `source_id` and record it in
/// `sources.json`.
pub fn store_source(rules_dir: &Path, source_id: u32, compiled: &CompiledRulesList) -> Result<RuleSource, String> {
    write_rules_list(rules_dir, source_id, &compiled.bytes).map_err(|e| e.to_string())?;

    let mut sources = RuleSourcesFile::load(rules_dir).map_err(|e| e.to_string())?;
    let source = RuleSource::fetched(source_id, compiled.checksum.clone());
    sources.upsert(source.clone());
    sources.save(rules_dir).map_err(|e| e.to_string())?;
    Ok(source)
}

/// Remove source `source_id` from `sources.json` and delete its file.
pub fn remove_source(rules_dir: &Path, source_id: u32) -> Result<(), String> {
    let mut sources = RuleSourcesFile::load(rules_dir).map_err(|e| e.to_string())?;
    let before = sources.sources.len();
    sources.sources.retain(|source| source.id != source_id);
    if sources.sources.len() == before {
        return Err(format!("No source with id {}", source_id));
    }
    sources.save(rules_dir).map_err(|e| e.to_string())?;

    let path = rf_manager::files::rules_list_path(rules_dir, source_id);
    fs::remove_file(&path).map_err(|e| format!("Failed to remove '{}': {}", path.display(), e))
}

/// Load the rules directory, rebuilding the index when it is missing or
/// stale, and persist the resulting index checksum.
pub fn load_manager(config: &ManagerConfig) -> Result<RulesIndexManager, String> {
    let mut sources = RuleSourcesFile::load(&config.rules_dir).map_err(|e| e.to_string())?;
    log::debug!(
        "Loading {} sources from '{}'",
        sources.sources.len(),
        config.rules_dir.display()
    );
    let mut manager = RulesIndexManager::new(
        config.clone(),
        sources.sources.clone(),
        sources.index_checksum.clone(),
        Box::new(InlineTaskRunner),
    );
    manager.run_until_idle();

    if manager.index_checksum() != sources.index_checksum {
        sources.index_checksum = manager.index_checksum().to_string();
        sources.save(&config.rules_dir).map_err(|e| e.to_string())?;
    }
    if manager.rules_index().is_none() {
        return Err(format!("Failed to load a rules index from '{}'", config.rules_dir.display()));
    }
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("rf-cli-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn compile_store_and_load() {
        let dir = temp_dir("load");
        let list = dir.join("list.txt");
        fs::write(&list, "||ads.com^\n||ads.com^\n##.banner\n").unwrap();

        let (compiled, stats) = compile_rules_list(&[list.to_string_lossy().into_owned()], false).unwrap();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.rules_deduped, 1);
        store_source(&dir, 7, &compiled).unwrap();

        let config = ManagerConfig::with_rules_dir(&dir);
        let manager = load_manager(&config).unwrap();
        assert_eq!(manager.rebuild_count(), 1);
        let saved = RuleSourcesFile::load(&dir).unwrap();
        assert_eq!(saved.index_checksum, manager.index_checksum());

        // Stored checksum is reused on the next load
        let manager = load_manager(&config).unwrap();
        assert_eq!(manager.rebuild_count(), 0);

        remove_source(&dir, 7).unwrap();
        assert!(remove_source(&dir, 7).is_err());
        let manager = load_manager(&config).unwrap();
        assert!(manager.rules_index().unwrap().source_checksums().is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn compile_without_inputs_fails() {
        assert!(compile_rules_list(&[], false).is_err());
    }
}
