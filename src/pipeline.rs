//! Pipeline orchestration.
//!
//! Sequences the whole run: load the binary, build the symbol index, walk
//! every trace (build-id match, mmap registration, branch-stack
//! aggregation), then emit the profile and log the closing summary. Any
//! failing step aborts the run; there is no partial output beyond whatever
//! had already been written.

use crate::analysis::expand_fallthroughs;
use crate::domain::errors::TraceError;
use crate::export::ProfileWriter;
use crate::profiling::trace::{format_build_id, normalize_build_id, TraceFile};
use crate::profiling::{summarize_branches, LbrAggregator, TraceEvent, TraceReader};
use crate::symbolization::{binary, AddressTranslator, MmapEntry, SymbolIndex};
use anyhow::{Context, Result};
use log::{error, info};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Fewer branch-stack records than this across all traces means the profile
/// would be statistically worthless.
pub const MIN_BRANCH_RECORDS: u64 = 100;

/// Everything the pipeline needs to know for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub binary_path: PathBuf,
    pub trace_paths: Vec<PathBuf>,
    pub output_path: PathBuf,
    /// Overrides the path used to match mmap filenames; empty means "use
    /// the build-id match or the binary path".
    pub match_mmap_file: String,
    pub ignore_build_id: bool,
}

/// What a run produced, for the summary and for tests.
#[derive(Debug, Default)]
pub struct Summary {
    pub files_parsed: u64,
    pub branch_stack_records: u64,
    pub symbols_written: u64,
    pub branches_written: u64,
    pub fallthroughs_written: u64,
    pub total_counters: u64,
    pub counters_not_addressed: u64,
    pub cross_function_counters: u64,
    pub total_functions: u64,
    pub total_basic_blocks: u64,
    pub hot_functions: u64,
    pub hot_basic_blocks: u64,
    pub extra_bbs_in_fallthroughs: u64,
    pub dropped_bb_symbols: u64,
}

/// Run the pipeline end to end.
///
/// # Errors
/// Any input-structure or integrity failure aborts the run; see the error
/// types in [`crate::domain::errors`].
pub fn run(config: &Config, reader: &dyn TraceReader) -> Result<Summary> {
    let binary = binary::load(&config.binary_path)?;
    match &binary.build_id {
        Some(id) => info!(
            "Found Build Id in binary '{}': {}",
            config.binary_path.display(),
            format_build_id(id)
        ),
        None => info!("No Build Id found in '{}'.", config.binary_path.display()),
    }

    let mut index = SymbolIndex::build(binary.symbols)?;
    let order = index.assign_ordinals();
    let mut translator = AddressTranslator::new(binary.is_pie, binary.exec_segments);

    let mut aggregator = LbrAggregator::default();
    let mut binary_mmap_name = String::new();
    let mut files_parsed = 0u64;
    for path in &config.trace_paths {
        let trace = reader.load(path)?;
        if !config.ignore_build_id {
            binary_mmap_name.clear();
            if let Some(binary_id) = &binary.build_id {
                match_build_id(path, &trace, binary_id, &mut binary_mmap_name)?;
            }
        }
        register_mmaps(&mut translator, &trace, config, &mut binary_mmap_name, path)?;
        if translator.registry().is_empty() {
            error!(
                "Failed to find perf mmaps for binary '{}'.",
                config.binary_path.display()
            );
            return Err(TraceError::NoMmapEvents { path: path.clone() }.into());
        }
        translator.registry().log_entries(
            &path.display().to_string(),
            &config.binary_path.display().to_string(),
        );

        for event in &trace.events {
            let TraceEvent::Sample(sample) = event else {
                continue;
            };
            if sample.branch_stack.is_empty() {
                continue;
            }
            let pid = translator.pid_key(sample.pid);
            if !translator.registry().contains_pid(pid) {
                continue;
            }
            aggregator.observe_sample(pid, &sample.branch_stack);
        }
        files_parsed += 1;
    }
    info!("Processed {files_parsed} perf file(s).");
    info!(
        "Processed {} lbr records.",
        comma(aggregator.branch_stack_records)
    );
    if aggregator.branch_stack_records < MIN_BRANCH_RECORDS {
        return Err(TraceError::InsufficientRecords {
            count: aggregator.branch_stack_records,
        }
        .into());
    }

    let out_file = File::create(&config.output_path).with_context(|| {
        format!(
            "Failed to open '{}' for writing",
            config.output_path.display()
        )
    })?;
    let mut writer = ProfileWriter::new(BufWriter::new(out_file));

    let binary_path_string = config.binary_path.display().to_string();
    let mut names = BTreeSet::new();
    for candidate in [
        &config.match_mmap_file,
        &binary_mmap_name,
        &binary_path_string,
    ] {
        if !candidate.is_empty() {
            let base = basename(candidate);
            if !base.is_empty() {
                names.insert(base);
            }
        }
    }
    writer.write_name_list(&names)?;
    writer.write_symbols(&index, &order)?;

    let mut branch_summary = summarize_branches(&aggregator, &mut index, &translator);
    writer.write_branches(&branch_summary.edges)?;

    let seeded = std::mem::take(&mut branch_summary.fallthroughs_by_symbol);
    let expansion = expand_fallthroughs(
        &mut index,
        &aggregator.fallthrough_counters,
        seeded,
        &translator,
    );
    branch_summary.total_counters += expansion.extra_counters;
    writer.write_fallthroughs(&index, &expansion.edges)?;
    writer.write_hot_list(&index, &order)?;

    let stats = std::mem::take(&mut writer.stats);
    writer
        .finish()
        .with_context(|| format!("Failed to write '{}'", config.output_path.display()))?;

    // Closing summary.
    let (total_functions, total_basic_blocks) = index.population();
    let mut funcs_with_prof: BTreeSet<u64> = BTreeSet::new();
    let mut bbs_with_prof = 0u64;
    let mut bbs_within_hot_funcs = 0u64;
    for &id in &order {
        let symbol = index.get(id);
        if !symbol.hot {
            continue;
        }
        if let Some(func) = symbol.containing_func {
            let func_ordinal = index.get(func).ordinal;
            if funcs_with_prof.insert(func_ordinal) {
                bbs_within_hot_funcs +=
                    stats.func_bb_count.get(&func_ordinal).copied().unwrap_or(0);
            }
        }
        if symbol.is_bb() {
            bbs_with_prof += 1;
        }
    }

    info!(
        "Wrote profile ({} file(s), {} syms, {} branches, {} fallthroughs) to {}",
        files_parsed,
        comma(stats.symbols_written),
        comma(stats.branches_written),
        comma(stats.fallthroughs_written),
        config.output_path.display()
    );
    info!(
        "{} of {} branch entries are not mapped ({}).",
        comma(branch_summary.counters_not_addressed),
        comma(branch_summary.total_counters),
        percent(
            branch_summary.counters_not_addressed,
            branch_summary.total_counters
        )
    );
    info!(
        "{} of {} branch entries are cross function ({}).",
        comma(branch_summary.cross_function_counters),
        comma(branch_summary.total_counters),
        percent(
            branch_summary.cross_function_counters,
            branch_summary.total_counters
        )
    );
    if total_functions > 0 {
        info!(
            "{} functions, {} functions with prof ({}), {} BBs (average {} BBs per func), \
             {} BBs within hot funcs ({}), {} BBs with prof (include {} BBs that are on the \
             path of fallthroughs, total accounted for {} of all BBs).",
            comma(total_functions),
            comma(funcs_with_prof.len() as u64),
            percent(funcs_with_prof.len() as u64, total_functions),
            comma(total_basic_blocks),
            total_basic_blocks / total_functions,
            comma(bbs_within_hot_funcs),
            percent(bbs_within_hot_funcs, total_basic_blocks),
            comma(bbs_with_prof),
            comma(expansion.extra_hot_bbs),
            percent(bbs_with_prof, total_basic_blocks)
        );
    }

    Ok(Summary {
        files_parsed,
        branch_stack_records: aggregator.branch_stack_records,
        symbols_written: stats.symbols_written,
        branches_written: stats.branches_written,
        fallthroughs_written: stats.fallthroughs_written,
        total_counters: branch_summary.total_counters,
        counters_not_addressed: branch_summary.counters_not_addressed,
        cross_function_counters: branch_summary.cross_function_counters,
        total_functions,
        total_basic_blocks,
        hot_functions: funcs_with_prof.len() as u64,
        hot_basic_blocks: bbs_with_prof,
        extra_bbs_in_fallthroughs: expansion.extra_hot_bbs,
        dropped_bb_symbols: index.dropped_bb_symbols(),
    })
}

/// Pick out the trace's record for the binary's build id; its filename
/// becomes the observed mmap name.
fn match_build_id(
    path: &Path,
    trace: &TraceFile,
    binary_id: &[u8],
    binary_mmap_name: &mut String,
) -> Result<(), TraceError> {
    let want = normalize_build_id(binary_id);
    for record in &trace.build_ids {
        if normalize_build_id(&record.build_id) == want {
            binary_mmap_name.clone_from(&record.filename);
            info!(
                "Found file with matching BuildId in perf file '{}': {}",
                path.display(),
                binary_mmap_name
            );
            return Ok(());
        }
    }
    let mut listing = format!(
        "No file with matching BuildId in perf data '{}', which contains the \
         following <file, buildid>:\n",
        path.display()
    );
    for record in &trace.build_ids {
        listing.push_str(&format!(
            "\t{}: {}\n",
            record.filename,
            format_build_id(&record.build_id)
        ));
    }
    info!("{listing}");
    Err(TraceError::BuildIdMismatch {
        path: path.to_path_buf(),
    })
}

/// Register every mmap event of the profiled binary, enforcing that exactly
/// one file answers to the configured name.
fn register_mmaps(
    translator: &mut AddressTranslator,
    trace: &TraceFile,
    config: &Config,
    binary_mmap_name: &mut String,
    path: &Path,
) -> Result<(), TraceError> {
    let configured = if !config.match_mmap_file.is_empty() {
        config.match_mmap_file.clone()
    } else if !binary_mmap_name.is_empty() {
        binary_mmap_name.clone()
    } else {
        config.binary_path.display().to_string()
    };
    let matcher = NameMatcher::new(&configured);

    for event in &trace.events {
        let TraceEvent::Mmap(mmap) = event else {
            continue;
        };
        if mmap.filename.is_empty() || !matcher.matches(&mmap.filename) {
            continue;
        }
        if binary_mmap_name.is_empty() {
            binary_mmap_name.clone_from(&mmap.filename);
        } else if *binary_mmap_name != mmap.filename {
            return Err(TraceError::AmbiguousBinaryName {
                first: binary_mmap_name.clone(),
                second: mmap.filename.clone(),
            });
        }
        let entry = MmapEntry {
            load_addr: mmap.start,
            load_size: mmap.len,
            page_offset: mmap.page_offset,
        };
        let pid = translator.pid_key(mmap.pid);
        if let Err(err) = translator.registry_mut().register(pid, entry) {
            error!(
                "Found conflict MMap event in '{}': {} for pid {}",
                path.display(),
                entry,
                pid
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Compares mmap filenames the way the binary was named: absolute
/// configured names by full path, anything else by basename.
struct NameMatcher {
    compare: String,
    full_path: bool,
}

impl NameMatcher {
    fn new(configured: &str) -> Self {
        if Path::new(configured).is_absolute() {
            NameMatcher {
                compare: configured.to_string(),
                full_path: true,
            }
        } else {
            NameMatcher {
                compare: basename(configured),
                full_path: false,
            }
        }
    }

    fn matches(&self, filename: &str) -> bool {
        if self.full_path {
            self.compare == filename
        } else {
            self.compare == basename(filename)
        }
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Thousands-separated rendering for the summary counters.
fn comma(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", part as f64 / whole as f64 * 100.0)
}
