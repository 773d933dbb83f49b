mod config;

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::Config;
use vcfclean::{
    apply_transform, commit_removal, export_csv, find_duplicates_with_progress,
    find_matches_with_progress, load, load_reference_names, matched_indices, save, CodePosition,
    Column, DuplicateMode, ExportVariant, FilterSet, FilterSpec, Match, MatchMode, Record,
    RecordSet, Selection, Transform,
};

#[derive(Parser, Debug)]
#[command(name = "vcfclean", version, about = "Clean up vCard contact lists")]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the contact table
    Show(ShowArgs),
    /// Apply a bulk edit to the selected contacts
    Transform(TransformArgs),
    /// Find duplicate contacts and optionally remove them
    Dedup(DedupArgs),
    /// Match contact names against a reference list
    Match(MatchArgs),
    /// Remove the selected contacts
    Delete(DeleteArgs),
    /// Write the table as vCard or CSV
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// Rows to operate on, 1-based (`1,3,5-9`); defaults to every visible row
    #[arg(long, value_name = "ROWS")]
    rows: Option<String>,

    /// Column filter; `!a,b` hides rows containing any listed word
    #[arg(long = "filter", value_name = "COLUMN=TEXT")]
    filters: Vec<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Save the result here; without it changes are only reported
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// vCard flavor of the saved file (defaults to the configured one)
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,
}

#[derive(Args, Debug)]
struct ShowArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct TransformArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[arg(value_enum)]
    op: TransformOp,

    /// Code added by `append-code`
    #[arg(long)]
    code: Option<String>,

    /// Where `append-code` puts the code
    #[arg(long, default_value = "end", value_parser = parse_position)]
    position: CodePosition,

    /// Text searched by `replace` (case-insensitive, literal)
    #[arg(long)]
    search: Option<String>,

    /// Replacement used by `replace`; empty deletes the match
    #[arg(long, default_value = "")]
    replacement: String,

    /// Column edited by `replace`
    #[arg(long, default_value = "name", value_parser = parse_column)]
    column: Column,

    /// Default region for `phone-e164` (ISO 3166 code, e.g. TR)
    #[arg(long)]
    region: Option<String>,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransformOp {
    NormalizePhone,
    PhoneE164,
    TitleCase,
    LastWordUpper,
    AppendCode,
    Replace,
}

#[derive(Args, Debug)]
struct DedupArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = DedupModeArg::Composite)]
    mode: DedupModeArg,

    /// Minimum name similarity (0-100) for `fuzzy-name`
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DedupModeArg {
    /// Same name and phone
    Composite,
    /// Same phone
    Phone,
    /// Similar names
    FuzzyName,
}

impl From<DedupModeArg> for DuplicateMode {
    fn from(mode: DedupModeArg) -> Self {
        match mode {
            DedupModeArg::Composite => DuplicateMode::ExactComposite,
            DedupModeArg::Phone => DuplicateMode::ExactPhone,
            DedupModeArg::FuzzyName => DuplicateMode::FuzzyName,
        }
    }
}

#[derive(Args, Debug)]
struct MatchArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Reference names: first column of a .csv file, or one name per line
    #[arg(long, value_name = "PATH")]
    reference: PathBuf,

    #[arg(long, value_enum, default_value_t = MatchModeArg::Exact)]
    mode: MatchModeArg,

    /// Minimum score (0-100) for the fuzzy modes
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: Option<u8>,

    /// Matches to accept, by their 1-based number (`1,2,4-6`); defaults to all
    #[arg(long, value_name = "MATCHES")]
    accept: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MatchModeArg {
    Exact,
    TokenSort,
    TokenSet,
}

impl From<MatchModeArg> for MatchMode {
    fn from(mode: MatchModeArg) -> Self {
        match mode {
            MatchModeArg::Exact => MatchMode::Exact,
            MatchModeArg::TokenSort => MatchMode::TokenSort,
            MatchModeArg::TokenSet => MatchMode::TokenSet,
        }
    }
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(value_name = "FILE")]
    input: PathBuf,

    #[arg(long, value_enum)]
    format: ExportFormat,

    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    /// vCard 3.0
    Vcf,
    /// vCard layout for strict importers such as iOS Contacts
    Compat,
    /// Spreadsheet table
    Csv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VariantArg {
    Standard,
    Compat,
}

impl From<VariantArg> for ExportVariant {
    fn from(variant: VariantArg) -> Self {
        match variant {
            VariantArg::Standard => ExportVariant::Standard,
            VariantArg::Compat => ExportVariant::Compatible,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Show(args) => handle_show(args),
        Command::Transform(args) => handle_transform(args, &config),
        Command::Dedup(args) => handle_dedup(args, &config),
        Command::Match(args) => handle_match(args, &config),
        Command::Delete(args) => handle_delete(args, &config),
        Command::Export(args) => handle_export(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "vcfclean=debug",
        _ => "vcfclean=trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[derive(Serialize)]
struct Row<'a> {
    row: usize,
    #[serde(flatten)]
    record: &'a Record,
}

fn handle_show(args: ShowArgs) -> Result<()> {
    let records = load(&args.input)?;
    let selection = resolve_selection(&records, &args.selection)?;

    let rows: Vec<Row<'_>> = selection
        .indices()
        .iter()
        .filter_map(|&index| {
            records.get(index).map(|record| Row {
                row: index + 1,
                record,
            })
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let header: Vec<&str> = Column::ALL.iter().map(Column::header).collect();
    println!("#\t{}", header.join("\t"));
    for row in &rows {
        let cells: Vec<&str> = Column::ALL.iter().map(|&c| row.record.field(c)).collect();
        println!("{}\t{}", row.row, cells.join("\t"));
    }
    println!("{} of {} contacts shown", rows.len(), records.len());
    Ok(())
}

fn handle_transform(args: TransformArgs, config: &Config) -> Result<()> {
    let transform = match args.op {
        TransformOp::NormalizePhone => Transform::NormalizePhone,
        TransformOp::PhoneE164 => Transform::PhoneE164 {
            region: args
                .region
                .map(|region| region.trim().to_ascii_uppercase())
                .or_else(|| config.phone_region.clone()),
        },
        TransformOp::TitleCase => Transform::TitleCase,
        TransformOp::LastWordUpper => Transform::LastWordUpper,
        TransformOp::AppendCode => Transform::AppendCode {
            code: args.code.context("append-code needs --code")?,
            position: args.position,
        },
        TransformOp::Replace => Transform::ReplaceText {
            column: args.column,
            search: args.search.context("replace needs --search")?,
            replacement: args.replacement,
        },
    };

    let mut records = load(&args.input)?;
    let selection = resolve_selection(&records, &args.selection)?;
    let report = apply_transform(&mut records, &selection, &transform)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for change in &report.changes {
            println!("{}: {:?} -> {:?}", change.index + 1, change.before, change.after);
        }
        println!(
            "{transform}: {} of {} selected contacts changed",
            report.changed(),
            report.selected
        );
    }

    finish(&records, &args.output, config)
}

fn handle_dedup(args: DedupArgs, config: &Config) -> Result<()> {
    let mut records = load(&args.input)?;
    let selection = resolve_selection(&records, &args.selection)?;
    let mode = DuplicateMode::from(args.mode);
    let threshold = pick_threshold(args.threshold, config);

    let report = if mode == DuplicateMode::FuzzyName {
        let pb = scan_progress("Comparing names...")?;
        let result = find_duplicates_with_progress(
            &records,
            &selection,
            mode,
            threshold,
            &mut |done, total| track(&pb, done, total),
        );
        pb.finish_and_clear();
        result?
    } else {
        find_duplicates_with_progress(&records, &selection, mode, threshold, &mut |_, _| {
            ControlFlow::Continue(())
        })?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for pair in &report.pairs {
            let name = |index: usize| records.get(index).map_or("", |r| r.name.as_str());
            println!(
                "{} {:?} duplicates {} {:?} (score {})",
                pair.duplicate + 1,
                name(pair.duplicate),
                pair.original + 1,
                name(pair.original),
                pair.score
            );
        }
        println!(
            "{mode}: {} duplicates among {} selected contacts",
            report.removable().len(),
            report.selection.len()
        );
    }

    if args.output.output.is_some() {
        let removed = commit_removal(&mut records, &report.removable())?;
        if !args.json {
            println!("Removed {} duplicates.", removed.len());
        }
    }
    finish(&records, &args.output, config)
}

#[derive(Serialize)]
struct MatchOutput<'a> {
    matches: &'a [Match],
    rows: Vec<usize>,
}

fn handle_match(args: MatchArgs, config: &Config) -> Result<()> {
    let records = load(&args.input)?;
    let references = load_reference_names(&args.reference)?;
    let mode = MatchMode::from(args.mode);
    let threshold = pick_threshold(args.threshold, config);

    let pb = scan_progress("Matching names...")?;
    let result = find_matches_with_progress(
        &records,
        &references,
        mode,
        threshold,
        &mut |done, total| track(&pb, done, total),
    );
    pb.finish_and_clear();
    let matches = result?;

    let accepted: Vec<Match> = match &args.accept {
        Some(spec) => {
            let chosen = parse_rows(spec, matches.len())
                .and_then(|rows| Selection::new(rows, matches.len()).map_err(anyhow::Error::from))
                .context("--accept refers to a match that was not proposed")?;
            chosen.indices().iter().map(|&i| matches[i].clone()).collect()
        }
        None => matches.clone(),
    };
    let rows: Vec<usize> = matched_indices(&records, &accepted)
        .into_iter()
        .map(|index| index + 1)
        .collect();

    if args.json {
        let output = MatchOutput {
            matches: &matches,
            rows,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matches for {} reference names ({mode}).", references.len());
        return Ok(());
    }
    for (number, m) in matches.iter().enumerate() {
        println!(
            "{}. {:?} -> {:?} (row {}, score {})",
            number + 1,
            m.reference,
            m.name,
            m.index + 1,
            m.score
        );
    }
    println!("rows: {}", format_rows(&rows));
    Ok(())
}

fn handle_delete(args: DeleteArgs, config: &Config) -> Result<()> {
    if args.selection.rows.is_none() && args.selection.filters.is_empty() {
        bail!("delete needs --rows or --filter");
    }
    let mut records = load(&args.input)?;
    let selection = resolve_selection(&records, &args.selection)?;
    let removed = commit_removal(&mut records, selection.indices())?;
    for record in &removed {
        println!("deleted {:?}", record.name);
    }
    println!("Deleted {} contacts.", removed.len());
    finish(&records, &args.output, config)
}

fn handle_export(args: ExportArgs) -> Result<()> {
    let records = load(&args.input)?;
    match args.format {
        ExportFormat::Vcf => save(&records, &args.output, ExportVariant::Standard)?,
        ExportFormat::Compat => save(&records, &args.output, ExportVariant::Compatible)?,
        ExportFormat::Csv => export_csv(&records, &args.output)?,
    }
    println!(
        "Exported {} contacts to {}",
        records.len(),
        args.output.display()
    );
    Ok(())
}

/// Save the edited table when `--output` was given.
fn finish(records: &RecordSet, output: &OutputArgs, config: &Config) -> Result<()> {
    let Some(path) = &output.output else {
        eprintln!("note: nothing written, pass --output to save the result");
        return Ok(());
    };
    let variant = output
        .variant
        .map(ExportVariant::from)
        .unwrap_or(config.export.variant);
    save(records, path, variant)?;
    println!("Saved {} contacts to {}", records.len(), path.display());
    Ok(())
}

/// An explicit threshold is remembered for the next run.
fn pick_threshold(explicit: Option<u8>, config: &Config) -> u8 {
    match explicit {
        Some(threshold) => {
            if let Err(err) = config.remember_threshold(threshold) {
                eprintln!("warning: could not store threshold: {err:#}");
            }
            threshold
        }
        None => config.effective_threshold(),
    }
}

fn scan_progress(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

fn track(pb: &ProgressBar, done: usize, total: usize) -> ControlFlow<()> {
    pb.set_length(total as u64);
    pb.set_position(done as u64);
    ControlFlow::Continue(())
}

fn resolve_selection(records: &RecordSet, args: &SelectionArgs) -> Result<Selection> {
    let mut filters = FilterSet::new();
    for raw in &args.filters {
        let (column, text) = raw
            .split_once('=')
            .with_context(|| format!("filter `{raw}` is not COLUMN=TEXT"))?;
        filters.set_filter(column.parse()?, FilterSpec::parse(text));
    }

    let visible = Selection::visible(records, &filters);
    let Some(rows) = &args.rows else {
        return Ok(visible);
    };

    let shown: HashSet<usize> = visible.indices().iter().copied().collect();
    let requested = Selection::new(parse_rows(rows, records.len())?, records.len())?;
    let hidden = requested
        .indices()
        .iter()
        .filter(|index| !shown.contains(index))
        .count();
    if hidden > 0 {
        eprintln!("warning: skipping {hidden} rows hidden by filters");
    }
    Ok(Selection::new(
        requested
            .indices()
            .iter()
            .copied()
            .filter(|index| shown.contains(index)),
        records.len(),
    )?)
}

/// Parse `1,3,5-9` into 0-based indices, rejecting rows past `len`.
fn parse_rows(spec: &str, len: usize) -> Result<Vec<usize>> {
    let mut indices = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_row(start)?, parse_row(end)?),
            None => {
                let row = parse_row(part)?;
                (row, row)
            }
        };
        if start > end {
            bail!("row range `{part}` is reversed");
        }
        if end >= len {
            bail!("row {} is out of range (table has {len} rows)", end + 1);
        }
        indices.extend(start..=end);
    }
    if indices.is_empty() {
        bail!("no rows given in `{spec}`");
    }
    Ok(indices)
}

fn parse_row(text: &str) -> Result<usize> {
    let row: usize = text
        .trim()
        .parse()
        .with_context(|| format!("`{}` is not a row number", text.trim()))?;
    if row == 0 {
        bail!("row numbers start at 1");
    }
    Ok(row - 1)
}

fn format_rows(rows: &[usize]) -> String {
    rows.iter()
        .map(|row| row.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_column(text: &str) -> std::result::Result<Column, String> {
    text.parse().map_err(|err: vcfclean::Error| err.to_string())
}

fn parse_position(text: &str) -> std::result::Result<CodePosition, String> {
    text.parse().map_err(|err: vcfclean::Error| err.to_string())
}
