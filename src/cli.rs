use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::PipelineConfig;
use crate::constants::verify::{DEFAULT_BATCH_SIZE, DEFAULT_SHUFFLE_SEED};
use crate::labels::{LabelEncoder, LabelProfile};
use crate::naming::parse_shard_file_name;
use crate::pipeline::{RunReport, ShardPipeline, SplitReport};
use crate::source::BitcodeSampleLoader;
use crate::splits::{EmptySplitPolicy, SplitLabel, SplitPlan};
use crate::verify::{DecodeOptions, FieldValue, decode, read_all, verify_shard};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SplitArg {
    Train,
    Test,
    Evaluation,
}

impl From<SplitArg> for SplitLabel {
    fn from(value: SplitArg) -> Self {
        match value {
            SplitArg::Train => SplitLabel::Train,
            SplitArg::Test => SplitLabel::Test,
            SplitArg::Evaluation => SplitLabel::Evaluation,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileArg {
    Full,
    Reduced,
}

impl From<ProfileArg> for LabelProfile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Full => LabelProfile::Full,
            ProfileArg::Reduced => LabelProfile::Reduced,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "generate_records",
    disable_help_subcommand = true,
    about = "Write per-subject sample files as sharded record containers",
    long_about = "Partition source files into train/test/evaluation by subject identifier, group them into chunks, and write each chunk as equally sized record shards.",
    after_help = "Flags override values loaded from --config. Subjects not listed with --test-id or --eval-id go to train."
)]
/// CLI for `generate_records`.
///
/// Common usage:
/// - `--source-dir raw --output-dir records --test-id s07 --eval-id s08`
/// - Load defaults from a file: `--config pipeline.json`
/// - Inspect the split assignment without writing: `--plan-only`
struct GenerateRecordsCli {
    #[arg(long, value_name = "PATH", help = "JSON pipeline config to start from")]
    config: Option<PathBuf>,
    #[arg(long = "source-dir", value_name = "DIR", help = "Directory of source sample files")]
    source_dir: Option<PathBuf>,
    #[arg(long = "output-dir", value_name = "DIR", help = "Directory receiving container files")]
    output_dir: Option<PathBuf>,
    #[arg(
        long,
        value_parser = parse_positive_u32,
        help = "Channel depth written into every record"
    )]
    channels: Option<u32>,
    #[arg(
        long = "chunk-len",
        value_parser = parse_positive_usize,
        help = "Source files per chunk"
    )]
    chunk_len: Option<usize>,
    #[arg(long = "num-shards", help = "Target shards per chunk")]
    num_shards: Option<usize>,
    #[arg(long, value_enum, help = "Label encoding profile")]
    profile: Option<ProfileArg>,
    #[arg(long, help = "Container file extension")]
    extension: Option<String>,
    #[arg(
        long = "test-id",
        value_name = "SUBJECT",
        value_delimiter = ',',
        help = "Subject assigned to the test split, repeat or comma-separate as needed"
    )]
    test_ids: Vec<String>,
    #[arg(
        long = "eval-id",
        value_name = "SUBJECT",
        value_delimiter = ',',
        help = "Subject assigned to the evaluation split, repeat or comma-separate as needed"
    )]
    eval_ids: Vec<String>,
    #[arg(
        long = "reject-empty-splits",
        help = "Fail when the test or evaluation split would be empty"
    )]
    reject_empty_splits: bool,
    #[arg(
        long,
        value_parser = parse_positive_usize,
        help = "Worker threads used for chunk processing"
    )]
    workers: Option<usize>,
    #[arg(long = "follow-links", help = "Follow symlinks in the source directory")]
    follow_links: bool,
    #[arg(long = "no-manifest", help = "Skip writing manifest.json")]
    no_manifest: bool,
    #[arg(long, value_enum, help = "Process only this split")]
    split: Option<SplitArg>,
    #[arg(
        long = "plan-only",
        conflicts_with = "split",
        help = "Print the split assignment and exit without writing"
    )]
    plan_only: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "inspect_records",
    disable_help_subcommand = true,
    about = "Inspect and verify record containers",
    long_about = "Print the record count and first-record fields of each container, optionally decoding every record into batches or checking an expected record count."
)]
struct InspectRecordsCli {
    #[arg(value_name = "PATH", required = true, help = "Container files to inspect")]
    paths: Vec<PathBuf>,
    #[arg(long, value_enum, default_value = "reduced", help = "Label encoding profile")]
    profile: ProfileArg,
    #[arg(long, help = "Decode every record into arrays and one-hot labels")]
    decode: bool,
    #[arg(
        long = "batch-size",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_positive_usize,
        help = "Batch size used when decoding"
    )]
    batch_size: usize,
    #[arg(long, help = "Shuffle decoded samples before batching")]
    shuffle: bool,
    #[arg(long, default_value_t = DEFAULT_SHUFFLE_SEED, help = "Seed used with --shuffle")]
    seed: u64,
    #[arg(
        long = "expect-records",
        value_name = "N",
        help = "Fail unless every container holds exactly N decodable records"
    )]
    expect_records: Option<usize>,
}

impl GenerateRecordsCli {
    fn into_config(self) -> Result<PipelineConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = self.source_dir {
            config.source_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        config.channels = self.channels.unwrap_or(config.channels);
        config.chunk_len = self.chunk_len.unwrap_or(config.chunk_len);
        config.num_shards = self.num_shards.unwrap_or(config.num_shards);
        if let Some(profile) = self.profile {
            config.label_profile = profile.into();
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if !self.test_ids.is_empty() {
            config.test_ids = self.test_ids.into_iter().collect();
        }
        if !self.eval_ids.is_empty() {
            config.eval_ids = self.eval_ids.into_iter().collect();
        }
        if self.reject_empty_splits {
            config.empty_split_policy = EmptySplitPolicy::Reject;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        config.follow_links |= self.follow_links;
        if self.no_manifest {
            config.write_manifest = false;
        }
        Ok(config)
    }
}

/// Entry point for the `generate_records` binary; `args_iter` excludes the program name.
pub fn run_generate_records<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<GenerateRecordsCli, _>(
        std::iter::once("generate_records".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let split = cli.split.map(SplitLabel::from);
    let plan_only = cli.plan_only;
    let config = cli.into_config()?;
    let pipeline = ShardPipeline::new(config, BitcodeSampleLoader::new())?;

    if plan_only {
        print_split_plan(&pipeline.plan()?);
        return Ok(());
    }
    match split {
        Some(split) => print_split_report(&pipeline.run_split(split)?),
        None => print_run_report(&pipeline.run()?, pipeline.config()),
    }
    Ok(())
}

/// Entry point for the `inspect_records` binary; `args_iter` excludes the program name.
pub fn run_inspect_records<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<InspectRecordsCli, _>(
        std::iter::once("inspect_records".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let encoder = LabelEncoder::for_profile(cli.profile.into())?;
    let options = DecodeOptions {
        batch_size: cli.batch_size,
        shuffle: cli.shuffle,
        seed: cli.seed,
    };
    for path in &cli.paths {
        inspect_container(path, &encoder, &cli, options)?;
    }
    Ok(())
}

fn inspect_container(
    path: &Path,
    encoder: &LabelEncoder,
    cli: &InspectRecordsCli,
    options: DecodeOptions,
) -> Result<(), Box<dyn Error>> {
    println!("=== {} ===", path.display());
    if let Some(name) = path.file_name().and_then(|name| name.to_str())
        && let Some((shard, _)) = parse_shard_file_name(name)
    {
        println!(
            "split={} shard={}/{} chunk={}",
            shard.split, shard.shard_index, shard.num_shards, shard.chunk_index
        );
    }

    let summary = read_all(path)?;
    println!("records: {}", summary.count);
    if let Some(fields) = &summary.first {
        println!("first record:");
        for (key, value) in fields {
            println!("  {key}: {value}");
        }
        if let Some(FieldValue::I32(code)) = fields.get("label")
            && let Some(label) = encoder.decode(*code)
        {
            println!("  label name: {label}");
        }
    }

    if cli.decode {
        let batches = decode(path, encoder, options)?;
        println!(
            "decoded {} batches (batch_size={}, shuffle={})",
            batches.len(),
            options.batch_size,
            options.shuffle
        );
        if let Some(sample) = batches.first().and_then(|batch| batch.samples.first()) {
            let (height, width, depth) = sample.array.dim();
            println!(
                "  first sample: shape=({height}, {width}, {depth}) one_hot_len={} label={}",
                sample.one_hot.len(),
                sample.label
            );
        }
    }

    if let Some(expected) = cli.expect_records {
        let checked = verify_shard(path, expected, encoder)?;
        println!("verified {} records ({} bytes)", checked.records, checked.bytes);
    }
    println!();
    Ok(())
}

fn print_split_plan(plan: &SplitPlan) {
    println!("=== split plan ===");
    for (split, files) in plan.iter() {
        println!("{split}: {} files", files.len());
        for file in files {
            println!("  {}", file.display());
        }
    }
    println!("total: {} files", plan.total_files());
}

fn print_split_report(report: &SplitReport) {
    println!(
        "{}: files={} chunks={} shards={} written={} dropped={}",
        report.split,
        report.files,
        report.chunks.len(),
        report.shard_count(),
        report.written(),
        report.dropped()
    );
}

fn print_run_report(report: &RunReport, config: &PipelineConfig) {
    println!("=== records written to {} ===", config.output_dir.display());
    for split in &report.splits {
        print_split_report(split);
    }
    println!(
        "total: written={} dropped={} shards={}",
        report.written(),
        report.dropped(),
        report.shards().count()
    );
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(raw: &str) -> Result<u32, String> {
    let parsed = parse_positive_usize(raw)?;
    u32::try_from(parsed).map_err(|_| format!("'{}' does not fit in 32 bits", raw))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Sample, write_sample_file};
    use std::fs;
    use tempfile::tempdir;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn flags_override_config_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pipeline.json");
        fs::write(
            &path,
            r#"{"source_dir": "/a", "output_dir": "/b", "num_shards": 4, "test_ids": ["s01"]}"#,
        )
        .unwrap();
        let cli = GenerateRecordsCli::try_parse_from([
            "generate_records",
            "--config",
            path.to_str().unwrap(),
            "--output-dir",
            "/c",
            "--test-id",
            "s02,s03",
            "--profile",
            "full",
            "--no-manifest",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.source_dir, PathBuf::from("/a"));
        assert_eq!(config.output_dir, PathBuf::from("/c"));
        assert_eq!(config.num_shards, 4);
        assert_eq!(
            config.test_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["s02", "s03"]
        );
        assert_eq!(config.label_profile, LabelProfile::Full);
        assert!(!config.write_manifest);
    }

    #[test]
    fn zero_values_are_rejected_by_parser() {
        assert!(
            GenerateRecordsCli::try_parse_from(["generate_records", "--chunk-len", "0"]).is_err()
        );
        assert!(InspectRecordsCli::try_parse_from(["inspect_records", "x", "--batch-size", "0"]).is_err());
        assert!(InspectRecordsCli::try_parse_from(["inspect_records"]).is_err());
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(run_inspect_records(args(&["--help"])).is_ok());
    }

    #[test]
    fn generate_then_inspect_end_to_end() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("raw");
        let output = temp.path().join("records");
        fs::create_dir_all(&source).unwrap();
        let samples: Vec<Sample> = (0..4)
            .map(|idx| {
                Sample::from_flat((2, 2, 1), vec![idx as f64; 4], "telephoning_activity_step")
                    .unwrap()
            })
            .collect();
        write_sample_file(&source.join("s01_a.bin.gz"), &samples).unwrap();
        write_sample_file(&source.join("s02_a.bin"), &samples).unwrap();

        run_generate_records(args(&[
            "--source-dir",
            source.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
            "--num-shards",
            "2",
            "--test-id",
            "s02",
        ]))
        .unwrap();

        let shard = output.join("test_002_001-002.tfrecord");
        assert!(shard.exists());
        run_inspect_records(args(&[
            shard.to_str().unwrap(),
            "--decode",
            "--shuffle",
            "--expect-records",
            "2",
        ]))
        .unwrap();
        assert!(
            run_inspect_records(args(&[shard.to_str().unwrap(), "--expect-records", "3"])).is_err()
        );
    }
}
