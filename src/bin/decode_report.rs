use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lextree_decoder::{
    CancelFlag, DecodeOutcome, DecoderBuilder, DecoderConfig, PrecomputedScores,
};

#[path = "decode_report/report.rs"]
mod report;
#[path = "decode_report/task.rs"]
mod task;

use report::{Meta, Report, UtteranceReport};

#[derive(Debug, Parser)]
#[command(name = "decode_report")]
#[command(about = "Decode precomputed senone scores and write a JSON recognition report")]
struct Args {
    #[arg(long, env = "LEXTREE_REPORT_TASK")]
    task: PathBuf,
    #[arg(long, env = "LEXTREE_REPORT_OUT")]
    out: Option<PathBuf>,
    /// Directory for one lattice file per recognized utterance.
    #[arg(long, env = "LEXTREE_REPORT_LATTICE_DIR")]
    lattice_dir: Option<PathBuf>,
    /// Decoder configuration JSON; overrides the task's embedded config.
    #[arg(long, env = "LEXTREE_REPORT_CONFIG")]
    config: Option<PathBuf>,
    /// Adaptive histogram cap on active HMMs per frame (0 disables).
    #[arg(long, env = "LEXTREE_REPORT_MAX_HMM")]
    max_hmm: Option<usize>,
    #[arg(long, env = "LEXTREE_REPORT_LIMIT")]
    limit: Option<usize>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let task_path = resolve_path(&repo_root, &args.task);
    let out_path = resolve_out_path(&repo_root, args.out.as_ref());
    let lattice_dir = args
        .lattice_dir
        .as_ref()
        .map(|dir| resolve_path(&repo_root, dir));

    let mut task = task::load_task(&task_path)?;
    let mut config = match args.config.as_ref() {
        Some(path) => DecoderConfig::load(&resolve_path(&repo_root, path))
            .map_err(|err| format!("Failed to load decoder config: {err}"))?,
        None => task.config.take().unwrap_or_default(),
    };
    if let Some(max_hmm) = args.max_hmm {
        config.max_hmm_per_frame = max_hmm;
    }
    config.write_lattice = lattice_dir.is_some();
    let log_base = config.log_base;

    let mut utterances = task.utterances;
    if let Some(limit) = args.limit {
        utterances.truncate(limit);
    }
    if utterances.is_empty() {
        return Err("No utterances selected after applying --limit.".to_string());
    }

    let decoder = DecoderBuilder::new(config)
        .with_definitions(task.models)
        .build()
        .map_err(|err| format!("Failed to build decoder: {err}"))?;
    let n_senones = decoder.context().phones.n_senones();
    let mut session = decoder.session();
    let cancel = CancelFlag::new();

    let progress = ProgressBar::new(utterances.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress.set_message("starting...");

    let mut reports = Vec::with_capacity(utterances.len());
    for utt in utterances {
        progress.set_message(utt.id.clone());
        let reference = utt.reference.as_deref();
        let mut scorer = match PrecomputedScores::new(n_senones, utt.frames) {
            Ok(scorer) => scorer,
            Err(err) => {
                reports.push(UtteranceReport::rejected(&utt.id, reference, err.to_string()));
                progress.inc(1);
                continue;
            }
        };
        let result = session.decode(&utt.id, &mut scorer, &cancel);

        let mut lattice_path = None;
        if let (Some(dir), DecodeOutcome::Recognized { lattice: Some(lattice), .. }) =
            (lattice_dir.as_ref(), &result.outcome)
        {
            let path = dir.join(format!("{}.lat", utt.id));
            lattice
                .write(&path)
                .map_err(|err| format!("Failed to write lattice '{}': {err}", path.display()))?;
            lattice_path = Some(path.to_string_lossy().into_owned());
        }
        reports.push(UtteranceReport::from_result(&result, reference, lattice_path));
        progress.inc(1);
    }
    progress.finish_with_message("decoding pass complete");

    let aggregates = report::aggregate(&reports);
    let report = Report {
        schema_version: 1,
        meta: Meta {
            generated_at: Utc::now().to_rfc3339(),
            task_path: task_path.to_string_lossy().into_owned(),
            log_base,
            utterance_count: reports.len(),
        },
        utterances: reports,
        aggregates,
    };
    report.write(&out_path)?;
    println!("{}", out_path.display());
    Ok(())
}

fn resolve_out_path(repo_root: &Path, out: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = out {
        return resolve_path(repo_root, path);
    }

    let run_id = Utc::now().format("%Y%m%dT%H%M%SZ");
    repo_root
        .join("target")
        .join("decode_reports")
        .join(format!("decode-report-{run_id}.json"))
}

fn resolve_path(repo_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}
