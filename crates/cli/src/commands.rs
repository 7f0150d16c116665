//! Subcommand execution: one generation per parameter set, each in its own
//! worker thread with buffered output.

use crate::output::{render, OutputOptions};
use kindling_core::{Error, Result};
use kindling_generate::{submit_task_graph, Generator, GeneratorBuilder};
use kindling_graph::TaskGraph;
use kindling_params::{load_parameters, ParametersSpec};
use kindling_platform::{GitRepo, HttpPlatformClient, PlatformClient, RetryPolicy, Vcs};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Full,
    Target,
    TargetGraph,
    Optimized,
    Morphed,
    Decision,
}

pub struct Options {
    pub root: PathBuf,
    pub parameters: Vec<String>,
    pub target_kinds: Vec<String>,
    pub tasks_regex: Option<String>,
    pub json: bool,
    pub exclude_keys: Vec<String>,
    pub output_file: Option<PathBuf>,
    pub diff: Option<String>,
    pub verify: bool,
    pub phase: Phase,
}

fn platform_client() -> Result<Arc<dyn PlatformClient>> {
    let root_url = std::env::var("TASKCLUSTER_ROOT_URL")
        .unwrap_or_else(|_| "https://community-tc.services.mozilla.com/".to_string());
    Ok(Arc::new(HttpPlatformClient::new(
        &root_url,
        RetryPolicy::default(),
    )?))
}

pub fn run(options: Options) -> miette::Result<()> {
    let specs: Vec<ParametersSpec> = if options.parameters.is_empty() {
        vec![ParametersSpec::Defaults]
    } else {
        options.parameters.iter().map(|p| ParametersSpec::parse(p)).collect()
    };

    if specs.len() == 1 {
        let rendered = run_one(&options, &specs[0]).map_err(miette::Report::from)?;
        emit(&options, &rendered).map_err(miette::Report::from)?;
        return Ok(());
    }

    // Several parameter sets: independent workers, buffered output printed
    // under a per-set header. Every set runs even when one fails.
    let mut workers = Vec::new();
    for spec in specs {
        let options = Options {
            root: options.root.clone(),
            parameters: options.parameters.clone(),
            target_kinds: options.target_kinds.clone(),
            tasks_regex: options.tasks_regex.clone(),
            json: options.json,
            exclude_keys: options.exclude_keys.clone(),
            output_file: None,
            diff: options.diff.clone(),
            verify: options.verify,
            phase: options.phase,
        };
        workers.push((
            spec.clone(),
            std::thread::spawn(move || run_one(&options, &spec)),
        ));
    }
    let mut failures = 0;
    for (index, (spec, worker)) in workers.into_iter().enumerate() {
        println!("=== parameters {index}: {spec:?} ===");
        match worker.join() {
            Ok(Ok(rendered)) => println!("{rendered}"),
            Ok(Err(err)) => {
                eprintln!("generation failed: {err}");
                failures += 1;
            }
            Err(_) => {
                eprintln!("generation worker panicked");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(miette::Report::from(Error::config(format!(
            "{failures} parameter set(s) failed"
        ))));
    }
    Ok(())
}

fn run_one(options: &Options, spec: &ParametersSpec) -> Result<String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| Error::config(format!("failed to start runtime: {err}")))?;
    runtime.block_on(generate(options, spec))
}

async fn generate(options: &Options, spec: &ParametersSpec) -> Result<String> {
    let client = platform_client()?;
    let repo_root = options
        .root
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let git = GitRepo::new(&repo_root);
    let trust_domain = kindling_config::GraphConfig::load(&options.root)
        .map(|config| config.trust_domain().to_string())
        .unwrap_or_default();
    let parameters =
        load_parameters(spec, client.as_ref(), Some(&git as &dyn Vcs), &trust_domain).await?;

    let mut builder = GeneratorBuilder::new(&options.root, parameters.clone(), Arc::clone(&client));
    if !options.target_kinds.is_empty() {
        builder = builder.with_target_kinds(options.target_kinds.clone());
    }
    if !options.verify {
        builder = builder.without_verification();
    }
    if options.phase == Phase::Decision {
        builder = builder.with_artifacts_dir("artifacts");
    }
    let mut generator = builder.build()?;

    if let Some(revspec) = &options.diff {
        return diff_generations(options, &mut generator, &git, &parameters, revspec, &client)
            .await;
    }

    let output_options = OutputOptions {
        json: options.json,
        tasks_regex: options.tasks_regex.clone(),
        exclude_keys: options.exclude_keys.clone(),
    };

    match options.phase {
        Phase::Full => {
            let graph = generator.full_task_graph()?;
            render(graph, &output_options)
        }
        Phase::Target => {
            let labels = generator.target_task_set()?.clone();
            let graph = generator.full_task_graph()?.restrict(&labels);
            render(&graph, &output_options)
        }
        Phase::TargetGraph => render(generator.target_task_graph()?, &output_options),
        Phase::Optimized => render(generator.optimized_task_graph().await?, &output_options),
        Phase::Morphed => render(generator.morphed_task_graph().await?, &output_options),
        Phase::Decision => {
            let decision_task_id = generator.decision_task_id();
            let graph = generator.morphed_task_graph().await?.clone();
            let label_to_taskid = generator.morphed_label_to_taskid().await?.clone();
            submit_task_graph(&graph, &label_to_taskid, &decision_task_id, client.as_ref())
                .await?;
            info!(tasks = graph.len(), "decision complete");
            render(&graph, &output_options)
        }
    }
}

/// Generate against the merge-base of `revspec` as well and report the
/// difference in labels.
async fn diff_generations(
    options: &Options,
    generator: &mut Generator,
    git: &GitRepo,
    parameters: &kindling_params::Parameters,
    revspec: &str,
    client: &Arc<dyn PlatformClient>,
) -> Result<String> {
    let current = phase_graph(generator, options.phase).await?.clone();

    let base_rev = git.find_latest_common_revision(revspec, &parameters.head_rev)?;
    let mut base_params = parameters.clone();
    base_params.head_rev = base_rev.clone();
    base_params.files_changed = git.get_files_changed(&base_params.base_rev, &base_rev)?;
    let mut base_builder =
        GeneratorBuilder::new(&options.root, base_params, Arc::clone(client));
    if !options.verify {
        base_builder = base_builder.without_verification();
    }
    let mut base_generator = base_builder.build()?;
    let base = phase_graph(&mut base_generator, options.phase).await?.clone();

    let current_labels: BTreeSet<&str> = current.labels().collect();
    let base_labels: BTreeSet<&str> = base.labels().collect();
    let mut report = String::new();
    for added in current_labels.difference(&base_labels) {
        report.push_str(&format!("+ {added}\n"));
    }
    for removed in base_labels.difference(&current_labels) {
        report.push_str(&format!("- {removed}\n"));
    }
    if report.is_empty() {
        report.push_str("no label differences\n");
    }
    Ok(report)
}

async fn phase_graph(generator: &mut Generator, phase: Phase) -> Result<&TaskGraph> {
    match phase {
        Phase::Full => generator.full_task_graph(),
        Phase::Target => generator.target_task_graph(),
        Phase::TargetGraph => generator.target_task_graph(),
        Phase::Optimized | Phase::Decision => generator.optimized_task_graph().await,
        Phase::Morphed => generator.morphed_task_graph().await,
    }
}

fn emit(options: &Options, rendered: &str) -> Result<()> {
    match &options.output_file {
        Some(path) => std::fs::write(path, rendered)
            .map_err(|source| Error::file_system(path, "write", source)),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
