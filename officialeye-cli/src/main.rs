use clap::{Args, Parser, Subcommand};
use officialeye::analysis::{analyze_async, render_template_overview};
use officialeye::image::io::load_gray_image;
use officialeye::io::{driver_by_id, IoDriver};
use officialeye::{Context, OfficialEyeError, Template};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "OfficialEye CLI (template driven document analysis)")]
struct Cli {
    /// Enable tracing output for performance profiling.
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// IO driver receiving results and errors (`run` or `test`).
    #[arg(long, default_value = "run")]
    driver: String,
    /// Directory the `test` driver exports images into.
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse a target image against one or more templates.
    Run {
        /// Template description files (JSON).
        #[arg(required = true, value_name = "TEMPLATE")]
        templates: Vec<PathBuf>,
        /// Image to analyse.
        #[arg(long, value_name = "IMG")]
        target: PathBuf,
        /// Image features are extracted from; defaults to the target.
        #[arg(long, value_name = "IMG")]
        interpret: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Render keypoint and feature outlines over a template's source image.
    Show {
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Load and validate templates, printing a summary of each.
    Validate {
        #[arg(required = true, value_name = "TEMPLATE")]
        templates: Vec<PathBuf>,
    },
}

fn make_driver(output: &OutputArgs) -> Result<Box<dyn IoDriver>, OfficialEyeError> {
    driver_by_id(&output.driver, output.export_dir.as_deref(), std::io::stdout())
}

fn run(
    templates: &[PathBuf],
    target: &Path,
    interpret: Option<&Path>,
    output: &OutputArgs,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut driver = make_driver(output)?;
    let ctx = Arc::new(Context::new());
    let target = Arc::new(load_gray_image(target)?);
    let interpretation_target = match interpret {
        Some(path) => Some(Arc::new(load_gray_image(path)?)),
        None => None,
    };

    let mut failures = 0;
    let mut handles = Vec::with_capacity(templates.len());
    for path in templates {
        match Template::load(&ctx, path) {
            Ok(template) => handles.push((
                Arc::clone(&template),
                analyze_async(
                    Arc::clone(&ctx),
                    template,
                    Arc::clone(&target),
                    interpretation_target.clone(),
                ),
            )),
            Err(err) => {
                failures += 1;
                driver.handle_error(&err)?;
            }
        }
    }

    for (template, handle) in handles {
        match handle.wait() {
            Ok(result) => driver.handle_analysis_result(&template, &target, &result)?,
            Err(err) => {
                failures += 1;
                driver.handle_error(&err)?;
            }
        }
    }
    Ok(failures)
}

fn show(template: &Path, output: &OutputArgs) -> Result<usize, Box<dyn std::error::Error>> {
    let mut driver = make_driver(output)?;
    let ctx = Context::new();
    let outcome = Template::load(&ctx, template).and_then(|template| {
        let overview = render_template_overview(&template);
        driver.handle_show_result(&template, &overview)
    });
    match outcome {
        Ok(()) => Ok(0),
        Err(err) => {
            driver.handle_error(&err)?;
            Ok(1)
        }
    }
}

fn validate(templates: &[PathBuf]) -> usize {
    let ctx = Context::new();
    let mut failures = 0;
    for path in templates {
        let summary = match Template::load(&ctx, path) {
            Ok(template) => json!({
                "path": path.display().to_string(),
                "template": template.identifier(),
                "name": template.name(),
                "keypoints": template.keypoints().len(),
                "features": template.features().len(),
                "feature_classes": template.feature_classes().iter().count(),
                "matching": template.matching_engine(),
                "supervision": template.supervision_engine(),
                "result": template.policy().as_str(),
            }),
            Err(err) => {
                failures += 1;
                json!({"path": path.display().to_string(), "error": err.to_json()})
            }
        };
        println!("{summary}");
    }
    failures
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("officialeye=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    let failures = match &cli.command {
        Command::Run {
            templates,
            target,
            interpret,
            output,
        } => run(templates, target, interpret.as_deref(), output)?,
        Command::Show { template, output } => show(template, output)?,
        Command::Validate { templates } => validate(templates),
    };

    if failures > 0 {
        tracing::debug!(failures, "finished with failures");
        return Err(format!("{failures} template(s) failed").into());
    }
    Ok(())
}
