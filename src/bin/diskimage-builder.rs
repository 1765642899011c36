use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use diskimage_builder::commit::OstreeCli;
use diskimage_builder::disk::{CommandEstimator, VmSandbox};
use diskimage_builder::pipeline::{self, BuildRequest, Outcome, Services};
use diskimage_builder::{Arch, BuildSelector, ImageType, Settings};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  diskimage-builder build <metal|dasd|qemu> [--build <id|latest>] [--arch <arch>] [--workdir <dir>]"
}

struct Options {
    image_type: ImageType,
    build: BuildSelector,
    arch: Option<Arch>,
    workdir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [build, image_type, rest @ ..] if build == "build" => {
            let options = parse_options(image_type, rest)?;
            build_image(options)
        }
        _ => bail!(usage()),
    }
}

fn parse_options(image_type: &str, rest: &[String]) -> Result<Options> {
    let mut options = Options {
        image_type: image_type
            .parse()
            .with_context(|| format!("parsing image type '{image_type}'"))?,
        build: BuildSelector::Latest,
        arch: None,
        workdir: None,
    };

    let mut iter = rest.iter();
    while let Some(flag) = iter.next() {
        let Some(value) = iter.next() else {
            bail!("missing value for '{flag}'\n{}", usage());
        };
        match flag.as_str() {
            "--build" => options.build = BuildSelector::parse(value),
            "--arch" => {
                options.arch = Some(
                    value
                        .parse()
                        .with_context(|| format!("parsing architecture '{value}'"))?,
                )
            }
            "--workdir" => options.workdir = Some(PathBuf::from(value)),
            other => bail!("unknown option '{other}'\n{}", usage()),
        }
    }

    Ok(options)
}

fn build_image(options: Options) -> Result<()> {
    let workdir = match options.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let arch = match options.arch {
        Some(arch) => arch,
        None => Arch::host().context("detecting host architecture")?,
    };
    let settings = Settings::load(&workdir)
        .with_context(|| format!("loading settings from '{}'", workdir.display()))?;

    let sandbox = VmSandbox::new(
        settings.tools.runvm.clone(),
        settings.disk.create_disk_script.clone(),
    );
    let estimator = CommandEstimator::new(settings.tools.estimator.clone());
    let inspector = OstreeCli::new(settings.tools.ostree.clone());
    let services = Services {
        sandbox: &sandbox,
        estimator: &estimator,
        inspector: &inspector,
    };

    let request = BuildRequest {
        workdir,
        build: options.build,
        arch,
        image_type: options.image_type,
        settings,
        check_host_tools: true,
    };

    match pipeline::run(&request, services)
        .with_context(|| format!("building {} image", request.image_type))?
    {
        Outcome::AlreadyBuilt { path } => {
            tracing::info!(path = %path.display(), "image already present")
        }
        Outcome::Built(published) => {
            tracing::info!(path = %published.path.display(), "image built")
        }
    }
    Ok(())
}
