use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::images::docker::DockerLister;
use crate::images::{self, ImageLister, LabelFilter};
use crate::progress::Spinner;
use crate::spec::ValueSpec;
use crate::tree::{Value, ValueTree};

pub async fn run(
    cfg: &AppConfig,
    values: &[String],
    labels: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    if values.is_empty() {
        bail!("no values requested: did you forget to specify any with --value?");
    }

    // Parse everything up front so a typo fails before any image query.
    let specs = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.parse::<ValueSpec>()
                .with_context(|| format!("invalid value #{} {v:?}", i + 1))
        })
        .collect::<Result<Vec<_>>>()?;
    let filters: Vec<LabelFilter> = labels.iter().map(|l| LabelFilter::label(l)).collect();

    // Fail on a bad destination before spending time on queries.
    if let Some(out) = &cfg.out {
        prepare_output_dir(out)?;
    }

    let lister = DockerLister::new(&cfg.docker);
    let spinner = Spinner::new("Resolving image metadata...", !cfg.quiet);
    let tree = match build_tree(&lister, &specs, &filters, cancel, &spinner).await {
        Ok(tree) => tree,
        Err(e) => {
            spinner.abandon();
            return Err(e);
        }
    };
    spinner.finish(format!("Resolved {} values", specs.len()));

    match &cfg.out {
        Some(out) => {
            let file = File::create(out)
                .with_context(|| format!("Failed to create output file {}", out.display()))?;
            tree.write_to(cfg.format, BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(path = %out.display(), "wrote values");
        }
        None => tree.write_to(cfg.format, io::stdout().lock())?,
    }

    Ok(())
}

/// Resolve every requested value in order into one tree. The first failure aborts the run.
pub async fn build_tree<L: ImageLister>(
    lister: &L,
    specs: &[ValueSpec],
    filters: &[LabelFilter],
    cancel: &CancellationToken,
    spinner: &Spinner,
) -> Result<ValueTree> {
    let mut tree = ValueTree::new();
    for (i, spec) in specs.iter().enumerate() {
        spinner.set_message(format!(
            "Resolving {} ({}/{}) ...",
            spec.key,
            i + 1,
            specs.len()
        ));
        let value = resolve(lister, spec, filters, cancel)
            .await
            .with_context(|| format!("error while building value #{} for {:?}", i + 1, spec.key))?;
        tree.insert(&spec.key, value)?;
    }
    Ok(tree)
}

/// List, filter by tag, pick the newest image and extract the requested field.
pub async fn resolve<L: ImageLister>(
    lister: &L,
    spec: &ValueSpec,
    filters: &[LabelFilter],
    cancel: &CancellationToken,
) -> crate::error::Result<Value> {
    let listed = lister.list(&spec.repository, filters, cancel).await?;
    let candidates = images::filter_by_tag(&spec.tag, listed);
    let image = images::select_latest(&spec.repository, &spec.tag, &candidates)?;
    let value = image.field(spec.handler);
    info!(key = %spec.key, handler = %spec.handler, image = %image.id, "resolved value");
    Ok(value)
}

/// Make sure the parent directory of `out` exists, creating it when missing.
fn prepare_output_dir(out: &Path) -> Result<()> {
    let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };

    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => bail!("{} exists but is not a directory", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "output directory does not exist, creating it");
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to inspect output directory {}", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::ScrapbookError;
    use crate::images::ImageRecord;
    use crate::images::tests::record;

    /// Serves canned listings per repository and records the calls it gets.
    #[derive(Default)]
    struct StubLister {
        images: Vec<ImageRecord>,
        calls: RefCell<Vec<(String, Vec<LabelFilter>)>>,
    }

    impl StubLister {
        fn new(images: Vec<ImageRecord>) -> Self {
            Self {
                images,
                ..Default::default()
            }
        }
    }

    impl ImageLister for StubLister {
        async fn list(
            &self,
            repository: &str,
            filters: &[LabelFilter],
            _cancel: &CancellationToken,
        ) -> crate::error::Result<Vec<ImageRecord>> {
            self.calls
                .borrow_mut()
                .push((repository.to_string(), filters.to_vec()));
            Ok(self
                .images
                .iter()
                .filter(|i| i.repository == repository)
                .cloned()
                .collect())
        }
    }

    /// Always fails like a daemon that is not running.
    struct BrokenLister;

    impl ImageLister for BrokenLister {
        async fn list(
            &self,
            _repository: &str,
            _filters: &[LabelFilter],
            _cancel: &CancellationToken,
        ) -> crate::error::Result<Vec<ImageRecord>> {
            Err(ScrapbookError::execution("docker images", "exit code 1: daemon not running"))
        }
    }

    fn specs(values: &[&str]) -> Vec<ValueSpec> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    fn hidden_spinner() -> Spinner {
        Spinner::new("", false)
    }

    fn scrapbook_error(err: &anyhow::Error) -> &ScrapbookError {
        err.chain()
            .find_map(|e| e.downcast_ref::<ScrapbookError>())
            .expect("error chain carries a ScrapbookError")
    }

    #[tokio::test]
    async fn default_handler_writes_digest() {
        let mut image = record("abc", "12345", "2020-05-01T12:00:00Z");
        image.digest = "sha256:abcd".to_string();
        let lister = StubLister::new(vec![image]);

        let tree = build_tree(
            &lister,
            &specs(&["image.tag=docker.io/example:12345"]),
            &[],
            &CancellationToken::new(),
            &hidden_spinner(),
        )
        .await
        .unwrap();

        assert_eq!(
            tree.render(crate::tree::Format::Yaml).unwrap(),
            "image:\n  tag: sha256:abcd\n"
        );
    }

    #[tokio::test]
    async fn tag_filter_runs_after_listing() {
        let lister = StubLister::new(vec![
            record("newer", "v2", "2020-05-03T00:00:00Z"),
            record("wanted", "v1", "2020-05-02T00:00:00Z"),
            record("older", "v1", "2020-05-01T00:00:00Z"),
        ]);
        let filters = vec![LabelFilter::label("build=12345")];

        let tree = build_tree(
            &lister,
            &specs(&["app.id=docker.io/example:v1=id", "app.latest=docker.io/example=ID"]),
            &filters,
            &CancellationToken::new(),
            &hidden_spinner(),
        )
        .await
        .unwrap();

        assert_eq!(
            tree.render(crate::tree::Format::Yaml).unwrap(),
            "app:\n  id: wanted\n  latest: newer\n"
        );
        // the tag never reaches the lister, the labels always do
        let calls = lister.calls.borrow();
        assert_eq!(calls.len(), 2);
        for (repository, passed) in calls.iter() {
            assert_eq!(repository, "docker.io/example");
            assert_eq!(passed, &filters);
        }
    }

    #[tokio::test]
    async fn missing_image_aborts_remaining_specs() {
        let lister = StubLister::new(vec![record("abc", "v1", "2020-05-01T00:00:00Z")]);

        let err = build_tree(
            &lister,
            &specs(&[
                "a=docker.io/example:v9",
                "b=docker.io/example:v1",
            ]),
            &[],
            &CancellationToken::new(),
            &hidden_spinner(),
        )
        .await
        .unwrap_err();

        assert!(matches!(scrapbook_error(&err), ScrapbookError::NotFound { .. }), "{err:?}");
        assert_eq!(lister.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn lister_failure_is_propagated() {
        let err = build_tree(
            &BrokenLister,
            &specs(&["a=docker.io/example"]),
            &[],
            &CancellationToken::new(),
            &hidden_spinner(),
        )
        .await
        .unwrap_err();
        assert!(matches!(scrapbook_error(&err), ScrapbookError::Execution { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn conflicting_keys_fail() {
        let lister = StubLister::new(vec![record("abc", "v1", "2020-05-01T00:00:00Z")]);
        let err = build_tree(
            &lister,
            &specs(&["image=docker.io/example", "image.tag=docker.io/example"]),
            &[],
            &CancellationToken::new(),
            &hidden_spinner(),
        )
        .await
        .unwrap_err();
        assert!(matches!(scrapbook_error(&err), ScrapbookError::KeyConflict { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn bad_value_fails_before_listing() {
        let cfg = AppConfig {
            docker: "buildtools-no-such-binary".to_string(),
            quiet: true,
            ..Default::default()
        };
        let err = run(
            &cfg,
            &["image.tag=docker.io/example".to_string(), "image.tag".to_string()],
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(scrapbook_error(&err), ScrapbookError::MalformedSpec { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn no_values_is_an_error() {
        let cfg = AppConfig {
            quiet: true,
            ..Default::default()
        };
        assert!(run(&cfg, &[], &[], &CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn failed_run_leaves_no_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("values.yaml");
        let cfg = AppConfig {
            docker: "buildtools-no-such-binary".to_string(),
            out: Some(out.clone()),
            quiet: true,
            ..Default::default()
        };

        let err = run(
            &cfg,
            &["image.tag=docker.io/example".to_string()],
            &[],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(scrapbook_error(&err), ScrapbookError::Execution { .. }), "{err:?}");
        assert!(out.parent().unwrap().is_dir());
        assert!(!out.exists());
    }

    #[test]
    fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a").join("b").join("values.yaml");
        prepare_output_dir(&out).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());

        // bare file names need no directory
        prepare_output_dir(Path::new("values.yaml")).unwrap();
    }

    #[test]
    fn output_parent_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(prepare_output_dir(&file.join("values.yaml")).is_err());
    }
}
