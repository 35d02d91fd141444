//! Docker-backed image layer builds and manifest assembly.
//!
//! All registry work shells out to the `docker` CLI with enforced timeouts
//! so a wedged daemon surfaces as an error instead of a hang.

use super::{ImageBackend, LayerRef, LayerRequest};
use crate::error::{PipelineError, Result};
use crate::secrets::Secrets;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for the Docker daemon availability check (5 seconds)
pub const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for building and pushing one image layer (30 minutes)
pub const LAYER_BUILD_TIMEOUT: Duration = Duration::from_secs(1800);

/// Timeout for manifest create/annotate/push operations (10 minutes)
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Image backend that drives the local Docker CLI.
pub struct DockerBackend {
    repository: String,
    dockerfile: PathBuf,
    context_dir: PathBuf,
    secrets: Secrets,
}

impl DockerBackend {
    /// Create a backend publishing to `repository`.
    ///
    /// `context_dir` is the build context holding the staged binaries;
    /// `dockerfile` is the layer recipe applied per architecture.
    pub fn new(
        repository: impl Into<String>,
        dockerfile: impl Into<PathBuf>,
        context_dir: impl Into<PathBuf>,
        secrets: Secrets,
    ) -> Self {
        Self {
            repository: repository.into(),
            dockerfile: dockerfile.into(),
            context_dir: context_dir.into(),
            secrets,
        }
    }

    async fn login(&self) -> Result<()> {
        let Some(credentials) = &self.secrets.registry else {
            log::debug!("no registry credentials supplied; relying on ambient docker auth");
            return Ok(());
        };

        let mut args = vec!["login".to_string()];
        if let Some(host) = registry_host(&self.repository) {
            args.push(host.to_string());
        }
        args.extend([
            "--username".to_string(),
            credentials.username.clone(),
            "--password-stdin".to_string(),
        ]);

        let mut child = Command::new("docker")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| registry_error("docker login", e.to_string()))?;

        // The password travels over stdin only; it never appears in argv.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(credentials.password().as_bytes())
                .await
                .map_err(|e| registry_error("docker login", e.to_string()))?;
        }

        let output = timeout(DOCKER_INFO_TIMEOUT.saturating_mul(6), child.wait_with_output())
            .await
            .map_err(|_| registry_error("docker login", "timed out".to_string()))?
            .map_err(|e| registry_error("docker login", e.to_string()))?;

        if !output.status.success() {
            return Err(registry_error(
                "docker login",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        log::info!("authenticated to registry as {}", credentials.username);
        Ok(())
    }

    async fn run(
        &self,
        operation: &'static str,
        args: &[String],
        limit: Duration,
    ) -> Result<std::process::Output> {
        let mut command = Command::new("docker");
        command.args(args).stdin(Stdio::null());

        // TLS material is forwarded through the environment so docker can
        // pick it up via value-less --build-arg flags; it stays out of argv.
        if let Some(cert) = &self.secrets.tls_cert {
            command.env("SERVER_CA_CERT", cert);
        }
        if let Some(key) = &self.secrets.tls_key {
            command.env("SERVER_CA_KEY", key);
        }

        let output = timeout(limit, command.output())
            .await
            .map_err(|_| {
                registry_error(
                    operation,
                    format!("timed out after {} seconds", limit.as_secs()),
                )
            })?
            .map_err(|e| registry_error(operation, e.to_string()))?;

        Ok(output)
    }

    async fn run_checked(
        &self,
        operation: &'static str,
        args: &[String],
        limit: Duration,
    ) -> Result<std::process::Output> {
        let output = self.run(operation, args, limit).await?;
        if !output.status.success() {
            return Err(registry_error(
                operation,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl ImageBackend for DockerBackend {
    async fn prepare(&self) -> Result<()> {
        check_docker_available().await?;
        self.login().await
    }

    async fn build_layer(&self, request: &LayerRequest) -> Result<LayerRef> {
        let binary_in_context = request
            .binary_path
            .strip_prefix(&self.context_dir)
            .map_err(|_| {
                registry_error(
                    "docker build",
                    format!(
                        "staged binary {} is outside the build context {}",
                        request.binary_path.display(),
                        self.context_dir.display()
                    ),
                )
            })?;

        let reference = layer_reference(&self.repository, &request.version, &request.arch_suffix);
        let args = layer_build_args(
            &reference,
            &request.architecture_tag,
            &binary_in_context.to_string_lossy(),
            &self.dockerfile.to_string_lossy(),
            &self.context_dir.to_string_lossy(),
            self.secrets.tls_cert.is_some(),
            self.secrets.tls_key.is_some(),
        );

        log::info!("building layer {} ({})", reference, request.architecture_tag);
        self.run_checked("docker build", &args, LAYER_BUILD_TIMEOUT)
            .await?;

        let push_args = vec!["push".to_string(), reference.clone()];
        self.run_checked("docker push", &push_args, LAYER_BUILD_TIMEOUT)
            .await?;

        Ok(LayerRef {
            reference,
            architecture_tag: request.architecture_tag.clone(),
        })
    }

    async fn push_manifest(&self, version: &str, layers: &[LayerRef]) -> Result<String> {
        let manifest = format!("{}:{}", self.repository, version);

        // Re-publishing a version replaces the previous manifest; a stale
        // local list would make `manifest create` fail, so drop it first.
        let rm_args = vec!["manifest".to_string(), "rm".to_string(), manifest.clone()];
        if let Ok(output) = self.run("docker manifest rm", &rm_args, MANIFEST_TIMEOUT).await
            && !output.status.success()
        {
            log::debug!("no local manifest to remove for {}", manifest);
        }

        let create_args = manifest_create_args(&manifest, layers);
        self.run_checked("docker manifest create", &create_args, MANIFEST_TIMEOUT)
            .await?;

        for layer in layers {
            let annotate_args = manifest_annotate_args(&manifest, layer);
            self.run_checked("docker manifest annotate", &annotate_args, MANIFEST_TIMEOUT)
                .await?;
        }

        let push_args = vec![
            "manifest".to_string(),
            "push".to_string(),
            "--purge".to_string(),
            manifest.clone(),
        ];
        let output = self
            .run_checked("docker manifest push", &push_args, MANIFEST_TIMEOUT)
            .await?;

        let digest = String::from_utf8_lossy(&output.stdout)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string();

        log::info!("pushed manifest {} ({})", manifest, digest);
        Ok(digest)
    }
}

/// Checks that Docker is installed and the daemon is responding.
pub async fn check_docker_available() -> Result<()> {
    let status_result = timeout(
        DOCKER_INFO_TIMEOUT,
        Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await;

    match status_result {
        Err(_) => Err(registry_error(
            "docker info",
            format!(
                "daemon check timed out after {} seconds; if Docker is running, check: docker ps",
                DOCKER_INFO_TIMEOUT.as_secs()
            ),
        )),
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(registry_error(
            "docker info",
            format!(
                "daemon is not responding (exit code: {})",
                status.code().unwrap_or(-1)
            ),
        )),
        Ok(Err(e)) => Err(registry_error(
            "docker",
            format!("command not found: {e}; install from https://docs.docker.com/get-docker/"),
        )),
    }
}

fn registry_error(operation: &str, reason: String) -> PipelineError {
    PipelineError::Registry {
        operation: operation.to_string(),
        reason,
    }
}

/// Registry host component of a repository, when it names one explicitly.
///
/// "registry.example.com/relay" logs in against registry.example.com;
/// "myorg/relay" falls through to the default registry.
pub(crate) fn registry_host(repository: &str) -> Option<&str> {
    let (first, _) = repository.split_once('/')?;
    (first.contains('.') || first.contains(':') || first == "localhost").then_some(first)
}

/// Per-architecture layer reference: `{repository}:{version}-{suffix}`.
pub(crate) fn layer_reference(repository: &str, version: &str, arch_suffix: &str) -> String {
    format!("{}:{}-{}", repository, version, arch_suffix)
}

fn layer_build_args(
    reference: &str,
    architecture_tag: &str,
    binary_in_context: &str,
    dockerfile: &str,
    context: &str,
    with_tls_cert: bool,
    with_tls_key: bool,
) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--platform".to_string(),
        architecture_tag.to_string(),
        "--build-arg".to_string(),
        format!("RELAY_BINARY={}", binary_in_context),
    ];
    if with_tls_cert {
        args.extend(["--build-arg".to_string(), "SERVER_CA_CERT".to_string()]);
    }
    if with_tls_key {
        args.extend(["--build-arg".to_string(), "SERVER_CA_KEY".to_string()]);
    }
    args.extend([
        "--tag".to_string(),
        reference.to_string(),
        "--file".to_string(),
        dockerfile.to_string(),
        context.to_string(),
    ]);
    args
}

fn manifest_create_args(manifest: &str, layers: &[LayerRef]) -> Vec<String> {
    let mut args = vec![
        "manifest".to_string(),
        "create".to_string(),
        manifest.to_string(),
    ];
    args.extend(layers.iter().map(|layer| layer.reference.clone()));
    args
}

fn manifest_annotate_args(manifest: &str, layer: &LayerRef) -> Vec<String> {
    let (os, arch, variant) = annotation_parts(&layer.architecture_tag);
    let mut args = vec![
        "manifest".to_string(),
        "annotate".to_string(),
        manifest.to_string(),
        layer.reference.clone(),
        "--os".to_string(),
        os.to_string(),
        "--arch".to_string(),
        arch.to_string(),
    ];
    if let Some(variant) = variant {
        args.extend(["--variant".to_string(), variant.to_string()]);
    }
    args
}

/// Split an architecture tag into manifest annotation parts.
pub(crate) fn annotation_parts(architecture_tag: &str) -> (&str, &str, Option<&str>) {
    let mut parts = architecture_tag.splitn(3, '/');
    let os = parts.next().unwrap_or("linux");
    let arch = parts.next().unwrap_or(architecture_tag);
    (os, arch, parts.next())
}
