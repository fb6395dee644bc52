//! Builds the RAN container images on the cluster. The base image comes
//! first, then stages of images built on top of it; each stage's builds run
//! concurrently on the cluster and the next stage only starts when all
//! previous stages succeeded.

use crate::cluster::build::{start_build, wait_build_end, WaitPolicy};
use crate::cluster::resources::{
    delete_stale_image_tags, deploy_pod, get_image_size, recreate_bc, recreate_entitlements,
    recreate_is_tag, retag_image_statement, undeploy_pod,
};
use crate::cluster::{oc_login, oc_logout, validate_settings, IMAGE_REGISTRY_SERVICE_NAME};
use crate::cmd::{Cmd, RunOptions};
use crate::config::{CiConfig, RanSettings};
use crate::containerize::{analyze_build_logs, copy_logs_to_executor};
use crate::error::CiError::MissingParameterError;
use crate::error::CiResult;
use crate::io::Logger;
use crate::report::{Status, TestReport, ALL_PROCESSES_OK};
use colored::Colorize;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const RAN_BASE: &str = "ran-base";
const LOG_DIR: &str = "cmake_targets/log";
const BASE_BUILD_TIMEOUT_SECS: u64 = 800;
const LOG_RETRIEVAL_POD: &str = "openshift/ran-base-log-retrieval.yaml";
const LOG_RETRIEVAL_TIMEOUT_SECS: u64 = 120;
const STALE_IMAGE_MAX_AGE_WEEKS: i64 = 3;

lazy_static! {
    static ref INTEGRATION_BRANCH: Regex = Regex::new(r"integration_20([0-9]{2})_w([0-9]{2})").unwrap();
}

/// An image built from `dockerfile` on top of ran-base and, optionally, an
/// intermediate `builder` image from an earlier stage.
#[derive(Debug)]
pub struct ImageSpec {
    pub name: &'static str,
    pub dockerfile: &'static str,
    pub builder: Option<&'static str>,
}

#[derive(Debug, PartialEq)]
pub enum Gate {
    /// Runs only if every stage before succeeded.
    PreviousSuccess,
    /// Runs whenever the stage before ran, whatever its outcome.
    WithPrevious,
}

#[derive(Debug)]
pub struct Stage {
    pub images: &'static [ImageSpec],
    pub timeout_secs: u64,
    pub gate: Gate,
    pub collect_metrics: bool,
}

/// Everything built after ran-base, in order.
pub const STAGES: &[Stage] = &[
    Stage {
        images: &[
            ImageSpec {
                name: "oai-physim",
                dockerfile: "docker/Dockerfile.phySim.rhel9",
                builder: None,
            },
            ImageSpec {
                name: "ran-build",
                dockerfile: "docker/Dockerfile.build.rhel9",
                builder: None,
            },
            ImageSpec {
                name: "oai-clang",
                dockerfile: "docker/Dockerfile.clang.rhel9",
                builder: None,
            },
        ],
        timeout_secs: 1200,
        gate: Gate::PreviousSuccess,
        collect_metrics: true,
    },
    Stage {
        images: &[
            ImageSpec {
                name: "oai-enb",
                dockerfile: "docker/Dockerfile.eNB.rhel9",
                builder: Some("ran-build"),
            },
            ImageSpec {
                name: "oai-gnb",
                dockerfile: "docker/Dockerfile.gNB.rhel9",
                builder: Some("ran-build"),
            },
            ImageSpec {
                name: "oai-gnb-aw2s",
                dockerfile: "docker/Dockerfile.gNB.aw2s.rhel9",
                builder: Some("ran-build"),
            },
        ],
        timeout_secs: 600,
        gate: Gate::PreviousSuccess,
        collect_metrics: false,
    },
    Stage {
        images: &[
            ImageSpec {
                name: "oai-nr-cuup",
                dockerfile: "docker/Dockerfile.nr-cuup.rhel9",
                builder: Some("ran-build"),
            },
            ImageSpec {
                name: "oai-lte-ue",
                dockerfile: "docker/Dockerfile.lteUE.rhel9",
                builder: Some("ran-build"),
            },
            ImageSpec {
                name: "oai-nr-ue",
                dockerfile: "docker/Dockerfile.nrUE.rhel9",
                builder: Some("ran-build"),
            },
        ],
        timeout_secs: 600,
        gate: Gate::WithPrevious,
        collect_metrics: true,
    },
    Stage {
        images: &[ImageSpec {
            name: "ran-build-fhi72",
            dockerfile: "docker/Dockerfile.build.fhi72.rhel9",
            builder: None,
        }],
        timeout_secs: 1200,
        gate: Gate::PreviousSuccess,
        collect_metrics: true,
    },
    Stage {
        images: &[ImageSpec {
            name: "oai-gnb-fhi72",
            dockerfile: "docker/Dockerfile.gNB.fhi72.rhel9",
            builder: Some("ran-build-fhi72"),
        }],
        timeout_secs: 600,
        gate: Gate::PreviousSuccess,
        collect_metrics: true,
    },
];

/// Tags used for one build: `image_tag` for every image but ran-base,
/// which gets `base_tag`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTags {
    pub image_tag: String,
    pub base_tag: String,
    pub force_base_build: bool,
}

/// Checks every parameter a cluster build needs.
pub fn validate_build_parameters(config: &CiConfig) -> CiResult<()> {
    let ran = &config.ran;
    if ran.repository.is_empty() || ran.branch.is_empty() || ran.commit_id.is_empty() {
        return Err(MissingParameterError(format!(
            "ranRepository {} ranBranch {} ranCommitID {}",
            ran.repository, ran.branch, ran.commit_id
        )));
    }
    if config.node.address.is_empty() || config.node.source_code_path.is_empty() {
        return Err(MissingParameterError(
            "eNBSourceCodePath missing".to_string(),
        ));
    }
    validate_settings(&config.cluster, &config.cluster.project_name)
}

/// Decides the tags of this build. The develop branch always rebuilds
/// ran-base as `develop`. A merge request only rebuilds it, as `ci-temp`,
/// when it touches the base image recipe or is an integration branch;
/// otherwise it reuses `ran-base:develop`.
///
/// Built images are always tagged with the commit, so a build never
/// overwrites the shared `develop` images.
pub fn compute_tags(cmd: &mut dyn Cmd, ran: &RanSettings) -> CiResult<ImageTags> {
    let short_commit: String = ran.commit_id.chars().take(8).collect();
    let image_tag = if ran.allow_merge {
        format!("{}-{}", ran.branch.replace('/', "-"), short_commit)
    } else {
        format!("develop-{}", short_commit)
    };
    if !ran.allow_merge {
        return Ok(ImageTags {
            image_tag,
            base_tag: "develop".to_string(),
            force_base_build: true,
        });
    }

    let mut force_base_build = false;
    if ran.target_branch == "develop" {
        let ret = cmd.run_with(
            "git diff HEAD..origin/develop -- cmake_targets/build_oai cmake_targets/tools/build_helper docker/Dockerfile.base.rhel9 | grep --colour=never -i INDEX",
            RunOptions::ignore_non_zero(),
        )?;
        force_base_build = ret.stdout.contains("index");
    }
    if INTEGRATION_BRANCH.is_match(&ran.branch) {
        force_base_build = true;
    }

    Ok(ImageTags {
        image_tag,
        base_tag: if force_base_build { "ci-temp" } else { "develop" }.to_string(),
        force_base_build,
    })
}

/// One run of the image build on the cluster, triggered from the node and
/// workspace given in the configuration.
pub struct ClusterBuild<'a> {
    cmd: &'a mut dyn Cmd,
    config: &'a CiConfig,
    cancel: &'a AtomicBool,
    logger: Logger,
    check_interval: Duration,
}

impl<'a> ClusterBuild<'a> {
    pub fn new(
        cmd: &'a mut dyn Cmd,
        config: &'a CiConfig,
        cancel: &'a AtomicBool,
        logger: &Logger,
    ) -> Self {
        Self {
            cmd,
            config,
            cancel,
            logger: logger.clone(),
            check_interval: Duration::from_secs(5),
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Builds all images, collects their logs into `local_dir` and records
    /// the outcome in `report`. Returns whether every image was built.
    pub fn run(&mut self, report: &mut TestReport, local_dir: &Path) -> CiResult<bool> {
        validate_build_parameters(self.config)?;
        let source_path = self.config.node.source_code_path.clone();
        self.logger.debug(format!(
            "Building on cluster triggered from server: {}",
            self.config.node.address
        ))?;

        self.cmd.cd(&source_path);
        // keep the upload to the cluster small
        self.cmd
            .run(&format!("rm -rf {}/cmake_targets/ran_build", source_path))?;

        let tags = compute_tags(self.cmd, &self.config.ran)?;

        let login = oc_login(
            self.cmd,
            &self.config.cluster,
            &self.config.cluster.project_name,
            &self.logger,
        )?;
        if !login.is_logged_in() {
            report.add_row("N/A", Status::Ko, login.failure_message());
            return Ok(false);
        }

        delete_stale_image_tags(
            self.cmd,
            chrono::Duration::weeks(STALE_IMAGE_MAX_AGE_WEEKS),
            &self.logger,
        )?;
        recreate_entitlements(self.cmd, &self.logger)?;

        let mut status = true;
        let mut attempted = Vec::new();
        if self.cancelled() {
            status = false;
        } else if tags.force_base_build {
            status = self.build_base_image(&tags, &mut attempted)?;
        }

        let mut previous_ran = true;
        for stage in STAGES {
            if self.cancelled() {
                self.logger.error("build interrupted, skipping remaining stages")?;
                status = false;
                break;
            }
            let run = match stage.gate {
                Gate::PreviousSuccess => status,
                Gate::WithPrevious => previous_ran,
            };
            previous_ran = run;
            if run {
                let built = self.run_stage(stage, &tags, &mut attempted)?;
                status = status && built;
            }
        }

        let mut image_sizes = BTreeMap::new();
        for image in &attempted {
            self.cmd.run(&format!("mkdir -p {}/{}", LOG_DIR, image))?;
            let tag = if image == RAN_BASE {
                &tags.base_tag
            } else {
                &tags.image_tag
            };
            let size = get_image_size(self.cmd, &self.config.cluster.namespace, image, tag)?;
            let (description, found) = describe_image_size(size);
            status = status && found;
            self.logger
                .log(format!("{} size is {}", image, description).bold())?;
            image_sizes.insert(image.clone(), description);
        }

        self.cmd.run(&format!(
            "oc get images | grep -e '{}' &> {}/image_registry.log",
            attempted.join("\\|"),
            LOG_DIR
        ))?;
        self.cmd.run_with(
            &format!(
                "for pod in $(oc get pods | tail -n +2 | awk '{{print $1}}'); do oc get pod $pod -o json &>> {}/build_pod_summary.log; done",
                LOG_DIR
            ),
            RunOptions::with_timeout(60),
        )?;

        let build_log_name = format!("build_log_{}", report.test_case_id);
        copy_logs_to_executor(
            self.cmd,
            &source_path,
            &build_log_name,
            local_dir,
            &self.logger,
        )?;

        self.cmd.run(
            "for pod in $(oc get pods | tail -n +2 | awk '{print $1}'); do oc delete pod ${pod}; done",
        )?;
        oc_logout(self.cmd)?;
        self.cmd.close()?;

        let build_logs = analyze_build_logs(&local_dir.join(&build_log_name), &attempted, status)?;
        let logs_ok = build_logs
            .values()
            .flat_map(|files| files.values())
            .all(|analysis| analysis.status);
        status = status && logs_ok;
        if !status {
            self.logger.debug(format!("{:?}", build_logs))?;
        }

        if status {
            self.logger.log(" Building OAI Image(s) Pass".green().bold())?;
        } else {
            self.logger.error(" Building OAI Images Failed".bold())?;
        }
        report.add_row("all", Status::from_bool(status), ALL_PROCESSES_OK);
        report.set_image_details(build_logs, image_sizes);

        Ok(status)
    }

    /// Builds ran-base and brings back the build logs kept inside the image
    /// by mounting it in a retrieval pod.
    fn build_base_image(&mut self, tags: &ImageTags, attempted: &mut Vec<String>) -> CiResult<bool> {
        let source_path = &self.config.node.source_code_path;
        recreate_is_tag(
            self.cmd,
            RAN_BASE,
            &tags.base_tag,
            "openshift/ran-base-is.yaml",
            &self.logger,
        )?;
        recreate_bc(
            self.cmd,
            RAN_BASE,
            &tags.base_tag,
            "openshift/ran-base-bc.yaml",
            &self.logger,
        )?;
        let job = start_build(self.cmd, RAN_BASE, source_path, &self.logger)?;
        attempted.push(RAN_BASE.to_string());

        let mut status = match &job {
            Some(job) => wait_build_end(
                self.cmd,
                &[job.clone()],
                &WaitPolicy::new(BASE_BUILD_TIMEOUT_SECS, self.check_interval),
                self.cancel,
                &self.logger,
            )?,
            None => false,
        };
        if !status {
            self.logger.error("failure during build of ran-base")?;
        }
        if let Some(job) = &job {
            self.cmd
                .run(&format!("oc logs {} &> {}/{}.log", job, LOG_DIR, RAN_BASE))?;
        }

        retag_image_statement(self.cmd, RAN_BASE, RAN_BASE, &tags.base_tag, LOG_RETRIEVAL_POD)?;
        match deploy_pod(
            self.cmd,
            LOG_RETRIEVAL_POD,
            LOG_RETRIEVAL_TIMEOUT_SECS,
            &self.logger,
        )? {
            Some(pod) => {
                self.cmd.run(&format!("mkdir -p {}/{}", LOG_DIR, RAN_BASE))?;
                self.cmd.run(&format!(
                    "oc rsync {}:/oai-ran/cmake_targets/log/ {}/{}",
                    pod, LOG_DIR, RAN_BASE
                ))?;
                undeploy_pod(self.cmd, LOG_RETRIEVAL_POD)?;
            }
            None => status = false,
        }

        Ok(status)
    }

    /// Starts every build of `stage`, waits for all of them and fetches their
    /// logs. A build that could not be started fails the stage without
    /// waiting.
    fn run_stage(
        &mut self,
        stage: &Stage,
        tags: &ImageTags,
        attempted: &mut Vec<String>,
    ) -> CiResult<bool> {
        let mut jobs = Vec::new();
        for image in stage.images {
            let job = self.start_image_build(image, tags)?;
            attempted.push(image.name.to_string());
            jobs.push((image.name, job));
        }

        let started: Vec<String> = jobs.iter().filter_map(|(_, job)| job.clone()).collect();
        let built = started.len() == jobs.len()
            && wait_build_end(
                self.cmd,
                &started,
                &WaitPolicy::new(stage.timeout_secs, self.check_interval),
                self.cancel,
                &self.logger,
            )?;
        if !built {
            let names: Vec<&str> = jobs.iter().map(|(name, _)| *name).collect();
            self.logger
                .error(format!("error during build of {}", names.join("/")))?;
        }

        for (name, job) in &jobs {
            if let Some(job) = job {
                self.cmd
                    .run(&format!("oc logs {} &> {}/{}.log", job, LOG_DIR, name))?;
            }
        }
        if stage.collect_metrics {
            self.cmd.run_with(
                &format!("oc get pods.metrics.k8s.io &>> {}/build-metrics.log", LOG_DIR),
                RunOptions::with_timeout(10),
            )?;
        }

        Ok(built)
    }

    fn start_image_build(&mut self, image: &ImageSpec, tags: &ImageTags) -> CiResult<Option<String>> {
        recreate_is_tag(
            self.cmd,
            image.name,
            &tags.image_tag,
            &format!("openshift/{}-is.yaml", image.name),
            &self.logger,
        )?;
        recreate_bc(
            self.cmd,
            image.name,
            &tags.image_tag,
            &format!("openshift/{}-bc.yaml", image.name),
            &self.logger,
        )?;
        let base_image = self.registry_image(RAN_BASE);
        retag_image_statement(
            self.cmd,
            RAN_BASE,
            &base_image,
            &tags.base_tag,
            image.dockerfile,
        )?;
        if let Some(builder) = image.builder {
            let builder_image = self.registry_image(builder);
            retag_image_statement(
                self.cmd,
                builder,
                &builder_image,
                &tags.image_tag,
                image.dockerfile,
            )?;
        }
        start_build(
            self.cmd,
            image.name,
            &self.config.node.source_code_path,
            &self.logger,
        )
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// In-cluster reference to `image`, as Dockerfiles pull it.
    fn registry_image(&self, image: &str) -> String {
        format!(
            "{}:5000/{}/{}",
            IMAGE_REGISTRY_SERVICE_NAME, self.config.cluster.namespace, image
        )
    }
}

/// Human readable size of a built image; a missing or empty image means its
/// build failed.
pub fn describe_image_size(size: Option<u64>) -> (String, bool) {
    match size {
        Some(size) if size > 0 => {
            let size_mb = size as f64 / 1_000_000.0;
            (
                format!(
                    "{:.1} Mbytes (uncompressed: ~{:.1} Mbytes)",
                    size_mb,
                    size_mb * 2.5
                ),
                true,
            )
        }
        _ => ("unknown -- BUILD FAILED".to_string(), false),
    }
}

//
// TESTS
//
