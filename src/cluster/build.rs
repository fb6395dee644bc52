use crate::cmd::{Cmd, RunOptions};
use crate::error::CiResult;
use crate::io::Logger;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

lazy_static! {
    static ref BUILD_STARTED: Regex =
        Regex::new(r"build\.build\.openshift\.io/(?P<jobname>[a-zA-Z0-9\-]+) started").unwrap();
}

/// How long and how often `wait_build_end` polls the builder pods.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout_secs: u64, interval: Duration) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            interval,
        }
    }
}

/// Uploads `source_dir` and starts a build of the BuildConfig `name`. The
/// build keeps running on the cluster; the returned name is the one of its
/// builder pod.
pub fn start_build(
    cmd: &mut dyn Cmd,
    name: &str,
    source_dir: &str,
    logger: &Logger,
) -> CiResult<Option<String>> {
    let ret = cmd.run(&format!(
        "oc start-build {} --from-dir={} --exclude=\"\"",
        name, source_dir
    ))?;
    let job = BUILD_STARTED
        .captures(&ret.stdout)
        .map(|captures| captures["jobname"].to_string());
    match job {
        Some(job) if ret.success() && ret.stdout.matches("Uploading finished").count() == 1 => {
            Ok(Some(format!("{}-build", job)))
        }
        _ => {
            logger.error(format!("error during oc start-build: {}", ret.stdout))?;
            Ok(None)
        }
    }
}

/// Polls the builder pods of `jobs` until all of them completed. Fails as
/// soon as one of them reports an error, when `policy.timeout` is spent, or
/// when `cancel` gets set.
pub fn wait_build_end(
    cmd: &mut dyn Cmd,
    jobs: &[String],
    policy: &WaitPolicy,
    cancel: &AtomicBool,
    logger: &Logger,
) -> CiResult<bool> {
    logger.debug(format!("waiting for jobs {:?} to finish building", jobs))?;
    let mut pending = jobs.to_vec();
    // a zero interval would never spend the timeout
    let interval = policy.interval.max(Duration::from_millis(1));
    let mut remaining = policy.timeout;

    while !remaining.is_zero() {
        let mut completed = Vec::new();
        for job in &pending {
            let ret = cmd.run_with(
                &format!("oc get pods | grep {}", job),
                RunOptions {
                    silent: true,
                    report_non_zero: false,
                    ..RunOptions::default()
                },
            )?;
            if ret.stdout.contains("Completed") {
                completed.push(job.clone());
            }
            if ret.stdout.contains("Error") {
                logger.error(format!("error for job {}: {}", job, ret.stdout))?;
                return Ok(false);
            }
        }
        pending.retain(|job| !completed.contains(job));

        if pending.is_empty() {
            logger.debug("all jobs completed")?;
            return Ok(true);
        }
        if cancel.load(Ordering::SeqCst) {
            logger.error(format!("interrupted while waiting for end of build of {:?}", pending))?;
            return Ok(false);
        }
        thread::sleep(interval);
        remaining = remaining.saturating_sub(interval);
    }

    logger.error(format!("timeout while waiting for end of build of {:?}", pending))?;
    Ok(false)
}

//
// TESTS
//
