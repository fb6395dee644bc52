//! Helpers shared by the cluster build and the image pull: image tag naming,
//! pulling images onto a node, bringing build logs back to the executor and
//! analyzing them.

use crate::cmd::{Cmd, RunOptions};
use crate::error::CiResult;
use crate::io::Logger;
use crate::report::{BuildLogAnalysis, LogAnalysis};
use glob::glob;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Local repository pulled images are retagged into.
pub const LOCAL_IMAGE_REPOSITORY: &str = "oai-ci";

lazy_static! {
    // compiler diagnostics only, package manager `Error:` lines are tolerated
    static ref ERROR_LINE: Regex = Regex::new(r"\berror:").unwrap();
    static ref WARNING_LINE: Regex = Regex::new(r"\bwarning:").unwrap();
}

/// Tag of the images built for a commit: `develop-<short sha>`, or
/// `<branch>-<short sha>` for a merge request (slashes in the branch name
/// become dashes). The commit `develop` maps to the `develop` tag.
pub fn create_tag(commit_id: &str, branch: &str, allow_merge: bool) -> String {
    if commit_id == "develop" {
        return "develop".to_string();
    }
    let short_commit: String = commit_id.chars().take(8).collect();
    if allow_merge {
        format!("{}-{}", branch.replace('/', "-"), short_commit)
    } else {
        format!("develop-{}", short_commit)
    }
}

/// Pulls `images` with `tag` from `registry` and retags each of them as
/// `oai-ci/<image>:<tag>`. Stops at the first failing pull. Returns whether
/// all pulls succeeded, with a human readable summary.
pub fn pull_images(
    cmd: &mut dyn Cmd,
    images: &[String],
    tag: &str,
    registry: &str,
    logger: &Logger,
) -> CiResult<(bool, String)> {
    let mut pulled = Vec::new();
    for image in images {
        let remote = format!("{}/{}:{}", registry, image, tag);
        let ret = cmd.run_with(&format!("docker pull {}", remote), RunOptions::with_timeout(600))?;
        if !ret.success() {
            let message = format!("Could not pull image {}", remote);
            logger.error(&message)?;
            return Ok((false, message));
        }
        cmd.run(&format!(
            "docker tag {} {}/{}:{}",
            remote, LOCAL_IMAGE_REPOSITORY, image, tag
        ))?;
        cmd.run(&format!("docker rmi {}", remote))?;
        pulled.push(format!("{}/{}:{}", LOCAL_IMAGE_REPOSITORY, image, tag));
    }

    Ok((true, format!("Pulled Images:\n{}", pulled.join("\n"))))
}

/// Moves the build logs of the workspace at `source_path` into
/// `cmake_targets/<name>/`, archives them and unpacks the archive into
/// `local_dir`, where they end up as `local_dir/<name>/`. Returns false,
/// after logging why, when the archive cannot be retrieved or unpacked.
pub fn copy_logs_to_executor(
    cmd: &mut dyn Cmd,
    source_path: &str,
    name: &str,
    local_dir: &Path,
    logger: &Logger,
) -> CiResult<bool> {
    let archive = format!("{}.tar", name);
    cmd.run(&format!(
        "cd {}/cmake_targets && rm -rf {name} {archive} && mkdir -p {name} \
         && mv log/* {name}/ && tar -cf {archive} {name}",
        source_path,
        name = name,
        archive = archive
    ))?;

    let local_archive = local_dir.join(&archive);
    if !cmd.copyin(&format!("{}/cmake_targets/{}", source_path, archive), &local_archive)? {
        logger.error(format!("could not retrieve build logs {}", archive))?;
        return Ok(false);
    }

    let unpacked =
        File::open(&local_archive).and_then(|file| tar::Archive::new(file).unpack(local_dir));
    if let Err(e) = unpacked {
        logger.error(format!("could not unpack build logs {}: {}", archive, e))?;
        if local_archive.exists() {
            std::fs::remove_file(&local_archive)?;
        }
        return Ok(false);
    }
    std::fs::remove_file(&local_archive)?;
    Ok(true)
}

/// Counts error and warning lines in the logs of each image found in
/// `log_dir`: `<image>.log` plus any file below `<image>/`. A log passes when
/// it has no error line. An image without any log fails when
/// `global_status` is already failed, and is skipped otherwise.
pub fn analyze_build_logs(
    log_dir: &Path,
    images: &[String],
    global_status: bool,
) -> CiResult<BuildLogAnalysis> {
    let mut analysis = BuildLogAnalysis::new();
    for image in images {
        let mut files = BTreeMap::new();

        let main_log = log_dir.join(format!("{}.log", image));
        if main_log.is_file() {
            files.insert(format!("{}.log", image), analyze_log_file(&main_log)?);
        }
        let pattern = log_dir.join(image).join("*");
        for path in glob(&pattern.to_string_lossy())?.flatten() {
            if path.is_file() {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                files.insert(format!("{}/{}", image, file_name), analyze_log_file(&path)?);
            }
        }

        if files.is_empty() {
            if global_status {
                continue;
            }
            files.insert(
                format!("{}.log", image),
                LogAnalysis {
                    status: false,
                    ..LogAnalysis::default()
                },
            );
        }
        analysis.insert(image.clone(), files);
    }

    Ok(analysis)
}

//
// PRIVATES
//

fn analyze_log_file(path: &Path) -> CiResult<LogAnalysis> {
    let contents = std::fs::read(path)?;
    let contents = String::from_utf8_lossy(&contents);
    let errors = contents.lines().filter(|l| ERROR_LINE.is_match(l)).count();
    let warnings = contents.lines().filter(|l| WARNING_LINE.is_match(l)).count();

    Ok(LogAnalysis {
        errors,
        warnings,
        status: errors == 0,
    })
}

//
// TESTS
//
